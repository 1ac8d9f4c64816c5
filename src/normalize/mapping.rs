use strum::{AsRefStr, EnumIter};

/// A field concept shared by legacy and canonical records.
///
/// Each concept has one prioritized list of field names. The first name is
/// the canonical one (what this crate writes); the rest are legacy spellings
/// accepted on read.
#[derive(AsRefStr, EnumIter, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum Concept {
    EmployeeCode,
    EmployeeRef,
    EmployeeName,
    Department,
    MachineRef,
    Competency,
    PreferenceOrder,
    Lifecycle,
    LockerNumber,
    Wardrobe,
    RoleCode,
    DepartmentCode,
    DepartmentName,
}

/// Legacy machine slots are `<prefix><n>` with n >= 1, in either spelling
pub const SLOT_PREFIXES: [&str; 2] = ["maquina_", "machine_"];

static FIELD_MAP: &[(Concept, &[&str])] = &[
    (Concept::EmployeeCode, &["codigo_empleado", "employee_code", "codigo", "code"]),
    (Concept::EmployeeRef, &["employee_id", "empleado_id", "codigo_empleado", "employeeId"]),
    (Concept::EmployeeName, &["nombre", "name", "full_name"]),
    (Concept::Department, &["departamento", "department", "department_name"]),
    (Concept::MachineRef, &["machine_id", "maquina_id", "machineId"]),
    (Concept::Competency, &["nivel_competencia", "nivel_habilidad", "skill_level", "nivel"]),
    (Concept::PreferenceOrder, &["orden_preferencia", "orden", "prioridad", "preference_order"]),
    (Concept::Lifecycle, &["lifecycle_status", "estado_registro"]),
    (Concept::LockerNumber, &["numero_taquilla", "taquilla_numero", "locker_number"]),
    (Concept::Wardrobe, &["vestuario", "taquilla_vestuario", "wardrobe", "seccion"]),
    (Concept::RoleCode, &["role_id", "codigo_rol", "code"]),
    (Concept::DepartmentCode, &["department_code", "codigo", "code"]),
    (Concept::DepartmentName, &["department_name", "nombre", "name"]),
];

impl Concept {
    /// Field names for this concept, canonical first
    pub fn aliases(&self) -> &'static [&'static str] {
        FIELD_MAP
            .iter()
            .find(|(concept, _)| concept == self)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }

    /// The field name written to canonical records
    pub fn canonical_field(&self) -> &'static str {
        self.aliases().first().copied().unwrap_or("")
    }
}
