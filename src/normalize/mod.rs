//! Legacy and canonical field shapes mapped onto one schema.
//!
//! Every function here is total: missing or malformed input produces empty
//! output, never an error.

pub mod mapping;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::model::{Fields, Lifecycle, StoredRecord};
pub use mapping::{Concept, SLOT_PREFIXES};

/// One positional machine slot of a legacy employee record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: u32,
    pub machine_id: Option<String>,
}

/// Employee record in the legacy shape. Read-only input.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    pub id: String,
    pub employee_code: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
    pub lifecycle: Lifecycle,
    /// Slots ordered by index
    pub slots: Vec<Slot>,
}

/// (employee, machine) association recovered from a legacy slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyPair {
    pub employee_id: String,
    pub machine_id: String,
    pub preference_order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalAssignment {
    pub id: String,
    pub employee_id: String,
    pub machine_id: String,
    pub preference_order: Option<u32>,
    pub competency: Option<u32>,
    #[serde(skip)]
    pub created_date: Option<String>,
}

/// Text value of a field. Strings are trimmed, numbers stringified, and
/// anything empty or non-scalar counts as absent.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Positive integer value of a field, accepting numeric strings
pub fn value_u32(value: &Value) -> Option<u32> {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed.filter(|v| *v > 0)
}

/// First populated alias of `concept`, as text
pub fn resolve_text(fields: &Fields, concept: Concept) -> Option<String> {
    concept
        .aliases()
        .iter()
        .find_map(|name| fields.get(*name).and_then(value_text))
}

/// First alias of `concept` holding a usable positive integer
pub fn resolve_u32(fields: &Fields, concept: Concept) -> Option<u32> {
    concept
        .aliases()
        .iter()
        .find_map(|name| fields.get(*name).and_then(value_u32))
}

pub fn lifecycle(fields: &Fields) -> Lifecycle {
    resolve_text(fields, Concept::Lifecycle)
        .map(|s| Lifecycle::from_text(&s))
        .unwrap_or_default()
}

/// Project a record onto canonical field names for the given concepts.
/// Absent concepts are left out rather than written as null.
pub fn project(fields: &Fields, concepts: &[Concept]) -> Fields {
    let mut out = Fields::new();
    for concept in concepts {
        if let Some(text) = resolve_text(fields, *concept) {
            out.insert(concept.canonical_field().to_string(), Value::String(text));
        }
    }
    out
}

fn slot_index(field_name: &str) -> Option<u32> {
    SLOT_PREFIXES
        .iter()
        .find_map(|prefix| field_name.strip_prefix(prefix))
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| *n > 0)
}

impl LegacyRecord {
    pub fn from_stored(record: &StoredRecord) -> Self {
        let fields = &record.fields;

        // The first spelling seen for an index wins; alias order is stable
        // because Fields preserves sorted key order
        let mut slots: BTreeMap<u32, Option<String>> = BTreeMap::new();
        for (name, value) in fields {
            if let Some(index) = slot_index(name) {
                slots.entry(index).or_insert_with(|| value_text(value));
            }
        }

        LegacyRecord {
            id: record.id.clone(),
            employee_code: resolve_text(fields, Concept::EmployeeCode),
            name: resolve_text(fields, Concept::EmployeeName),
            department: resolve_text(fields, Concept::Department),
            lifecycle: lifecycle(fields),
            slots: slots
                .into_iter()
                .map(|(index, machine_id)| Slot { index, machine_id })
                .collect(),
        }
    }

    pub fn non_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.machine_id.is_some()).count()
    }
}

/// Emit one pair per non-empty slot, in slot order. The position among
/// non-empty slots (1-based) is the preference order.
pub fn legacy_pairs(record: &LegacyRecord) -> Vec<LegacyPair> {
    let Some(code) = record.employee_code.as_deref() else {
        return Vec::new();
    };

    record
        .slots
        .iter()
        .filter_map(|slot| slot.machine_id.as_deref())
        .enumerate()
        .map(|(position, machine_id)| LegacyPair {
            employee_id: code.to_string(),
            machine_id: machine_id.to_string(),
            preference_order: position as u32 + 1,
        })
        .collect()
}

/// Read a canonical assignment whatever spelling its fields use. Records
/// without both an employee and a machine reference yield `None`.
pub fn canonical_assignment(record: &StoredRecord) -> Option<CanonicalAssignment> {
    let fields = &record.fields;
    Some(CanonicalAssignment {
        id: record.id.clone(),
        employee_id: resolve_text(fields, Concept::EmployeeRef)?,
        machine_id: resolve_text(fields, Concept::MachineRef)?,
        preference_order: resolve_u32(fields, Concept::PreferenceOrder),
        competency: resolve_u32(fields, Concept::Competency),
        created_date: record.created_date.clone(),
    })
}
