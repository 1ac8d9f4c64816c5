use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field bag of a remote entity, keyed by field name
pub type Fields = serde_json::Map<String, Value>;

/// A record as the remote entity store returns it: a storage id, the
/// store-assigned creation timestamp, and every other field flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl StoredRecord {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        StoredRecord {
            id: id.into(),
            created_date: None,
            fields,
        }
    }

    pub fn with_created_date(mut self, created_date: impl Into<String>) -> Self {
        self.created_date = Some(created_date.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Creation timestamp, if the store supplied one we can parse.
    ///
    /// The store is inconsistent about offsets: RFC 3339 strings and naive
    /// timestamps (assumed UTC) both occur.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Lifecycle status carried in record metadata. Deprecation is a flag on the
/// record, never an identifier rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Active,
    Deprecated,
}

impl Lifecycle {
    pub fn from_text(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "deprecated" | "obsoleto" | "duplicado" | "duplicate" => Lifecycle::Deprecated,
            _ => Lifecycle::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// The authenticated caller as reported by the backend's user system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub email: String,
    #[serde(default)]
    pub role: String,
}

impl Caller {
    pub const ADMIN_ROLE: &'static str = "admin";

    #[cfg(test)]
    pub fn new(email: impl Into<String>, role: impl Into<String>) -> Self {
        Caller {
            email: email.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Self::ADMIN_ROLE
    }
}
