// Canonical user record and the raw store document it is derived from

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Closed gender enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(eyre!("Invalid gender: {} (expected male, female or other)", s)),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable snapshot of one managed user, identified by a store-assigned id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub name: String,
    pub email: String,
    /// `YYYY-MM-DD`, or empty when unknown
    pub dob: String,
    pub gender: Gender,
    /// `None` when absent or empty
    pub profile_picture: Option<String>,
    /// Canonical ISO-8601, or empty when the store had no value
    pub created_at: String,
    pub updated_at: String,
}

impl Record {
    pub fn has_profile_picture(&self) -> bool {
        self.profile_picture.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Profile picture URL, empty when absent
    pub fn profile_picture_str(&self) -> &str {
        self.profile_picture.as_deref().unwrap_or("")
    }
}

/// Document as delivered by the store: an id plus fields of unknown shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self { id: id.into(), fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}
