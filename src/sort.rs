// Ordering of user records by a selected field

use crate::record::Record;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fields a view can be sorted by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Name,
    Email,
    Dob,
    Gender,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::Name,
        SortKey::Email,
        SortKey::Dob,
        SortKey::Gender,
        SortKey::CreatedAt,
        SortKey::UpdatedAt,
    ];

    /// Field accessor for this key, resolved once per sort
    pub fn accessor(self) -> fn(&Record) -> &str {
        match self {
            SortKey::Name => |r| r.name.as_str(),
            SortKey::Email => |r| r.email.as_str(),
            SortKey::Dob => |r| r.dob.as_str(),
            SortKey::Gender => |r| r.gender.as_str(),
            SortKey::CreatedAt => |r| r.created_at.as_str(),
            SortKey::UpdatedAt => |r| r.updated_at.as_str(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Email => "email",
            SortKey::Dob => "dob",
            SortKey::Gender => "gender",
            SortKey::CreatedAt => "createdAt",
            SortKey::UpdatedAt => "updatedAt",
        }
    }
}

impl FromStr for SortKey {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(SortKey::Name),
            "email" => Ok(SortKey::Email),
            "dob" => Ok(SortKey::Dob),
            "gender" => Ok(SortKey::Gender),
            "createdAt" | "created_at" => Ok(SortKey::CreatedAt),
            "updatedAt" | "updated_at" => Ok(SortKey::UpdatedAt),
            _ => Err(eyre!(
                "Invalid sort key: {} (expected one of name, email, dob, gender, createdAt, updatedAt)",
                s
            )),
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDir {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" | "ascending" => Ok(SortDir::Asc),
            "desc" | "descending" => Ok(SortDir::Desc),
            _ => Err(eyre!("Invalid sort direction: {} (expected asc or desc)", s)),
        }
    }
}

impl std::fmt::Display for SortDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDir::Asc => write!(f, "asc"),
            SortDir::Desc => write!(f, "desc"),
        }
    }
}

/// Field + direction; defaults to newest first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub dir: SortDir,
}

impl SortSpec {
    pub fn new(key: SortKey, dir: SortDir) -> Self {
        Self { key, dir }
    }
}

/// Sort records by the lower-cased string value of `spec.key`.
///
/// Comparison is plain lexicographic, so date fields only order correctly as
/// zero-padded ISO strings. Ascending is stable. Descending is the ascending
/// result reversed, which puts ties in reverse input order.
pub fn apply(records: &[Record], spec: SortSpec) -> Vec<Record> {
    let field = spec.key.accessor();

    let mut keyed: Vec<(String, &Record)> = records.iter().map(|r| (field(r).to_lowercase(), r)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let sorted = keyed.into_iter().map(|(_, r)| r.clone());
    match spec.dir {
        SortDir::Asc => sorted.collect(),
        SortDir::Desc => sorted.rev().collect(),
    }
}
