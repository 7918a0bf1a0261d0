// Query filtering for user records

use crate::record::{Gender, Record};
use crate::timestamp::parse_instant;
use chrono::{DateTime, Utc};
use eyre::{Result, eyre};
use std::str::FromStr;

/// Exact-match constraint on gender, or the "any" sentinel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenderFilter {
    #[default]
    Any,
    Is(Gender),
}

impl FromStr for GenderFilter {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "any" | "all" => Ok(GenderFilter::Any),
            other => Ok(GenderFilter::Is(other.parse()?)),
        }
    }
}

/// Tri-state constraint on profile picture presence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfileFilter {
    #[default]
    Any,
    With,
    Without,
}

impl FromStr for ProfileFilter {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "any" | "all" => Ok(ProfileFilter::Any),
            "with" => Ok(ProfileFilter::With),
            "without" => Ok(ProfileFilter::Without),
            _ => Err(eyre!("Invalid profile filter: {} (expected any, with or without)", s)),
        }
    }
}

/// Inclusive range over a date or timestamp field
///
/// Bounds are kept as entered; an empty bound is unset. The range is active
/// when either bound is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DateRange {
    pub fn new(from: Option<&str>, to: Option<&str>) -> Self {
        Self {
            from: from.map(str::to_string),
            to: to.map(str::to_string),
        }
    }

    pub fn is_active(&self) -> bool {
        bound_text(&self.from).is_some() || bound_text(&self.to).is_some()
    }
}

/// Named, independently optional match constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Case-insensitive substring on name; empty is inactive
    pub name: String,
    /// Case-insensitive substring on email; empty is inactive
    pub email: String,
    pub gender: GenderFilter,
    pub dob: DateRange,
    pub profile: ProfileFilter,
    pub created: DateRange,
    pub updated: DateRange,
}

impl FilterSpec {
    /// True when no constraint is active
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.email.is_empty()
            && self.gender == GenderFilter::Any
            && self.profile == ProfileFilter::Any
            && !self.dob.is_active()
            && !self.created.is_active()
            && !self.updated.is_active()
    }
}

/// Keep the records that satisfy every active constraint, in input order
pub fn apply(records: &[Record], spec: &FilterSpec) -> Vec<Record> {
    let compiled = CompiledFilter::new(spec);
    records.iter().filter(|r| compiled.matches(r)).cloned().collect()
}

/// A `FilterSpec` with needles case-folded and bounds parsed once per pass
struct CompiledFilter {
    name: Option<String>,
    email: Option<String>,
    gender: GenderFilter,
    profile: ProfileFilter,
    dob: Option<RangeCheck>,
    created: Option<RangeCheck>,
    updated: Option<RangeCheck>,
}

impl CompiledFilter {
    fn new(spec: &FilterSpec) -> Self {
        let needle = |s: &str| (!s.is_empty()).then(|| s.to_lowercase());
        Self {
            name: needle(&spec.name),
            email: needle(&spec.email),
            gender: spec.gender,
            profile: spec.profile,
            dob: RangeCheck::compile(&spec.dob),
            created: RangeCheck::compile(&spec.created),
            updated: RangeCheck::compile(&spec.updated),
        }
    }

    fn matches(&self, record: &Record) -> bool {
        if let Some(needle) = &self.name
            && !record.name.to_lowercase().contains(needle.as_str())
        {
            return false;
        }
        if let Some(needle) = &self.email
            && !record.email.to_lowercase().contains(needle.as_str())
        {
            return false;
        }

        if let GenderFilter::Is(gender) = self.gender
            && record.gender != gender
        {
            return false;
        }

        match self.profile {
            ProfileFilter::With if !record.has_profile_picture() => return false,
            ProfileFilter::Without if record.has_profile_picture() => return false,
            _ => {}
        }

        let in_range = |check: &Option<RangeCheck>, value: &str| check.as_ref().is_none_or(|c| c.contains(value));

        in_range(&self.dob, &record.dob)
            && in_range(&self.created, &record.created_at)
            && in_range(&self.updated, &record.updated_at)
    }
}

/// Parsed inclusive bounds of an active range
struct RangeCheck {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    /// False when a set bound failed to parse; nothing can match
    valid: bool,
}

impl RangeCheck {
    fn compile(range: &DateRange) -> Option<Self> {
        if !range.is_active() {
            return None;
        }

        let from_text = bound_text(&range.from);
        let to_text = bound_text(&range.to);
        let from = from_text.and_then(parse_instant);
        let to = to_text.and_then(parse_instant);
        let valid = from_text.is_none() == from.is_none() && to_text.is_none() == to.is_none();

        Some(Self { from, to, valid })
    }

    /// Empty or unparseable field values never fall inside an active range
    fn contains(&self, value: &str) -> bool {
        if !self.valid {
            return false;
        }
        let Some(instant) = parse_instant(value) else {
            return false;
        };
        self.from.is_none_or(|from| instant >= from) && self.to.is_none_or(|to| instant <= to)
    }
}

fn bound_text(bound: &Option<String>) -> Option<&str> {
    bound.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
