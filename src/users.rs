// User mutation requests, forwarded to the document store

use crate::record::Gender;
use crate::store::DocumentStore;
use chrono::NaiveDate;
use eyre::{Result, eyre};
use serde_json::{Map, Value};
use tracing::info;

/// Collection holding user documents
pub const USERS_COLLECTION: &str = "users";

/// Fields a caller supplies when creating a user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub name: String,
    pub email: String,
    /// `YYYY-MM-DD` or empty
    pub dob: String,
    pub gender: Gender,
    pub profile_picture: Option<String>,
}

impl UserInput {
    /// Reject input the store should never see
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(eyre!("Name is required"));
        }
        if self.email.trim().is_empty() {
            return Err(eyre!("Email is required"));
        }
        validate_dob(&self.dob)
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::from(self.name.as_str()));
        fields.insert("email".to_string(), Value::from(self.email.as_str()));
        fields.insert("dob".to_string(), Value::from(self.dob.as_str()));
        fields.insert("gender".to_string(), Value::from(self.gender.as_str()));
        fields.insert(
            "profilePicture".to_string(),
            Value::from(self.profile_picture.as_deref().unwrap_or("")),
        );
        fields
    }
}

/// Partial update; `None` leaves the stored field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<Gender>,
    /// `Some("")` clears the picture
    pub profile_picture: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.dob.is_none()
            && self.gender.is_none()
            && self.profile_picture.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(eyre!("Name cannot be cleared"));
        }
        if self.email.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(eyre!("Email cannot be cleared"));
        }
        match &self.dob {
            Some(dob) => validate_dob(dob),
            None => Ok(()),
        }
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(name) = &self.name {
            fields.insert("name".to_string(), Value::from(name.as_str()));
        }
        if let Some(email) = &self.email {
            fields.insert("email".to_string(), Value::from(email.as_str()));
        }
        if let Some(dob) = &self.dob {
            fields.insert("dob".to_string(), Value::from(dob.as_str()));
        }
        if let Some(gender) = self.gender {
            fields.insert("gender".to_string(), Value::from(gender.as_str()));
        }
        if let Some(url) = &self.profile_picture {
            fields.insert("profilePicture".to_string(), Value::from(url.as_str()));
        }
        fields
    }
}

/// Create a user; the new record appears once the store publishes it
pub fn add_user<S: DocumentStore + ?Sized>(store: &mut S, input: &UserInput) -> Result<String> {
    input.validate()?;
    let id = store.create(USERS_COLLECTION, input.to_fields())?;
    info!(id = %id, "User create requested");
    Ok(id)
}

pub fn update_user<S: DocumentStore + ?Sized>(store: &mut S, id: &str, patch: &UserPatch) -> Result<()> {
    if patch.is_empty() {
        return Err(eyre!("Nothing to update for user {}", id));
    }
    patch.validate()?;
    store.update(USERS_COLLECTION, id, patch.to_fields())?;
    info!(id, "User update requested");
    Ok(())
}

pub fn delete_user<S: DocumentStore + ?Sized>(store: &mut S, id: &str) -> Result<()> {
    store.delete(USERS_COLLECTION, id)?;
    info!(id, "User delete requested");
    Ok(())
}

fn validate_dob(dob: &str) -> Result<()> {
    if dob.is_empty() {
        return Ok(());
    }
    if dob.len() != 10 || NaiveDate::parse_from_str(dob, "%Y-%m-%d").is_err() {
        return Err(eyre!("Invalid date of birth: {} (expected YYYY-MM-DD)", dob));
    }
    Ok(())
}
