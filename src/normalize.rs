// Raw store document -> canonical Record

use crate::record::{Gender, RawDocument, Record};
use crate::timestamp::TimestampCanonicalizer;
use serde_json::Value;

/// Map a raw document into a fully populated `Record`.
///
/// Never fails: absent or malformed fields fall back to defaults (empty strings,
/// `Gender::Other`, no profile picture). Timestamps go through `canon`.
pub fn normalize(doc: &RawDocument, canon: &dyn TimestampCanonicalizer) -> Record {
    let profile_picture = text_field(doc, "profilePicture");

    Record {
        id: doc.id.clone(),
        name: text_field(doc, "name"),
        email: text_field(doc, "email"),
        dob: text_field(doc, "dob"),
        gender: gender_field(doc),
        profile_picture: (!profile_picture.is_empty()).then_some(profile_picture),
        created_at: canon.to_canonical(doc.get("createdAt")),
        updated_at: canon.to_canonical(doc.get("updatedAt")),
    }
}

/// Normalize a whole snapshot, preserving document order
pub fn normalize_all(docs: &[RawDocument], canon: &dyn TimestampCanonicalizer) -> Vec<Record> {
    docs.iter().map(|doc| normalize(doc, canon)).collect()
}

fn text_field(doc: &RawDocument, field: &str) -> String {
    match doc.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn gender_field(doc: &RawDocument) -> Gender {
    doc.get("gender")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}
