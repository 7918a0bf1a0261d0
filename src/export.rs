// CSV export of the displayed collection

use crate::record::Record;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// MIME type of the export artifact
pub const CSV_MIME: &str = "text/csv;charset=utf-8";

/// Fixed column order of every export
pub const HEADER: [&str; 7] = [
    "Name",
    "Email",
    "DOB",
    "Gender",
    "Profile Picture",
    "Created At",
    "Updated At",
];

/// Quote a field iff it contains a comma, a double quote or a newline
pub fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Render records as CSV: header plus one row per record, in input order.
///
/// Rows are joined with `\n` and there is no trailing newline.
pub fn serialize(records: &[Record]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(join_row(&HEADER));

    for record in records {
        lines.push(join_row(&[
            record.name.as_str(),
            record.email.as_str(),
            record.dob.as_str(),
            record.gender.as_str(),
            record.profile_picture_str(),
            record.created_at.as_str(),
            record.updated_at.as_str(),
        ]));
    }

    lines.join("\n")
}

fn join_row(fields: &[&str]) -> String {
    fields.iter().map(|f| escape_field(f)).collect::<Vec<_>>().join(",")
}

/// Artifact filename carrying the generation instant, e.g. `users-2024-01-01T00-00-00.000Z.csv`
pub fn export_filename(generated_at: DateTime<Utc>) -> String {
    format!("users-{}.csv", generated_at.format("%Y-%m-%dT%H-%M-%S%.3fZ"))
}

/// Serialize `records` into a new file under `dir`, returning its path
pub fn write_export(dir: &Path, records: &[Record], generated_at: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir).context("Failed to create export directory")?;

    let path = dir.join(export_filename(generated_at));
    fs::write(&path, serialize(records)).with_context(|| format!("Failed to write export file {:?}", path))?;

    info!(path = ?path, rows = records.len(), mime = CSV_MIME, "Exported records");
    Ok(path)
}
