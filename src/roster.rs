use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub student_id: String,
    pub label: Option<String>,
}

/// Reads a batch roster: a CSV with a `student_id` column and an optional `label`.
///
/// Blank ids are skipped and repeated ids keep their first occurrence.
pub fn load_roster(csv_path: &Path) -> Result<Vec<RosterEntry>> {
    #[derive(Deserialize)]
    struct CsvRow {
        student_id: String,
        #[serde(default)]
        label: Option<String>,
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        if row.student_id.is_empty() {
            continue;
        }
        if !seen.insert(row.student_id.clone()) {
            tracing::debug!(student_id = %row.student_id, "Skipping repeated roster entry");
            continue;
        }
        entries.push(RosterEntry {
            student_id: row.student_id,
            label: row.label.filter(|label| !label.is_empty()),
        });
    }

    Ok(entries)
}
