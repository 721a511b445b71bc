use std::io::Read;
use std::path::Path;

use anyhow::Context;

use crate::models::{AssignmentRecord, AssignmentSource, CourseKey};

/// One assignment row from a platform export, tagged with its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentImportRow {
    pub key: CourseKey,
    pub record: AssignmentRecord,
    pub source_key: Option<String>,
}

#[derive(serde::Deserialize)]
struct CsvRow {
    user_id: String,
    course: String,
    source: String,
    name: String,
    score: Option<f64>,
    points_possible: Option<f64>,
    source_key: Option<String>,
}

pub fn read_assignments(csv_path: &Path) -> anyhow::Result<Vec<AssignmentImportRow>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    parse_assignments(file)
}

/// Empty `score`/`points_possible` cells load as ungraded.
pub fn parse_assignments<R: Read>(input: R) -> anyhow::Result<Vec<AssignmentImportRow>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed assignment row on line {line}"))?;
        let source: AssignmentSource = row
            .source
            .parse()
            .with_context(|| format!("line {line}"))?;

        rows.push(AssignmentImportRow {
            key: CourseKey::new(row.user_id, row.course),
            record: AssignmentRecord {
                name: row.name,
                score: row.score,
                points_possible: row.points_possible,
                source,
            },
            source_key: row.source_key.filter(|key| !key.trim().is_empty()),
        });
    }

    Ok(rows)
}
