use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{Record, Roster, SubjectGrades};

// One row of the long CSV format: `name,subject,grade[,source_key]`.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeRow {
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub source_key: Option<String>,
}

impl GradeRow {
    pub fn subject(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
    }

    pub fn raw_grade(&self) -> Option<&str> {
        self.grade
            .as_deref()
            .map(str::trim)
            .filter(|grade| !grade.is_empty())
    }

    // `None` for an empty cell, `Some(Err(raw))` when it is not a finite number.
    pub fn score(&self) -> Option<Result<f64, &str>> {
        self.raw_grade().map(|raw| match raw.parse::<f64>() {
            Ok(score) if score.is_finite() => Ok(score),
            _ => Err(raw),
        })
    }
}

pub fn load_roster(path: &Path) -> anyhow::Result<Roster> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    let roster = match extension.as_deref() {
        Some("json") => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_json_roster(&raw)
                .with_context(|| format!("invalid JSON roster in {}", path.display()))?
        }
        Some("csv") => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            parse_csv_roster(file)
                .with_context(|| format!("invalid CSV roster in {}", path.display()))?
        }
        _ => bail!(
            "unsupported roster file {}; expected a .json or .csv file",
            path.display()
        ),
    };

    debug!(path = %path.display(), students = roster.len(), "loaded roster file");
    Ok(roster)
}

pub fn parse_json_roster(raw: &str) -> anyhow::Result<Roster> {
    let roster: Roster = serde_json::from_str(raw)?;
    validate_names(&roster)?;
    Ok(roster)
}

pub fn read_grade_rows<R: Read>(reader: R) -> anyhow::Result<Vec<GradeRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for result in reader.deserialize::<GradeRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

pub fn parse_csv_roster<R: Read>(reader: R) -> anyhow::Result<Roster> {
    let rows = read_grade_rows(reader)?;
    let roster = rows_to_roster(&rows);
    validate_names(&roster)?;
    Ok(roster)
}

pub fn rows_to_roster(rows: &[GradeRow]) -> Roster {
    group_grades(rows.iter().map(|row| (row.name.trim(), row.subject(), row.score())))
}

// Groups `(name, subject, grade)` rows into records in first-seen order. A
// grade that is not a number marks the whole subject as malformed.
pub fn group_grades<'a, I>(rows: I) -> Roster
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>, Option<Result<f64, &'a str>>)>,
{
    let mut roster: Roster = Vec::new();
    let mut positions: HashMap<&'a str, usize> = HashMap::new();

    for (name, subject, grade) in rows {
        let index = *positions.entry(name).or_insert_with(|| {
            roster.push(Record::new(name));
            roster.len() - 1
        });

        let Some(subject) = subject else {
            continue;
        };

        let entry = roster[index]
            .grades
            .entry(subject.to_string())
            .or_insert_with(|| SubjectGrades::Scores(Vec::new()));

        match grade {
            None => {}
            Some(Ok(score)) => {
                if let SubjectGrades::Scores(scores) = entry {
                    scores.push(score);
                }
            }
            Some(Err(raw)) => {
                warn!(student = %name, subject = %subject, grade = %raw, "grade is not a number");
                *entry = SubjectGrades::Malformed(serde_json::Value::String(raw.to_string()));
            }
        }
    }

    roster
}

fn validate_names(roster: &[Record]) -> anyhow::Result<()> {
    if let Some(position) = roster.iter().position(|record| record.name.trim().is_empty()) {
        bail!("student #{} has an empty name", position + 1);
    }
    Ok(())
}
