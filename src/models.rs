use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::StatsError;

// Anything that is not a list of numbers is kept verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SubjectGrades {
    Scores(Vec<f64>),
    Malformed(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default)]
    pub grades: BTreeMap<String, SubjectGrades>,
}

pub type Roster = Vec<Record>;

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grades: BTreeMap::new(),
        }
    }

    pub fn with_scores(
        mut self,
        subject: impl Into<String>,
        scores: impl IntoIterator<Item = f64>,
    ) -> Self {
        self.grades.insert(
            subject.into(),
            SubjectGrades::Scores(scores.into_iter().collect()),
        );
        self
    }

    #[cfg(test)]
    pub fn with_malformed(mut self, subject: impl Into<String>, raw: serde_json::Value) -> Self {
        self.grades
            .insert(subject.into(), SubjectGrades::Malformed(raw));
        self
    }

    // `Ok(None)` means the subject is absent.
    pub fn scores(&self, subject: &str) -> Result<Option<&[f64]>, StatsError> {
        match self.grades.get(subject) {
            None => Ok(None),
            Some(SubjectGrades::Scores(scores)) => Ok(Some(scores)),
            Some(SubjectGrades::Malformed(_)) => Err(StatsError::Format {
                subject: subject.to_string(),
            }),
        }
    }

    pub fn well_formed(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.grades.iter().filter_map(|(subject, grades)| match grades {
            SubjectGrades::Scores(scores) => Some((subject.as_str(), scores.as_slice())),
            SubjectGrades::Malformed(_) => None,
        })
    }
}

pub fn sample_roster() -> Roster {
    vec![
        Record::new("Alice")
            .with_scores("math", [85.0])
            .with_scores("science", [90.0])
            .with_scores("history", [78.0]),
        Record::new("Bob")
            .with_scores("math", [90.0])
            .with_scores("science", [88.0])
            .with_scores("history", [92.0]),
        Record::new("Charlie")
            .with_scores("math", [80.0])
            .with_scores("science", [85.0])
            .with_scores("history", [88.0]),
    ]
}

#[derive(Debug, Clone)]
pub struct SubjectPlan {
    pub highest: String,
    pub lowest: String,
    pub sorted: String,
    pub std_dev: String,
    pub variance: String,
}

impl Default for SubjectPlan {
    fn default() -> Self {
        Self {
            highest: "math".to_string(),
            lowest: "science".to_string(),
            sorted: "history".to_string(),
            std_dev: "science".to_string(),
            variance: "math".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentSummary {
    pub name: String,
    pub average: Result<f64, StatsError>,
    pub highest: Result<f64, StatsError>,
    pub lowest: Result<f64, StatsError>,
    pub sorted: Result<Vec<f64>, StatsError>,
    pub std_dev: Result<f64, StatsError>,
    pub variance: Result<f64, StatsError>,
}

#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub subject_averages: BTreeMap<String, Option<f64>>,
    pub overall: Result<f64, StatsError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roster_keeps_malformed_subjects() {
        let raw = r#"[
            {"name": "Alice", "grades": {"math": [85, 91.5], "art": "excellent"}},
            {"name": "Dana"}
        ]"#;
        let roster: Roster = serde_json::from_str(raw).unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].scores("math").unwrap(), Some(&[85.0, 91.5][..]));
        assert_eq!(
            roster[0].scores("art"),
            Err(StatsError::Format {
                subject: "art".to_string()
            })
        );
        assert!(roster[1].grades.is_empty());
    }

    #[test]
    fn absent_subject_is_not_an_error() {
        let record = Record::new("Alice").with_scores("math", [85.0]);
        assert_eq!(record.scores("history").unwrap(), None);
    }

    #[test]
    fn well_formed_skips_malformed() {
        let record = Record::new("Alice")
            .with_scores("math", [85.0])
            .with_malformed("art", serde_json::json!({"grade": "A"}));
        let subjects: Vec<&str> = record.well_formed().map(|(s, _)| s).collect();
        assert_eq!(subjects, vec!["math"]);
    }
}
