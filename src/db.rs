use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::loader::{self, GradeRow};
use crate::models::{sample_roster, Roster};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(pool: &PgPool, full_name: &str) -> anyhow::Result<Uuid> {
    let student_id: Uuid = sqlx::query(
        r#"
        INSERT INTO gradebook.students (id, full_name)
        VALUES ($1, $2)
        ON CONFLICT (full_name) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(student_id)
}

// A grade that did not parse is kept as `raw_grade` with a NULL score.
fn grade_columns(grade: Result<f64, &str>) -> (Option<f64>, Option<&str>) {
    match grade {
        Ok(score) => (Some(score), None),
        Err(raw) => (None, Some(raw)),
    }
}

fn stored_grade(score: Option<f64>, raw_grade: Option<&str>) -> Option<Result<f64, &str>> {
    match (score, raw_grade) {
        (Some(score), _) => Some(Ok(score)),
        (None, Some(raw)) => Some(Err(raw)),
        (None, None) => None,
    }
}

async fn insert_grade(
    pool: &PgPool,
    student_id: Uuid,
    subject: &str,
    grade: Result<f64, &str>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let (score, raw_grade) = grade_columns(grade);
    let result = sqlx::query(
        r#"
        INSERT INTO gradebook.grades
        (id, student_id, subject, score, raw_grade, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(subject)
    .bind(score)
    .bind(raw_grade)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    for record in sample_roster() {
        let student_id = upsert_student(pool, &record.name).await?;

        for (subject, scores) in record.well_formed() {
            for (position, score) in scores.iter().enumerate() {
                let source_key = format!(
                    "seed-{}-{}-{}",
                    record.name.to_lowercase(),
                    subject,
                    position + 1
                );
                if insert_grade(pool, student_id, subject, Ok(*score), &source_key).await? {
                    inserted += 1;
                }
            }
        }
    }

    Ok(inserted)
}

#[derive(Debug, Clone)]
struct GradebookRow {
    full_name: String,
    subject: Option<String>,
    score: Option<f64>,
    raw_grade: Option<String>,
}

fn roster_from_rows(rows: &[GradebookRow]) -> Roster {
    loader::group_grades(rows.iter().map(|row| {
        (
            row.full_name.as_str(),
            row.subject.as_deref(),
            stored_grade(row.score, row.raw_grade.as_deref()),
        )
    }))
}

pub async fn fetch_roster(pool: &PgPool) -> anyhow::Result<Roster> {
    let rows: Vec<GradebookRow> = sqlx::query(
        "SELECT st.full_name, g.subject, g.score, g.raw_grade \
         FROM gradebook.students st \
         LEFT JOIN gradebook.grades g ON g.student_id = st.id \
         ORDER BY st.roster_position, g.recorded_seq",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| GradebookRow {
        full_name: row.get("full_name"),
        subject: row.get("subject"),
        score: row.get("score"),
        raw_grade: row.get("raw_grade"),
    })
    .collect();

    let roster = roster_from_rows(&rows);
    debug!(students = roster.len(), "fetched roster from Postgres");
    Ok(roster)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)?;
    let rows: Vec<GradeRow> = loader::read_grade_rows(file)?;
    let mut inserted = 0usize;

    for row in rows {
        let full_name = row.name.trim();
        if full_name.is_empty() {
            warn!("skipping CSV row without a student name");
            continue;
        }
        let student_id = upsert_student(pool, full_name).await?;

        let Some(subject) = row.subject() else {
            continue;
        };
        let Some(grade) = row.score() else {
            continue;
        };
        if let Err(raw) = grade {
            warn!(student = %full_name, subject = %subject, grade = %raw, "storing non-numeric grade as text");
        }

        let source_key = row
            .source_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_grade(pool, student_id, subject, grade, &source_key).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectGrades;

    fn row(
        full_name: &str,
        subject: Option<&str>,
        score: Option<f64>,
        raw: Option<&str>,
    ) -> GradebookRow {
        GradebookRow {
            full_name: full_name.to_string(),
            subject: subject.map(str::to_string),
            score,
            raw_grade: raw.map(str::to_string),
        }
    }

    #[test]
    fn student_without_grades_comes_back_empty() {
        let rows = vec![
            row("Alice", Some("math"), Some(85.0), None),
            row("Dana", None, None, None),
        ];
        let roster = roster_from_rows(&rows);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[1].name, "Dana");
        assert!(roster[1].grades.is_empty());
    }

    #[test]
    fn grades_regroup_when_students_interleave() {
        let rows = vec![
            row("Alice", Some("math"), Some(85.0), None),
            row("Bob", Some("math"), Some(90.0), None),
            row("Alice", Some("math"), Some(70.0), None),
            row("Bob", Some("history"), Some(92.0), None),
        ];
        let roster = roster_from_rows(&rows);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].scores("math").unwrap(), Some(&[85.0, 70.0][..]));
        assert_eq!(roster[1].scores("math").unwrap(), Some(&[90.0][..]));
        assert_eq!(roster[1].scores("history").unwrap(), Some(&[92.0][..]));
    }

    #[test]
    fn imported_text_grade_reads_back_as_malformed() {
        let csv = "name,subject,grade\nAlice,art,85\nAlice,art,A+\n";
        let rows: Vec<GradebookRow> = loader::read_grade_rows(csv.as_bytes())
            .unwrap()
            .iter()
            .map(|csv_row| {
                let (score, raw) = grade_columns(csv_row.score().unwrap());
                row(&csv_row.name, csv_row.subject(), score, raw)
            })
            .collect();
        assert_eq!(rows[1].score, None);
        assert_eq!(rows[1].raw_grade.as_deref(), Some("A+"));

        let from_db = roster_from_rows(&rows);
        let from_file = loader::parse_csv_roster(csv.as_bytes()).unwrap();
        assert_eq!(
            from_db[0].grades["art"],
            SubjectGrades::Malformed(serde_json::Value::String("A+".to_string()))
        );
        assert_eq!(from_db, from_file);
    }

    #[test]
    fn stored_score_wins_over_raw_text() {
        assert_eq!(stored_grade(Some(85.0), Some("85")), Some(Ok(85.0)));
        assert_eq!(stored_grade(None, Some("A+")), Some(Err("A+")));
        assert_eq!(stored_grade(None, None), None);
    }
}
