use std::fmt::Write as _;
use std::io::Write;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::chart::{chart_request, ChartKind, ChartRenderer};
use crate::error::StatsError;
use crate::models::{ClassSummary, Record, StudentSummary, SubjectPlan};
use crate::stats;

pub fn format_grade(grade: f64) -> String {
    if grade.fract() == 0.0 && grade.abs() < 1e15 {
        format!("{grade:.0}")
    } else {
        format!("{grade}")
    }
}

pub fn format_grade_list(grades: &[f64]) -> String {
    let items: Vec<String> = grades.iter().copied().map(format_grade).collect();
    format!("[{}]", items.join(", "))
}

fn line_or_error<T>(result: &Result<T, StatsError>, line: impl FnOnce(&T) -> String) -> String {
    match result {
        Ok(value) => line(value),
        Err(err) => err.to_string(),
    }
}

fn write_student(output: &mut String, summary: &StudentSummary, plan: &SubjectPlan) {
    let _ = writeln!(
        output,
        "{}",
        line_or_error(&summary.average, |avg| format!(
            "{} - Average Grade: {avg:.2}",
            summary.name
        ))
    );
    let _ = writeln!(
        output,
        "{}",
        line_or_error(&summary.highest, |grade| format!(
            "Highest grade in {}: {}",
            plan.highest,
            format_grade(*grade)
        ))
    );
    let _ = writeln!(
        output,
        "{}",
        line_or_error(&summary.lowest, |grade| format!(
            "Lowest grade in {}: {}",
            plan.lowest,
            format_grade(*grade)
        ))
    );
    let _ = writeln!(
        output,
        "{}",
        line_or_error(&summary.sorted, |grades| format!(
            "Sorted grades in {}: {}",
            plan.sorted,
            format_grade_list(grades)
        ))
    );
    let _ = writeln!(
        output,
        "{}",
        line_or_error(&summary.std_dev, |value| format!(
            "Standard deviation in {}: {value:.2}",
            plan.std_dev
        ))
    );
    let _ = writeln!(
        output,
        "{}",
        line_or_error(&summary.variance, |value| format!(
            "Variance in {}: {value:.2}",
            plan.variance
        ))
    );
}

pub fn build_class_section(class: &ClassSummary) -> String {
    let mut output = String::new();

    for (subject, average) in &class.subject_averages {
        match average {
            Some(average) => {
                let _ = writeln!(output, "Average for {subject}: {average:.2}");
            }
            None => {
                let _ = writeln!(output, "Average for {subject}: no grades recorded");
            }
        }
    }

    let _ = writeln!(
        output,
        "{}",
        line_or_error(&class.overall, |overall| format!(
            "Overall class average: {overall:.2}"
        ))
    );
    output
}

pub fn build_summary(roster: &[Record], plan: &SubjectPlan) -> String {
    let mut output = String::new();

    for record in roster {
        let summary = stats::summarize_student(record, plan);
        write_student(&mut output, &summary, plan);
    }

    output.push_str(&build_class_section(&stats::summarize_class(roster)));
    output
}

pub fn write_visual_report<W: Write>(
    out: &mut W,
    roster: &[Record],
    subject: &str,
    kind: &str,
    renderer: &mut dyn ChartRenderer,
) -> anyhow::Result<()> {
    match kind.parse::<ChartKind>() {
        Ok(kind) => {
            for record in roster {
                writeln!(out, "{}", record.name)?;
                match chart_request(record, subject, kind) {
                    Ok(request) => {
                        info!(student = %record.name, subject, ?kind, "rendering chart");
                        renderer.render(&request)?;
                    }
                    Err(err) => writeln!(out, "{err}")?,
                }
            }
        }
        Err(err) => {
            if let StatsError::InvalidSelector { requested } = &err {
                warn!(requested = %requested, "unknown chart kind, no charts rendered");
            }
            writeln!(out, "{err}")?;
        }
    }

    write!(out, "{}", build_class_section(&stats::summarize_class(roster)))?;
    Ok(())
}

fn table_text(text: &str) -> String {
    text.replace('|', "\\|")
}

fn cell(result: &Result<f64, StatsError>) -> String {
    match result {
        Ok(value) => format!("{value:.2}"),
        Err(StatsError::InsufficientData { .. }) => "n/a".to_string(),
        Err(StatsError::NoData { .. }) => "no grades".to_string(),
        Err(err) => table_text(&err.to_string()),
    }
}

pub fn build_report(
    source: &str,
    generated_on: NaiveDate,
    roster: &[Record],
    plan: &SubjectPlan,
) -> String {
    let class = stats::summarize_class(roster);
    let mut output = String::new();

    let _ = writeln!(output, "# Cohort Grade Report");
    let _ = writeln!(
        output,
        "Generated on {} from {} ({} students)",
        generated_on,
        source,
        roster.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");

    if roster.is_empty() {
        let _ = writeln!(output, "No students in this roster.");
    } else {
        let _ = writeln!(
            output,
            "| Student | Average | Highest ({}) | Lowest ({}) | Std dev ({}) | Variance ({}) |",
            table_text(&plan.highest),
            table_text(&plan.lowest),
            table_text(&plan.std_dev),
            table_text(&plan.variance)
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for record in roster {
            let summary = stats::summarize_student(record, plan);
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                table_text(&summary.name),
                cell(&summary.average),
                table_text(&line_or_error(&summary.highest, |grade| format_grade(*grade))),
                table_text(&line_or_error(&summary.lowest, |grade| format_grade(*grade))),
                cell(&summary.std_dev),
                cell(&summary.variance)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Averages");

    if class.subject_averages.is_empty() {
        let _ = writeln!(output, "No subjects recorded.");
    } else {
        for (subject, average) in &class.subject_averages {
            match average {
                Some(average) => {
                    let _ = writeln!(output, "- {subject}: {average:.2}");
                }
                None => {
                    let _ = writeln!(output, "- {subject}: no grades recorded");
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(
        output,
        "{}",
        line_or_error(&class.overall, |overall| format!(
            "Overall class average: {overall:.2}"
        ))
    );

    output
}
