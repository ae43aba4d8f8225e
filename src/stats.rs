use std::collections::BTreeMap;
use std::ops::Range;

use tracing::{debug, warn};

use crate::error::StatsError;
use crate::models::{ClassSummary, Record, StudentSummary, SubjectGrades, SubjectPlan};

// Reported when the subject is missing from a record. The asymmetry is
// long-standing report behaviour and is kept as is.
pub const MISSING_SUBJECT_HIGHEST: f64 = 0.0;
pub const MISSING_SUBJECT_LOWEST: f64 = 100.0;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

// Bessel's correction; `None` below two observations.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squared: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
    Some(squared / (values.len() - 1) as f64)
}

pub fn average_grade(record: &Record) -> Result<f64, StatsError> {
    let mut all_grades = Vec::new();
    for (subject, grades) in &record.grades {
        match grades {
            SubjectGrades::Scores(scores) => all_grades.extend_from_slice(scores),
            SubjectGrades::Malformed(_) => {
                warn!(student = %record.name, subject = %subject, "skipping malformed grades in average");
            }
        }
    }

    mean(&all_grades).ok_or_else(|| StatsError::NoData {
        name: record.name.clone(),
    })
}

pub fn highest_grade(record: &Record, subject: &str) -> Result<f64, StatsError> {
    let highest = match record.scores(subject)? {
        Some(scores) if !scores.is_empty() => {
            scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        }
        _ => MISSING_SUBJECT_HIGHEST,
    };
    Ok(highest)
}

pub fn lowest_grade(record: &Record, subject: &str) -> Result<f64, StatsError> {
    let lowest = match record.scores(subject)? {
        Some(scores) if !scores.is_empty() => scores.iter().copied().fold(f64::INFINITY, f64::min),
        _ => MISSING_SUBJECT_LOWEST,
    };
    Ok(lowest)
}

pub fn sorted_grades(record: &Record, subject: &str) -> Result<Vec<f64>, StatsError> {
    let mut sorted = record.scores(subject)?.unwrap_or_default().to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

pub fn standard_deviation(record: &Record, subject: &str) -> Result<f64, StatsError> {
    spread(record, subject, "standard deviation").map(f64::sqrt)
}

pub fn variance(record: &Record, subject: &str) -> Result<f64, StatsError> {
    spread(record, subject, "variance")
}

fn spread(record: &Record, subject: &str, statistic: &'static str) -> Result<f64, StatsError> {
    let scores = record.scores(subject)?.unwrap_or_default();
    let variance = sample_variance(scores).ok_or_else(|| StatsError::InsufficientData {
        statistic,
        subject: subject.to_string(),
    })?;

    if !variance.is_finite() {
        return Err(StatsError::Statistics(format!(
            "{statistic} for {subject} is not a finite number"
        )));
    }
    Ok(variance)
}

pub fn class_averages(roster: &[Record]) -> BTreeMap<String, Option<f64>> {
    let mut pooled: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for record in roster {
        for (subject, grades) in &record.grades {
            let entry = pooled.entry(subject.clone()).or_default();
            if let SubjectGrades::Scores(scores) = grades {
                entry.extend_from_slice(scores);
            }
        }
    }

    pooled
        .into_iter()
        .map(|(subject, grades)| {
            debug!(subject = %subject, count = grades.len(), "pooled class grades");
            let average = mean(&grades);
            (subject, average)
        })
        .collect()
}

pub fn overall_class_average(roster: &[Record]) -> Result<f64, StatsError> {
    if roster.is_empty() {
        return Err(StatsError::EmptyRoster);
    }

    let all_grades: Vec<f64> = roster
        .iter()
        .flat_map(|record| record.well_formed())
        .flat_map(|(_, scores)| scores.iter().copied())
        .collect();

    mean(&all_grades).ok_or_else(|| StatsError::NoData {
        name: "The class".to_string(),
    })
}

pub fn summarize_student(record: &Record, plan: &SubjectPlan) -> StudentSummary {
    StudentSummary {
        name: record.name.clone(),
        average: average_grade(record),
        highest: highest_grade(record, &plan.highest),
        lowest: lowest_grade(record, &plan.lowest),
        sorted: sorted_grades(record, &plan.sorted),
        std_dev: standard_deviation(record, &plan.std_dev),
        variance: variance(record, &plan.variance),
    }
}

pub fn summarize_class(roster: &[Record]) -> ClassSummary {
    ClassSummary {
        subject_averages: class_averages(roster),
        overall: overall_class_average(roster),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub range: Range<f64>,
    pub count: u64,
}

pub fn histogram(values: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || num_bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // a single distinct grade gets a unit-wide range centred on it
    let (start, end) = if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    };
    let bin_width = (end - start) / num_bins as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|bin_idx| HistogramBin {
            range: start + bin_width * bin_idx as f64..start + bin_width * (bin_idx + 1) as f64,
            count: 0,
        })
        .collect();

    for &value in values {
        // the last bin is closed on the right so `max` lands in it
        let bin_idx = (((value - start) / bin_width) as usize).min(num_bins - 1);
        bins[bin_idx].count += 1;
    }
    bins
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub lower_quartile: f64,
    pub median: f64,
    pub upper_quartile: f64,
    pub max: f64,
}

pub fn five_number_summary(values: &[f64]) -> Option<FiveNumberSummary> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    Some(FiveNumberSummary {
        min: sorted[0],
        lower_quartile: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        upper_quartile: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

// Linear interpolation between closest ranks; `sorted_values` must be non-empty.
fn quantile(sorted_values: &[f64], q: f64) -> f64 {
    let position = q * (sorted_values.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let fraction = position - below as f64;
    sorted_values[below] + (sorted_values[above] - sorted_values[below]) * fraction
}
