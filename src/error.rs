use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("{name} has no grades.")]
    NoData { name: String },

    #[error("Insufficient data to get {statistic} for {subject}")]
    InsufficientData {
        statistic: &'static str,
        subject: String,
    },

    #[error("Grades for {subject} not in proper format.")]
    Format { subject: String },

    #[error("Invalid visualization type selected.")]
    InvalidSelector { requested: String },

    #[error("{0}")]
    Statistics(String),

    #[error("Roster is empty.")]
    EmptyRoster,
}
