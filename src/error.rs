use thiserror::Error;

/// Problems with an operator-supplied per-month override.
#[derive(Debug, Error, PartialEq)]
pub enum OverrideError {
    #[error("malformed month token `{0}` (expected `<n>M`)")]
    MalformedToken(String),
    #[error("month index {index} is outside the program's {duration}-month schedule")]
    OutOfRange { index: u32, duration: u32 },
    #[error("program has no valid schedule, overrides cannot be placed")]
    NoSchedule,
    #[error("negative hours {hours} for month index {index}")]
    NegativeHours { index: u32, hours: f64 },
}

/// Rejections raised while turning raw rows into program records.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid {field}: `{value}`")]
    InvalidField { field: &'static str, value: String },
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("negative {field}: {value}")]
    NegativeCount { field: &'static str, value: i64 },
    #[error("completed count {completed} exceeds confirmed enrollment {confirmed}")]
    CompletedExceedsConfirmed { completed: u32, confirmed: u32 },
    #[error("employed count {employed} exceeds completed count {completed}")]
    EmployedExceedsCompleted { employed: u32, completed: u32 },
    #[error("unknown program `{0}`")]
    UnknownProgram(String),
    #[error(transparent)]
    Override(#[from] OverrideError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
