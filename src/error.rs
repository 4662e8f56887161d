use chrono::NaiveDate;
use thiserror::Error;

pub type FolioResult<T> = Result<T, FolioError>;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Caller-supplied values that violate a precondition of the pipeline.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Non-positive weight {weight} for instrument '{instrument}'")]
    NonPositiveWeight { instrument: String, weight: f64 },

    #[error("Weight {0} must be finite and strictly positive")]
    InvalidWeight(f64),

    #[error("Non-positive price {price} for instrument '{instrument}' on {date}")]
    NonPositivePrice {
        instrument: String,
        date: NaiveDate,
        price: f64,
    },

    #[error(
        "Dates for instrument '{instrument}' must be strictly increasing: {previous} is followed by {current}"
    )]
    UnsortedDates {
        instrument: String,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("Invalid distribution parameters: {0}")]
    InvalidDistribution(String),

    #[error("Instrument '{0}' is listed more than once")]
    DuplicateInstrument(String),

    #[error("Instrument set is empty")]
    EmptyInstrumentSet,
}

/// Errors raised while deriving tables from already validated input.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Insufficient data for {context}: need at least {required} observations, found {found}")]
    InsufficientData {
        context: String,
        required: usize,
        found: usize,
    },

    #[error("No weight for covariance column '{0}'")]
    MissingWeight(String),

    #[error("Instrument order is not a permutation of the covariance columns: {0}")]
    MisalignedOrder(String),

    #[error("Portfolio variance {0} is negative; the pairwise covariance matrix is indefinite")]
    NegativeVariance(f64),

    #[error("Missing series: {0}")]
    MissingSeries(String),

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors related to file I/O and serialization of exported tables.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),
}
