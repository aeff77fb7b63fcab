use thiserror::Error;

/// Errors raised by the prediction and simulation pipeline.
///
/// None of these are retried: they indicate structural mismatches between
/// inputs, stdev maps and the trained model rather than transient faults.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("no stat record for team: {0}")]
    MissingTeamData(String),

    #[error("feature vector is missing selected features: {missing:?}")]
    FeatureMismatch { missing: Vec<String> },

    #[error("no standard deviation available for stat: {0}")]
    InsufficientVariance(String),

    #[error("invalid standard deviation {value} for stat: {stat}")]
    InvalidStdev { stat: String, value: f64 },

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid bracket: {0}")]
    InvalidBracket(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no feature reached the importance threshold {threshold}")]
    EmptyFeatureSelection { threshold: f64 },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("unknown team: {0}")]
    UnknownTeam(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to write TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(feature = "python")]
impl From<SimError> for pyo3::PyErr {
    fn from(err: SimError) -> Self {
        match err {
            SimError::Io(e) => pyo3::exceptions::PyIOError::new_err(e.to_string()),
            other => pyo3::exceptions::PyValueError::new_err(other.to_string()),
        }
    }
}
