use thiserror::Error;

pub type Result<T> = std::result::Result<T, GradebookError>;

#[derive(Debug, Error)]
pub enum GradebookError {
    /// Scheme text outside {linear, gaussian, random}, or a scheme with no
    /// banding algorithm handed to an operation that needs one.
    #[error("invalid grading scheme: {0}")]
    InvalidScheme(String),

    /// Class statistics requested for a course with zero scored students.
    /// Callers must treat this as "cannot band", never as zero.
    #[error("no scored students in course {0}")]
    NoData(String),

    /// Required-marks prediction cannot be satisfied: nothing left to grade,
    /// or the target sits above every reachable band.
    #[error("target grade {target} is out of reach (current total {current_total})")]
    Infeasible { target: f64, current_total: f64 },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Data store or ledger failure, propagated unchanged.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl GradebookError {
    /// Stable code string for the transport layer to map onto its protocol.
    pub fn code(&self) -> &'static str {
        match self {
            GradebookError::InvalidScheme(_) => "invalid_scheme",
            GradebookError::NoData(_) => "no_data",
            GradebookError::Infeasible { .. } => "infeasible",
            GradebookError::NotFound { .. } => "not_found",
            GradebookError::Storage(_) => "storage",
        }
    }

    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        GradebookError::NotFound {
            kind,
            key: key.into(),
        }
    }
}
