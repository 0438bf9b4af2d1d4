use thiserror::Error;

/// Failure kinds the pipeline needs to tell apart.
/// Everything else travels as a plain `anyhow::Error`.
#[derive(Debug, Error)]
pub enum JobsiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{stage} response failed schema validation: {detail}")]
    Schema { stage: &'static str, detail: String },

    #[error("Pre-screen returned {actual} records for {expected} listings")]
    Cardinality { expected: usize, actual: usize },

    #[error("Reasoning service temporarily unavailable: {0}")]
    Transient(String),

    #[error("Reasoning service error: {0}")]
    Service(String),

    #[error("Report error: {0}")]
    Report(String),
}

impl JobsiftError {
    pub fn schema(stage: &'static str, detail: impl Into<String>) -> Self {
        JobsiftError::Schema {
            stage,
            detail: detail.into(),
        }
    }

    pub fn is_transient(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<JobsiftError>(), Some(JobsiftError::Transient(_)))
    }

    pub fn is_schema(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<JobsiftError>(), Some(JobsiftError::Schema { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_classifies_wrapped_errors() {
        let err: anyhow::Error = JobsiftError::Transient("503".into()).into();
        assert!(JobsiftError::is_transient(&err));
        assert!(!JobsiftError::is_schema(&err));

        let err: anyhow::Error = JobsiftError::schema("Deep filter", "bad enum").into();
        let err = err.context("Parsing Analyst at Acme");
        assert!(JobsiftError::is_schema(&err));

        assert!(!JobsiftError::is_transient(&anyhow!("plain")));
    }

    #[test]
    fn test_cardinality_message() {
        let err = JobsiftError::Cardinality { expected: 3, actual: 2 };
        assert_eq!(err.to_string(), "Pre-screen returned 2 records for 3 listings");
    }
}
