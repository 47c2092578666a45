pub mod approvals;
pub mod db;
pub mod domain;
pub mod error;
pub mod questionnaire;
pub mod repo;
pub mod tokens;

#[cfg(test)]
mod tests {
    use super::error::{codes, AppError};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new(codes::RETRIEVAL_UNAVAILABLE, "index missing")
            .with_details("lazy build failed")
            .with_retryable(true);
        assert!(err.is(codes::RETRIEVAL_UNAVAILABLE));
        assert_eq!(err.message, "index missing");
        assert!(err.retryable);
        assert_eq!(
            err.to_string(),
            "[RETRIEVAL_UNAVAILABLE] index missing (lazy build failed)"
        );
    }
}
