pub mod audit;
pub mod chunks;
pub mod config;
pub mod db;
pub mod difficulty;
pub mod domain;
pub mod error;
pub mod export;
pub mod fsio;
pub mod ids;
pub mod ingest;
pub mod questions;
pub mod verify;
pub mod workspace;

#[cfg(test)]
mod tests {
    use super::error::{AppError, COUNTER_CORRUPTED};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new(COUNTER_CORRUPTED, "counter broken")
            .with_details("path=/tmp/question_id_counter.txt")
            .with_retryable(false);
        assert_eq!(err.code, "COUNTER_CORRUPTED");
        assert!(err.is_integrity_violation());
        assert_eq!(
            err.to_string(),
            "[COUNTER_CORRUPTED] counter broken (path=/tmp/question_id_counter.txt)"
        );
    }
}
