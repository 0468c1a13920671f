//! Cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_display() {
        let err: CacheError = serde_json::from_slice::<serde_json::Value>(b"{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
