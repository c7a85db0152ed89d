use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    // Input validation errors
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Upstream collaborator errors
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Entity registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    // Component isolation errors
    #[error("Pattern matcher failed: {0}")]
    MatcherFailed(String),

    #[error("Attribution source failed: {0}")]
    SourceFailed(String),

    // Cache errors
    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // System errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Check if the error is recoverable: the request can still produce a
    /// partial result instead of failing outright.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AnalysisError::LedgerUnavailable(_)
            | AnalysisError::RegistryUnavailable(_)
            | AnalysisError::UpstreamTimeout(_)
            | AnalysisError::MatcherFailed(_)
            | AnalysisError::SourceFailed(_) => true,
            _ => false,
        }
    }

    /// Check if the error should reject the request immediately.
    pub fn is_input_error(&self) -> bool {
        match self {
            AnalysisError::InvalidAddress(_)
            | AnalysisError::InvalidTxHash(_)
            | AnalysisError::UnsupportedChain(_)
            | AnalysisError::InvalidParameter(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            AnalysisError::InvalidAddress(_)
            | AnalysisError::InvalidTxHash(_)
            | AnalysisError::UnsupportedChain(_)
            | AnalysisError::InvalidParameter(_) => "input",

            AnalysisError::LedgerUnavailable(_)
            | AnalysisError::RegistryUnavailable(_)
            | AnalysisError::UpstreamTimeout(_)
            | AnalysisError::TransactionNotFound(_) => "upstream",

            AnalysisError::MatcherFailed(_) | AnalysisError::SourceFailed(_) => "component",

            AnalysisError::CacheError(_) | AnalysisError::SerializationError(_) => "cache",

            AnalysisError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::SerializationError(err.to_string())
    }
}

// Result type alias for convenience
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(AnalysisError::LedgerUnavailable("down".to_string()).is_recoverable());
        assert!(AnalysisError::MatcherFailed("peeling".to_string()).is_recoverable());
        assert!(!AnalysisError::InvalidAddress("0xzz".to_string()).is_recoverable());
        assert!(!AnalysisError::Internal("bug".to_string()).is_recoverable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            AnalysisError::UnsupportedChain("dogecoin".to_string()).category(),
            "input"
        );
        assert_eq!(
            AnalysisError::RegistryUnavailable("503".to_string()).category(),
            "upstream"
        );
        assert_eq!(
            AnalysisError::SourceFailed("cluster".to_string()).category(),
            "component"
        );
        assert_eq!(AnalysisError::Internal("bug".to_string()).category(), "internal");
    }
}
