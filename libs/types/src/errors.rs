//! Error taxonomy for the exchange
//!
//! Validation and expected-state failures are returned as values through
//! this enum; invariant violations inside the matching core are programming
//! errors and abort instead.

use crate::ids::{InstrumentId, OrderId};
use thiserror::Error;

/// Every failure the invocation surface can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("instrument already exists: {0}")]
    InstrumentExists(InstrumentId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("order not open: {0}")]
    OrderNotOpen(OrderId),

    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExchangeError::UnknownInstrument(InstrumentId(5));
        assert_eq!(err.to_string(), "unknown instrument: 5");

        let err = ExchangeError::InvalidRequest("quantity must be positive".into());
        assert!(err.to_string().contains("quantity"));
    }
}
