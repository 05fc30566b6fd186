use thiserror::Error;

/// Substrate address errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubstrateError {
    #[error("invalid network prefix: {0}")]
    InvalidPrefix(u16),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_prefix() {
        let err = SubstrateError::InvalidPrefix(16384);
        assert_eq!(err.to_string(), "invalid network prefix: 16384");
    }

    #[test]
    fn display_invalid_address() {
        let err = SubstrateError::InvalidAddress("invalid checksum".into());
        assert_eq!(err.to_string(), "invalid address: invalid checksum");
    }
}
