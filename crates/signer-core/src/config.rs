use chain_substrate::ss58::NetworkPrefix;
use serde::{Deserialize, Serialize};

use crate::error::SignerError;

/// Challenge signed once per session to learn the account's public key.
pub const DEFAULT_CHALLENGE: &str = "hello world";

/// Bridge settings. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// SS58 prefix of the target ledger.
    pub network_prefix: u16,
    /// Human-readable message signed when binding an account.
    pub challenge_message: String,
    /// Check that the recovered key belongs to the account that signed.
    pub verify_signer: bool,
    /// Capacity of the intent channel between handles and the workflow task.
    pub command_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            network_prefix: NetworkPrefix::SUBSTRATE.value(),
            challenge_message: DEFAULT_CHALLENGE.to_string(),
            verify_signer: true,
            command_buffer: 16,
        }
    }
}

impl BridgeConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, SignerError> {
        let config: BridgeConfig = serde_json::from_str(json)
            .map_err(|e| SignerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SignerError> {
        self.prefix()?;
        if self.challenge_message.is_empty() {
            return Err(SignerError::InvalidConfig(
                "challenge_message must not be empty".into(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(SignerError::InvalidConfig(
                "command_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn prefix(&self) -> Result<NetworkPrefix, SignerError> {
        Ok(NetworkPrefix::new(self.network_prefix)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_document_uses_defaults() {
        let config = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.prefix().unwrap(), NetworkPrefix::SUBSTRATE);
        assert_eq!(config.challenge_message, "hello world");
        assert!(config.verify_signer);
    }

    #[test]
    fn fields_override_defaults() {
        let config =
            BridgeConfig::from_json(r#"{"network_prefix": 0, "verify_signer": false}"#).unwrap();
        assert_eq!(config.network_prefix, 0);
        assert!(!config.verify_signer);
        assert_eq!(config.command_buffer, 16);
    }

    #[test]
    fn reserved_prefix_is_rejected() {
        let err = BridgeConfig::from_json(r#"{"network_prefix": 46}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = BridgeConfig::from_json(r#"{"prefix": 42}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn empty_challenge_is_rejected() {
        let err = BridgeConfig::from_json(r#"{"challenge_message": ""}"#).unwrap_err();
        assert!(err.to_string().contains("challenge_message"));
    }
}
