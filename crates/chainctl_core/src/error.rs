use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

/// Errors raised by the wallet, network and adapter layers.
///
/// Every variant propagates unchanged to the command boundary, where it is
/// rendered once and turned into exit code `1`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet \"{0}\" not found")]
    WalletNotFound(String),

    #[error("Wallet \"{0}\" already exists")]
    DuplicateWallet(String),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Funding is not allowed on network \"{network}\" (fundable networks: {allowed})")]
    FundingNotAllowed { network: String, allowed: String },

    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{chain} does not support {capability} operations")]
    UnsupportedCapability { chain: String, capability: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("No contract metadata for {0}")]
    ContractNotFound(String),
}

/// Broad classification used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caused by the caller: bad names, amounts, disallowed operations.
    UserError,
    /// Node connectivity or a node-side rejection.
    NetworkError,
    /// Store or metadata file problems.
    StorageError,
    /// Invalid or missing configuration.
    ConfigError,
}

impl ChainError {
    /// Returns the broad error category for logging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::UnsupportedNetwork(_) | Self::UnsupportedCapability { .. } => {
                ErrorCategory::ConfigError
            }
            Self::WalletNotFound(_)
            | Self::DuplicateWallet(_)
            | Self::FundingNotAllowed { .. }
            | Self::InvalidInput(_)
            | Self::ContractNotFound(_) => ErrorCategory::UserError,
            Self::NodeUnavailable(_) | Self::Rpc { .. } => ErrorCategory::NetworkError,
            Self::Persistence(_) => ErrorCategory::StorageError,
        }
    }

    /// Wraps a filesystem or decoding failure for `path`.
    pub fn persistence(path: &Path, err: impl Display) -> Self {
        Self::Persistence(format!("{}: {err}", path.display()))
    }

    /// Shorthand for [`ChainError::InvalidInput`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result alias used throughout the chainctl crates.
pub type Result<T, E = ChainError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn categories_cover_taxonomy() {
        assert_eq!(
            ChainError::Config("x".into()).category(),
            ErrorCategory::ConfigError
        );
        assert_eq!(
            ChainError::DuplicateWallet("a".into()).category(),
            ErrorCategory::UserError
        );
        assert_eq!(
            ChainError::NodeUnavailable("down".into()).category(),
            ErrorCategory::NetworkError
        );
        assert_eq!(
            ChainError::Persistence("bad".into()).category(),
            ErrorCategory::StorageError
        );
    }

    #[test]
    fn funding_message_lists_allowed_networks() {
        let err = ChainError::FundingNotAllowed {
            network: "mainnet".into(),
            allowed: "localnet, devnet".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"mainnet\""));
        assert!(msg.contains("localnet, devnet"));
    }

    #[test]
    fn persistence_includes_path() {
        let err = ChainError::persistence(&PathBuf::from("/tmp/wallets.json"), "unexpected EOF");
        assert_eq!(
            err.to_string(),
            "Persistence error: /tmp/wallets.json: unexpected EOF"
        );
    }
}
