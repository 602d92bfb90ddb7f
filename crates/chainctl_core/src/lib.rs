pub mod config;
pub mod error;
pub mod logging;
pub mod units;

pub use config::{ChainConfig, ConfigPaths};
pub use error::{ChainError, ErrorCategory, Result};
pub use units::{format_units, parse_positive_units, parse_units};
