pub mod contracts;
pub mod funding;
pub mod lock;
pub mod manager;
pub mod store;

pub use contracts::{ContractMetadata, ContractStore};
pub use funding::{DEFAULT_FUND_UNITS, FUNDABLE_NETWORKS, ensure_fundable, is_fundable};
pub use manager::{FundReceipt, WalletBalance, WalletManager};
pub use store::{StoreFile, StoredWallet, WalletStore};
