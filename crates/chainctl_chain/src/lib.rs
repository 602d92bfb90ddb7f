pub mod adapter;
pub mod detect;
pub mod evm;
pub mod network;
pub mod registry;
pub mod rpc;

pub use adapter::{
    AddressSet, Capability, ChainAdapter, ContractArtifact, ContractOps, Deployment, GenesisWallet,
    NodeOps, NodeOptions, NodeStart, NodeStatus, Seed, Transfer, TransferSource, TxHandle,
    TxStatus, WalletOps,
};
pub use detect::{Confidence, DetectionSource, NetworkDetection, NetworkDetector, NodeProbe};
pub use evm::EvmAdapter;
pub use network::{NativeCurrency, NetworkConfig};
pub use registry::{AdapterFactory, AdapterRegistry};
