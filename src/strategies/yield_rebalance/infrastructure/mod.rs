pub mod abi;
pub mod chain_reader;
pub mod custody;
pub mod position_reader;
pub mod wallet_store;
pub mod yield_oracle;

pub use abi::{AbiSet, ContractKind};
pub use chain_reader::{ChainReader, JsonRpcChainReader};
pub use custody::{ContractCall, CustodyClient, HttpCustodyClient, Invocation, WalletHandle};
pub use position_reader::{PositionReader, PositionReadout};
pub use wallet_store::{JsonWalletStore, WalletRecord, WalletStore};
pub use yield_oracle::{HttpYieldOracle, YieldOracle};
