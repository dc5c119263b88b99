pub mod error;
pub mod memory;
pub mod units;

use async_trait::async_trait;
use primitive_types::{H160, H256, U256};
use tokio::sync::mpsc;
use uuid::Uuid;

pub use error::ChainError;
pub use memory::MemoryChain;
pub use units::{format_ether, parse_ether};

/// 20-byte account identifier.
pub type Address = H160;

/// One accepted proof-of-work submission, as logged by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkEvent {
    pub miner: Address,
    pub nonce: U256,
    pub hash: H256,
    pub reward: U256,
}

/// Handle of a sent transaction. Its effect is not trusted until
/// [`ChainWriter::wait_for`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingTx {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx: Uuid,
    pub block_number: u64,
    pub timestamp: i64, // Unix timestamp (UTC)
}

/// Read side of the proof-of-work contract.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn owner(&self) -> Result<Address, ChainError>;
    async fn difficulty(&self) -> Result<U256, ChainError>;
    async fn last_hash(&self) -> Result<H256, ChainError>;
    async fn reward_amount(&self) -> Result<U256, ChainError>;
    /// Native balance held by the contract, in wei.
    async fn balance(&self) -> Result<U256, ChainError>;
}

/// Write side of the contract. Every mutating call is sent by `from`.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Evaluate `submitWork(nonce)` against current state without mutating it.
    async fn call_submit_work(&self, from: Address, nonce: U256) -> Result<(), ChainError>;
    async fn submit_work(&self, from: Address, nonce: U256) -> Result<PendingTx, ChainError>;
    async fn set_difficulty(&self, from: Address, value: U256) -> Result<PendingTx, ChainError>;
    async fn set_reward_amount(&self, from: Address, value: U256)
    -> Result<PendingTx, ChainError>;
    /// Wait until `tx` is included and confirmed.
    async fn wait_for(&self, tx: PendingTx) -> Result<Receipt, ChainError>;
}

/// Source of `WorkSubmitted` events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events in `[from_block, to_block]` in chronological order. `None` means latest.
    async fn query_work_events(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<WorkEvent>, ChainError>;

    /// Live feed. Events arrive in emission order, one message per event.
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<WorkEvent>, ChainError>;
}

/// Everything the miner client needs from a node.
pub trait Chain: ChainReader + ChainWriter + EventSource {}

impl<T: ChainReader + ChainWriter + EventSource> Chain for T {}

/// `0x`-prefixed lowercase hex of an address.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

pub fn format_hash(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

/// Parse a hex address, with or without `0x`, in any letter case.
pub fn parse_address(text: &str) -> Result<Address, ChainError> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let bytes = hex::decode(digits).map_err(|_| ChainError::Decode(format!("bad address {text}")))?;
    if bytes.len() != 20 {
        return Err(ChainError::Decode(format!(
            "address must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}
