pub mod client;

use async_trait::async_trait;
use log::info;
use primitive_types::{H256, U256};

pub use client::{LiveFeed, MinerClient};

use crate::chain::{Address, ChainError, format_address};
use crate::pow::Difficulty;

/// Wallet / signer session.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Open a session and return the active account.
    async fn connect(&self) -> Result<Address, ChainError>;
    async fn disconnect(&self);
}

/// A wallet that always answers with one configured account.
#[derive(Debug, Clone)]
pub struct StaticWallet {
    account: Address,
}

impl StaticWallet {
    pub fn new(account: Address) -> Self {
        Self { account }
    }
}

#[async_trait]
impl Wallet for StaticWallet {
    async fn connect(&self) -> Result<Address, ChainError> {
        info!("WALLET - connected {}", format_address(&self.account));
        Ok(self.account)
    }

    async fn disconnect(&self) {
        info!("WALLET - disconnected {}", format_address(&self.account));
    }
}

/// Contract state as last read by this session.
#[derive(Debug, Clone, Default)]
pub struct ChainView {
    pub account: Option<Address>,
    pub owner: Option<Address>,
    pub difficulty: Difficulty,
    pub last_hash: Option<H256>,
    pub reward: U256,
    pub balance: U256,
}

impl ChainView {
    pub fn connected(&self) -> bool {
        self.account.is_some()
    }

    /// Whether the connected account is the contract owner. A UI policy
    /// only; the contract enforces the real restriction.
    pub fn is_privileged(&self) -> bool {
        matches!((self.account, self.owner), (Some(a), Some(o)) if a == o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_requires_matching_owner() {
        let mut view = ChainView::default();
        assert!(!view.is_privileged());

        view.account = Some(Address::repeat_byte(1));
        view.owner = Some(Address::repeat_byte(2));
        assert!(!view.is_privileged());

        view.owner = Some(Address::repeat_byte(1));
        assert!(view.is_privileged());
    }

    #[tokio::test]
    async fn static_wallet_returns_its_account() {
        let wallet = StaticWallet::new(Address::repeat_byte(7));
        assert_eq!(wallet.connect().await.unwrap(), Address::repeat_byte(7));
    }
}
