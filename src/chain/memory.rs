use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use primitive_types::{H256, U256};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    Address, ChainError, ChainReader, ChainWriter, EventSource, PendingTx, Receipt, WorkEvent,
};
use crate::pow::{Difficulty, hash_value, work_hash};

#[derive(Debug, Clone)]
enum Call {
    SubmitWork { from: Address, nonce: U256 },
    SetDifficulty { from: Address, value: U256 },
    SetRewardAmount { from: Address, value: U256 },
}

#[derive(Debug)]
enum TxState {
    Queued(Call),
    Done(Result<Receipt, ChainError>),
}

#[derive(Debug)]
struct ContractState {
    owner: Address,
    difficulty: U256,
    reward: U256,
    last_hash: H256,
    balance: U256,
    block_number: u64,
    /// (block number, event), chronological.
    events: Vec<(u64, WorkEvent)>,
    txs: HashMap<Uuid, TxState>,
}

impl ContractState {
    /// The checks `submitWork` performs, without touching state.
    fn check_submit_work(&self, from: Address, nonce: U256) -> Result<H256, ChainError> {
        let target = Difficulty::new(self.difficulty)
            .map_err(|e| ChainError::Reverted(e.to_string()))?
            .target();
        let hash = work_hash(&self.last_hash, &from, &nonce);
        if hash_value(&hash) >= target {
            return Err(ChainError::Reverted("invalid nonce".into()));
        }
        if self.balance < self.reward {
            return Err(ChainError::Reverted("insufficient funds".into()));
        }
        Ok(hash)
    }

    fn only_owner(&self, from: Address) -> Result<(), ChainError> {
        if from != self.owner {
            return Err(ChainError::Reverted("caller is not the owner".into()));
        }
        Ok(())
    }

    /// Apply a call as part of a new block.
    fn execute(&mut self, call: Call) -> Result<Option<WorkEvent>, ChainError> {
        match call {
            Call::SubmitWork { from, nonce } => {
                let hash = self.check_submit_work(from, nonce)?;
                self.balance -= self.reward;
                self.last_hash = hash;
                Ok(Some(WorkEvent {
                    miner: from,
                    nonce,
                    hash,
                    reward: self.reward,
                }))
            }
            Call::SetDifficulty { from, value } => {
                self.only_owner(from)?;
                if value.is_zero() {
                    return Err(ChainError::Reverted("difficulty must be positive".into()));
                }
                self.difficulty = value;
                Ok(None)
            }
            Call::SetRewardAmount { from, value } => {
                self.only_owner(from)?;
                self.reward = value;
                Ok(None)
            }
        }
    }
}

/// In-memory proof-of-work contract for development and tests.
///
/// Transactions are queued when sent and executed, one block each, when
/// they are waited for. Any number of live subscribers may be attached.
#[derive(Debug)]
pub struct MemoryChain {
    state: Mutex<ContractState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<WorkEvent>>>,
    offline: AtomicBool,
}

impl MemoryChain {
    pub fn new(owner: Address, difficulty: U256, reward: U256, balance: U256) -> Self {
        Self {
            state: Mutex::new(ContractState {
                owner,
                difficulty,
                reward,
                last_hash: H256::zero(),
                balance,
                block_number: 0,
                events: Vec::new(),
                txs: HashMap::new(),
            }),
            subscribers: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Send ether to the contract.
    pub fn fund(&self, amount: U256) {
        let mut state = self.state.lock().expect("mutex poisoned");
        state.balance = state.balance.saturating_add(amount);
    }

    /// Simulate a node outage: every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Number of transactions ever sent, included or not.
    pub fn tx_count(&self) -> usize {
        self.state.lock().expect("mutex poisoned").txs.len()
    }

    fn ensure_online(&self) -> Result<(), ChainError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(ChainError::Transport("memory chain is offline".into()));
        }
        Ok(())
    }

    fn send(&self, call: Call) -> Result<PendingTx, ChainError> {
        self.ensure_online()?;
        let id = Uuid::new_v4();
        debug!("CHAIN - queued tx {} {:?}", id, call);
        let mut state = self.state.lock().expect("mutex poisoned");
        state.txs.insert(id, TxState::Queued(call));
        Ok(PendingTx { id })
    }

    fn broadcast(&self, event: &WorkEvent) {
        let mut subs = self.subscribers.lock().expect("mutex poisoned");
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl ChainReader for MemoryChain {
    async fn owner(&self) -> Result<Address, ChainError> {
        self.ensure_online()?;
        Ok(self.state.lock().expect("mutex poisoned").owner)
    }

    async fn difficulty(&self) -> Result<U256, ChainError> {
        self.ensure_online()?;
        Ok(self.state.lock().expect("mutex poisoned").difficulty)
    }

    async fn last_hash(&self) -> Result<H256, ChainError> {
        self.ensure_online()?;
        Ok(self.state.lock().expect("mutex poisoned").last_hash)
    }

    async fn reward_amount(&self) -> Result<U256, ChainError> {
        self.ensure_online()?;
        Ok(self.state.lock().expect("mutex poisoned").reward)
    }

    async fn balance(&self) -> Result<U256, ChainError> {
        self.ensure_online()?;
        Ok(self.state.lock().expect("mutex poisoned").balance)
    }
}

#[async_trait]
impl ChainWriter for MemoryChain {
    async fn call_submit_work(&self, from: Address, nonce: U256) -> Result<(), ChainError> {
        self.ensure_online()?;
        let state = self.state.lock().expect("mutex poisoned");
        state.check_submit_work(from, nonce).map(|_| ())
    }

    async fn submit_work(&self, from: Address, nonce: U256) -> Result<PendingTx, ChainError> {
        self.send(Call::SubmitWork { from, nonce })
    }

    async fn set_difficulty(&self, from: Address, value: U256) -> Result<PendingTx, ChainError> {
        self.send(Call::SetDifficulty { from, value })
    }

    async fn set_reward_amount(
        &self,
        from: Address,
        value: U256,
    ) -> Result<PendingTx, ChainError> {
        self.send(Call::SetRewardAmount { from, value })
    }

    async fn wait_for(&self, tx: PendingTx) -> Result<Receipt, ChainError> {
        self.ensure_online()?;
        let (result, event) = {
            let mut state = self.state.lock().expect("mutex poisoned");
            let call = match state.txs.get(&tx.id) {
                None => return Err(ChainError::UnknownTransaction(tx.id)),
                Some(TxState::Done(result)) => return result.clone(),
                Some(TxState::Queued(call)) => call.clone(),
            };

            state.block_number += 1;
            let block_number = state.block_number;
            let (result, event) = match state.execute(call) {
                Ok(event) => (
                    Ok(Receipt {
                        tx: tx.id,
                        block_number,
                        timestamp: Utc::now().timestamp(),
                    }),
                    event,
                ),
                Err(e) => (Err(e), None),
            };
            if let Some(event) = &event {
                state.events.push((block_number, event.clone()));
            }
            state.txs.insert(tx.id, TxState::Done(result.clone()));
            (result, event)
        };

        match &result {
            Ok(receipt) => info!(
                "CHAIN - tx {} included in block #{}",
                tx.id, receipt.block_number
            ),
            Err(e) => info!("CHAIN - tx {} failed: {}", tx.id, e),
        }
        if let Some(event) = event {
            self.broadcast(&event);
        }
        result
    }
}

#[async_trait]
impl EventSource for MemoryChain {
    async fn query_work_events(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<WorkEvent>, ChainError> {
        self.ensure_online()?;
        let state = self.state.lock().expect("mutex poisoned");
        let to_block = to_block.unwrap_or(state.block_number);
        Ok(state
            .events
            .iter()
            .filter(|(block, _)| (from_block..=to_block).contains(block))
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<WorkEvent>, ChainError> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("mutex poisoned").push(tx);
        Ok(rx)
    }
}
