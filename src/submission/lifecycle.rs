use std::sync::Mutex;

use log::{debug, info, warn};
use primitive_types::{H256, U256};
use serde::Serialize;

use super::{COOLDOWN_SECS, MESSAGE_TTL_SECS};
use crate::chain::{Address, ChainReader, ChainWriter, Receipt};
use crate::error::{BlockReason, MinerError, Rejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Accepted,
    Rejected,
    Cooldown,
}

impl Phase {
    pub fn in_flight(&self) -> bool {
        matches!(self, Phase::Validating | Phase::Submitting)
    }
}

/// Everything the lifecycle owns about the current (or last) attempt.
#[derive(Debug, Clone, Default)]
pub struct SubmissionAttempt {
    /// Nonce input as typed or found, decimal.
    pub nonce: String,
    pub phase: Phase,
    /// `Accepted` or `Rejected` for the last attempt that passed the
    /// preconditions. Outlives the cooldown.
    pub last_outcome: Option<Phase>,
    pub cooldown_remaining: u32,
    pub last_error: Option<MinerError>,
    pub message: Option<String>,
    message_ttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub nonce: U256,
    pub receipt: Receipt,
    /// Fresh base hash read after inclusion; `None` if the read failed.
    pub last_hash: Option<H256>,
}

/// Drives one submission at a time from validation to cooldown.
///
/// Time only moves through [`SubmissionLifecycle::tick`], one call per second.
#[derive(Debug)]
pub struct SubmissionLifecycle {
    attempt: Mutex<SubmissionAttempt>,
    cooldown_secs: u32,
    message_ttl_secs: u32,
}

impl Default for SubmissionLifecycle {
    fn default() -> Self {
        Self::new(COOLDOWN_SECS, MESSAGE_TTL_SECS)
    }
}

impl SubmissionLifecycle {
    pub fn new(cooldown_secs: u32, message_ttl_secs: u32) -> Self {
        Self {
            attempt: Mutex::new(SubmissionAttempt::default()),
            cooldown_secs,
            message_ttl_secs,
        }
    }

    pub fn snapshot(&self) -> SubmissionAttempt {
        self.attempt.lock().expect("mutex poisoned").clone()
    }

    pub fn set_nonce_input(&self, nonce: impl Into<String>) {
        self.attempt.lock().expect("mutex poisoned").nonce = nonce.into();
    }

    /// Show a status line. Does not arm the auto-clear timer.
    pub fn report(&self, message: impl Into<String>) {
        self.attempt.lock().expect("mutex poisoned").message = Some(message.into());
    }

    /// Drop the nonce input and the status line. Cooldown keeps running.
    pub fn clear_input(&self) {
        let mut attempt = self.attempt.lock().expect("mutex poisoned");
        attempt.nonce.clear();
        attempt.message = None;
    }

    /// Advance the logical clock by one second.
    pub fn tick(&self) {
        let mut attempt = self.attempt.lock().expect("mutex poisoned");
        if attempt.cooldown_remaining > 0 {
            attempt.cooldown_remaining -= 1;
            if attempt.cooldown_remaining == 0 && attempt.phase == Phase::Cooldown {
                attempt.phase = Phase::Idle;
                debug!("SUBMIT - cooldown over, idle");
            }
        }
        if attempt.message_ttl > 0 {
            attempt.message_ttl -= 1;
            if attempt.message_ttl == 0 {
                attempt.message = None;
            }
        }
    }

    /// Submit the current nonce input on behalf of `account`.
    ///
    /// Precondition failures return `PreconditionBlocked` and leave the phase
    /// alone. Anything past the preconditions ends in cooldown, whatever the
    /// outcome.
    pub async fn submit<C>(
        &self,
        account: Option<Address>,
        chain: &C,
    ) -> Result<Accepted, MinerError>
    where
        C: ChainReader + ChainWriter + ?Sized,
    {
        let (account, input) = self.begin(account)?;
        let mut cleanup = Cleanup {
            lifecycle: self,
            input: &input,
            done: false,
        };
        let result = self.run(account, &input, chain).await;
        cleanup.done = true;
        self.finish(&input, &result);
        result
    }

    fn begin(&self, account: Option<Address>) -> Result<(Address, String), MinerError> {
        let mut attempt = self.attempt.lock().expect("mutex poisoned");
        let checked = match account {
            None => Err(BlockReason::NoSession),
            Some(_) if attempt.nonce.trim().is_empty() => Err(BlockReason::EmptyNonce),
            Some(_) if attempt.phase.in_flight() => Err(BlockReason::InFlight),
            Some(_) if attempt.cooldown_remaining > 0 => {
                Err(BlockReason::Cooldown(attempt.cooldown_remaining))
            }
            Some(account) => Ok(account),
        };
        let account = match checked {
            Ok(account) => account,
            Err(reason) => {
                debug!("SUBMIT - blocked: {}", reason);
                attempt.message = Some(reason.to_string());
                return Err(MinerError::PreconditionBlocked(reason));
            }
        };

        attempt.phase = Phase::Validating;
        attempt.message = Some("Testing nonce…".into());
        attempt.last_error = None;
        Ok((account, attempt.nonce.trim().to_string()))
    }

    async fn run<C>(&self, account: Address, input: &str, chain: &C) -> Result<Accepted, MinerError>
    where
        C: ChainReader + ChainWriter + ?Sized,
    {
        let nonce = U256::from_dec_str(input).map_err(|_| {
            MinerError::ValidationRejected(Rejection::Other(format!("invalid nonce {input:?}")))
        })?;

        chain
            .call_submit_work(account, nonce)
            .await
            .map_err(|e| MinerError::ValidationRejected(Rejection::classify(&e.reason())))?;

        self.transition(Phase::Submitting, "Nonce valid, submitting on-chain…");
        let pending = chain
            .submit_work(account, nonce)
            .await
            .map_err(|e| MinerError::SubmissionFailed(e.reason()))?;
        let receipt = chain
            .wait_for(pending)
            .await
            .map_err(|e| MinerError::SubmissionFailed(e.reason()))?;

        let last_hash = match chain.last_hash().await {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("SUBMIT - accepted but lastHash refresh failed: {}", e);
                None
            }
        };
        Ok(Accepted {
            nonce,
            receipt,
            last_hash,
        })
    }

    fn transition(&self, phase: Phase, message: &str) {
        let mut attempt = self.attempt.lock().expect("mutex poisoned");
        attempt.phase = phase;
        attempt.message = Some(message.to_string());
    }

    /// Runs for every attempt that passed the preconditions. Re-arms both
    /// timers, replacing whatever was left of the previous ones. The input is
    /// cleared only if it still holds the submitted nonce.
    fn finish(&self, submitted: &str, result: &Result<Accepted, MinerError>) {
        let mut attempt = self.attempt.lock().expect("mutex poisoned");
        match result {
            Ok(accepted) => {
                attempt.last_outcome = Some(Phase::Accepted);
                attempt.message = Some(format!("Success! Nonce {} accepted", accepted.nonce));
                info!(
                    "SUBMIT - nonce {} accepted in block #{}",
                    accepted.nonce, accepted.receipt.block_number
                );
            }
            Err(e) => {
                attempt.last_outcome = Some(Phase::Rejected);
                attempt.message = Some(e.user_message());
                attempt.last_error = Some(e.clone());
                warn!("SUBMIT - attempt failed: {}", e);
            }
        }

        if attempt.nonce.trim() == submitted {
            attempt.nonce.clear();
        }
        attempt.phase = Phase::Cooldown;
        attempt.cooldown_remaining = self.cooldown_secs;
        attempt.message_ttl = self.message_ttl_secs;
    }
}

/// Puts the lifecycle into cooldown if a submit future is dropped before it
/// finishes, so an abandoned attempt never stays in flight.
struct Cleanup<'a> {
    lifecycle: &'a SubmissionLifecycle,
    input: &'a str,
    done: bool,
}

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        if !self.done {
            let abandoned =
                MinerError::SubmissionFailed("attempt abandoned before finalization".into());
            self.lifecycle.finish(self.input, &Err(abandoned));
        }
    }
}
