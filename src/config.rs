use std::env;

use primitive_types::U256;
use thiserror::Error;

use crate::chain::{Address, parse_address, parse_ether};
use crate::pow::Difficulty;

/// Difficulty the development contract starts with.
pub const DEFAULT_DIFFICULTY: u64 = 1_000_000;

/// Default account when none is configured (a well-known dev address).
const DEFAULT_ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process settings, read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub account: Address,
    pub owner: Address,
    pub difficulty: Difficulty,
    pub reward: U256,
    pub funding: U256,
    pub history_from_block: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any name -> value lookup. Missing names take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "127.0.0.1");
        let port = var("PORT", "8080")
            .parse()
            .map_err(|_| invalid("PORT", "not a port number"))?;

        let account = parse_address(&var("MINER_ACCOUNT", DEFAULT_ACCOUNT))
            .map_err(|e| invalid("MINER_ACCOUNT", e))?;
        let owner = match lookup("CONTRACT_OWNER") {
            Some(text) => parse_address(&text).map_err(|e| invalid("CONTRACT_OWNER", e))?,
            None => account,
        };

        let default_difficulty = DEFAULT_DIFFICULTY.to_string();
        let difficulty = Difficulty::parse(&var("INITIAL_DIFFICULTY", &default_difficulty))
            .map_err(|e| invalid("INITIAL_DIFFICULTY", e))?;
        let reward =
            parse_ether(&var("REWARD_ETH", "0.0005")).map_err(|e| invalid("REWARD_ETH", e))?;
        let funding = parse_ether(&var("CONTRACT_FUNDING_ETH", "1"))
            .map_err(|e| invalid("CONTRACT_FUNDING_ETH", e))?;
        let history_from_block = var("HISTORY_FROM_BLOCK", "0")
            .parse()
            .map_err(|_| invalid("HISTORY_FROM_BLOCK", "not a block number"))?;

        Ok(Self {
            host,
            port,
            account,
            owner,
            difficulty,
            reward,
            funding,
            history_from_block,
        })
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}
