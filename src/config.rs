use log::warn;

use std::env;
use std::str::FromStr;

use crate::core::crypto::Address;
use crate::core::ledger::LedgerParams;
use crate::core::miner::MinerConfig;

/// Service discovery and chain parameters, all supplied through the
/// environment with localhost defaults.
///
/// Peer URLs (defaults in parentheses):
/// - `WALLET_SERVICE_URL`      (http://localhost:8000)
/// - `TRANSACTION_SERVICE_URL` (http://localhost:8001)
/// - `BLOCKCHAIN_SERVICE_URL`  (http://localhost:8002)
/// - `MINER_SERVICE_URL`       (http://localhost:8003)
///
/// Bind ports: `WALLET_SERVICE_PORT`, `TRANSACTION_SERVICE_PORT`,
/// `BLOCKCHAIN_SERVICE_PORT`, `MINER_SERVICE_PORT` (8000-8003).
///
/// Chain parameters: `MINER_ADDRESS`, `MINICOIN_DATA_DIR`,
/// `MINICOIN_DIFFICULTY`, `MINICOIN_RETARGET_INTERVAL`,
/// `MINICOIN_TARGET_BLOCK_SECS`, `MINICOIN_MINING_REWARD`,
/// `MINICOIN_BLOCK_TX_LIMIT`, `MINICOIN_POOL_MAX_AGE_SECS`, and
/// `MINICOIN_GENESIS_GRANTS` (comma-separated `address:amount` pairs).
#[derive(Debug, Clone)]
pub struct Config {
    pub wallet_url: String,
    pub transaction_url: String,
    pub blockchain_url: String,
    pub miner_url: String,

    pub wallet_port: u16,
    pub transaction_port: u16,
    pub blockchain_port: u16,
    pub miner_port: u16,

    pub miner_address: Address,
    pub data_dir: String,

    pub initial_difficulty: u8,
    pub retarget_interval: u64,
    pub target_block_secs: i64,
    pub mining_reward: u64,
    pub block_tx_limit: usize,
    pub pool_max_age_secs: i64,
    pub genesis_grants: Vec<(Address, u64)>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            wallet_url: env_or("WALLET_SERVICE_URL", "http://localhost:8000"),
            transaction_url: env_or("TRANSACTION_SERVICE_URL", "http://localhost:8001"),
            blockchain_url: env_or("BLOCKCHAIN_SERVICE_URL", "http://localhost:8002"),
            miner_url: env_or("MINER_SERVICE_URL", "http://localhost:8003"),

            wallet_port: parse_env("WALLET_SERVICE_PORT", 8000),
            transaction_port: parse_env("TRANSACTION_SERVICE_PORT", 8001),
            blockchain_port: parse_env("BLOCKCHAIN_SERVICE_PORT", 8002),
            miner_port: parse_env("MINER_SERVICE_PORT", 8003),

            miner_address: Address(env_or("MINER_ADDRESS", "MINER_REWARD_ADDRESS")),
            data_dir: env_or("MINICOIN_DATA_DIR", "data/blockchain"),

            initial_difficulty: parse_env("MINICOIN_DIFFICULTY", 3),
            retarget_interval: parse_env("MINICOIN_RETARGET_INTERVAL", 10),
            target_block_secs: parse_env("MINICOIN_TARGET_BLOCK_SECS", 10),
            mining_reward: parse_env("MINICOIN_MINING_REWARD", 50),
            block_tx_limit: parse_env("MINICOIN_BLOCK_TX_LIMIT", 100),
            pool_max_age_secs: parse_env("MINICOIN_POOL_MAX_AGE_SECS", 3600),
            genesis_grants: parse_grants(&env_or("MINICOIN_GENESIS_GRANTS", "")),
        }
    }

    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            initial_difficulty: self.initial_difficulty,
            retarget_interval: self.retarget_interval,
            target_block_secs: self.target_block_secs,
            mining_reward: self.mining_reward,
            genesis_grants: self.genesis_grants.clone(),
        }
    }

    pub fn miner_config(&self) -> MinerConfig {
        MinerConfig {
            reward_address: self.miner_address.clone(),
            mining_reward: self.mining_reward,
            block_tx_limit: self.block_tx_limit,
        }
    }

    pub fn pool_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pool_max_age_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Could not parse {}={}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Parses `address:amount,address:amount`, skipping malformed entries.
fn parse_grants(raw: &str) -> Vec<(Address, u64)> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let (address, amount) = entry.rsplit_once(':')?;
            match amount.trim().parse() {
                Ok(amount) => Some((Address(address.trim().to_string()), amount)),
                Err(_) => {
                    warn!("Skipping malformed genesis grant: {}", entry);
                    None
                }
            }
        })
        .collect()
}
