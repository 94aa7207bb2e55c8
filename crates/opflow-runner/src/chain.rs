//! Chain families, the shared address book and a simulated RPC client.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opflow_core::{OpflowError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors raised while parsing chain configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Unknown chain family: {0}")]
    UnknownFamily(String),

    #[error("Invalid chain entry '{entry}': {message}")]
    InvalidEntry { entry: String, message: String },
}

/// The kind of chain a selector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    Evm,
    Solana,
    Aptos,
}

impl ChainFamily {
    /// Contracts deployed on every chain of this family, in deployment order.
    pub fn contracts(&self) -> &'static [&'static str] {
        match self {
            ChainFamily::Evm => &["LinkToken", "Router"],
            ChainFamily::Solana => &["Router"],
            ChainFamily::Aptos => &["Router"],
        }
    }

    /// Smallest gas (or compute unit) limit a deployment goes through with.
    pub fn min_gas(&self) -> u64 {
        match self {
            ChainFamily::Evm => 150_000,
            ChainFamily::Solana => 100_000,
            ChainFamily::Aptos => 120_000,
        }
    }

    /// Derive a deterministic address for a deployed contract.
    pub fn simulated_address(&self, selector: u64, contract: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(selector.to_be_bytes());
        hasher.update(contract.as_bytes());
        let digest = hex::encode(hasher.finalize());

        match self {
            ChainFamily::Evm => format!("0x{}", &digest[..40]),
            ChainFamily::Solana => digest[..44].to_string(),
            ChainFamily::Aptos => format!("0x{}", digest),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Solana => "solana",
            ChainFamily::Aptos => "aptos",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainFamily {
    type Err = ChainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Ok(ChainFamily::Evm),
            "solana" => Ok(ChainFamily::Solana),
            "aptos" => Ok(ChainFamily::Aptos),
            other => Err(ChainError::UnknownFamily(other.to_string())),
        }
    }
}

/// A chain selector together with its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub family: ChainFamily,
    pub selector: u64,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.selector)
    }
}

impl FromStr for Chain {
    type Err = ChainError;

    /// Parse `family:selector`, e.g. `evm:5009297550715157269`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |message: &str| ChainError::InvalidEntry {
            entry: s.to_string(),
            message: message.to_string(),
        };

        let (family, selector) = s.split_once(':').ok_or_else(|| invalid("expected family:selector"))?;
        let family = family.parse()?;
        let selector = selector
            .trim()
            .parse()
            .map_err(|_| invalid("selector is not an unsigned integer"))?;

        Ok(Chain { family, selector })
    }
}

/// Deployed contract addresses, shared by every chain's sequence.
#[derive(Clone, Default)]
pub struct AddressBook {
    entries: Arc<RwLock<BTreeMap<u64, BTreeMap<String, String>>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the address of a contract on a chain.
    pub async fn get(&self, selector: u64, contract: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(&selector).and_then(|c| c.get(contract)).cloned()
    }

    /// Record a deployed contract.
    pub async fn insert(&self, selector: u64, contract: &str, address: String) {
        let mut entries = self.entries.write().await;
        entries
            .entry(selector)
            .or_default()
            .insert(contract.to_string(), address);
    }

    /// Copy of the whole book.
    pub async fn snapshot(&self) -> BTreeMap<u64, BTreeMap<String, String>> {
        self.entries.read().await.clone()
    }
}

/// Stand-in for a chain RPC endpoint.
///
/// The first `failures` calls against each chain fail with a transient error.
#[derive(Clone, Default)]
pub struct SimulatedRpc {
    failures: u32,
    latency: Duration,
    calls: Arc<Mutex<HashMap<u64, u32>>>,
}

impl SimulatedRpc {
    pub fn new(failures: u32, latency: Duration) -> Self {
        Self {
            failures,
            latency,
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submit a transaction. Returns the transaction hash.
    pub async fn send(
        &self,
        ctx: &CancellationToken,
        chain: Chain,
        payload: &str,
        gas_limit: u64,
    ) -> Result<String> {
        let call = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| OpflowError::unrecoverable(anyhow::anyhow!("rpc call counter poisoned")))?;
            let count = calls.entry(chain.selector).or_insert(0);
            *count += 1;
            *count
        };

        tokio::select! {
            _ = ctx.cancelled() => return Err(OpflowError::Cancelled),
            _ = sleep(self.latency) => {}
        }

        if call <= self.failures {
            debug!("Simulated RPC failure on {} (call {})", chain, call);
            return Err(OpflowError::transient(anyhow::anyhow!(
                "rpc unavailable for chain {}",
                chain.selector
            )));
        }

        if gas_limit < chain.family.min_gas() {
            return Err(OpflowError::transient(anyhow::anyhow!(
                "out of gas: limit {} below {}",
                gas_limit,
                chain.family.min_gas()
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(chain.selector.to_be_bytes());
        hasher.update(call.to_be_bytes());
        hasher.update(payload.as_bytes());
        Ok(format!("0x{}", hex::encode(hasher.finalize())))
    }

    /// Number of calls made against a chain so far.
    pub fn calls(&self, selector: u64) -> u32 {
        self.calls
            .lock()
            .map(|calls| calls.get(&selector).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}
