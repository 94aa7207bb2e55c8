//! Runner configuration from the environment.

use std::time::Duration;

use anyhow::Context;

use crate::chain::Chain;

/// Chains targeted when `OPFLOW_CHAINS` is unset.
pub const DEFAULT_CHAINS: &str =
    "evm:5009297550715157269,solana:124615329519749607,aptos:4741433654826277614";

/// Configuration of a changeset run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Chains to deploy to, one top-level sequence each.
    pub chains: Vec<Chain>,

    /// Attempts per operation.
    pub max_attempts: u32,

    /// Run each operation exactly once.
    pub disable_retry: bool,

    /// Calls per chain the simulated RPC fails before answering.
    pub simulated_failures: u32,

    /// Latency of every simulated RPC call.
    pub rpc_latency: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            chains: Vec::new(),
            max_attempts: opflow_engine::options::DEFAULT_MAX_ATTEMPTS,
            disable_retry: false,
            simulated_failures: 1,
            rpc_latency: Duration::from_millis(50),
        }
    }
}

impl RunnerConfig {
    /// Load the configuration from `OPFLOW_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let chains = lookup("OPFLOW_CHAINS").unwrap_or_else(|| DEFAULT_CHAINS.to_string());
        let chains = chains
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.parse::<Chain>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid OPFLOW_CHAINS")?;
        if chains.is_empty() {
            anyhow::bail!("OPFLOW_CHAINS names no chains");
        }

        let max_attempts = match lookup("OPFLOW_MAX_ATTEMPTS") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid OPFLOW_MAX_ATTEMPTS: {}", value))?,
            None => defaults.max_attempts,
        };

        let disable_retry = match lookup("OPFLOW_DISABLE_RETRY") {
            Some(value) => parse_flag(&value)
                .with_context(|| format!("Invalid OPFLOW_DISABLE_RETRY: {}", value))?,
            None => defaults.disable_retry,
        };

        let simulated_failures = match lookup("OPFLOW_SIMULATED_FAILURES") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid OPFLOW_SIMULATED_FAILURES: {}", value))?,
            None => defaults.simulated_failures,
        };

        let rpc_latency = match lookup("OPFLOW_RPC_LATENCY_MS") {
            Some(value) => Duration::from_millis(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid OPFLOW_RPC_LATENCY_MS: {}", value))?,
            ),
            None => defaults.rpc_latency,
        };

        Ok(Self {
            chains,
            max_attempts,
            disable_retry,
            simulated_failures,
            rpc_latency,
        })
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainFamily;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.chains.len(), 3);
        assert_eq!(config.chains[0].family, ChainFamily::Evm);
        assert_eq!(config.max_attempts, 10);
        assert!(!config.disable_retry);
    }

    #[test]
    fn test_overrides() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("OPFLOW_CHAINS", "evm:1, solana:2"),
            ("OPFLOW_MAX_ATTEMPTS", "3"),
            ("OPFLOW_DISABLE_RETRY", "true"),
            ("OPFLOW_SIMULATED_FAILURES", "0"),
            ("OPFLOW_RPC_LATENCY_MS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[1].selector, 2);
        assert_eq!(config.max_attempts, 3);
        assert!(config.disable_retry);
        assert_eq!(config.simulated_failures, 0);
        assert_eq!(config.rpc_latency, Duration::from_millis(5));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = RunnerConfig::from_lookup(lookup(&[("OPFLOW_CHAINS", "cosmos:1")])).unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown chain family: cosmos"));

        let err =
            RunnerConfig::from_lookup(lookup(&[("OPFLOW_MAX_ATTEMPTS", "many")])).unwrap_err();
        assert!(err.to_string().contains("OPFLOW_MAX_ATTEMPTS"));

        let err =
            RunnerConfig::from_lookup(lookup(&[("OPFLOW_DISABLE_RETRY", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("OPFLOW_DISABLE_RETRY"));

        assert!(RunnerConfig::from_lookup(lookup(&[("OPFLOW_CHAINS", " , ")])).is_err());
    }
}
