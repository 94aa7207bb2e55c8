//! A sample multi-chain deployment changeset.
//!
//! Each configured chain gets one top-level sequence that deploys and then
//! configures the contracts of its family. The sequences run concurrently
//! and share one address book and one report store.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use futures::future::join_all;
use opflow_core::{GenericReport, OpflowError, Result};
use opflow_engine::{
    execute_operation_with, execute_sequence_with, Bundle, ExecuteOptions, Operation,
    OperationOutcome, RetryConfig, Sequence, SequenceOutcome,
};
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::chain::{AddressBook, Chain, SimulatedRpc};
use crate::config::RunnerConfig;

/// Gas limit of the first deployment attempt.
pub const INITIAL_GAS_LIMIT: u64 = 100_000;

/// Gas limit used for configuration transactions.
const CONFIGURE_GAS_LIMIT: u64 = 500_000;

/// Dependencies shared by every operation of the changeset.
#[derive(Clone)]
pub struct ChangesetDeps {
    pub address_book: AddressBook,
    pub rpc: SimulatedRpc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployInput {
    pub chain: Chain,
    pub contract: String,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployOutput {
    pub address: String,
    /// Transaction hash, absent when the contract was already deployed.
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureInput {
    pub chain: Chain,
    pub contract: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureOutput {
    pub tx_hash: String,
}

/// Contract name to address, for one chain.
pub type ChainAddresses = BTreeMap<String, String>;

/// Aggregated result of a changeset run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesetOutput {
    /// Flattened reports of every chain's sequence, chain by chain.
    pub reports: Vec<GenericReport>,

    /// Address book after the run, keyed by chain selector.
    pub address_book: BTreeMap<u64, ChainAddresses>,
}

/// The changeset's operations and sequence, built once per run.
#[derive(Clone)]
pub struct Changeset {
    deploy_chain: Sequence<Chain, ChainAddresses, ChangesetDeps>,
}

impl Changeset {
    pub fn new(config: &RunnerConfig) -> Self {
        let deploy = deploy_contract();
        let configure = configure_contract();

        let deploy_options = ExecuteOptions::new()
            .with_retry_config(operation_retry(config).with_input_hook(raise_gas_limit));
        let configure_options = ExecuteOptions::new().with_retry_config(operation_retry(config));

        let deploy_chain = Sequence::new(
            "deploy-chain",
            Version::new(1, 0, 0),
            "Deploy and configure every contract of a chain",
            move |bundle: Bundle, deps: ChangesetDeps, chain: Chain| {
                let deploy = deploy.clone();
                let configure = configure.clone();
                let deploy_options = deploy_options.clone();
                let configure_options = configure_options.clone();
                async move {
                    let mut addresses = ChainAddresses::new();

                    for contract in chain.family.contracts() {
                        let input = DeployInput {
                            chain,
                            contract: contract.to_string(),
                            gas_limit: INITIAL_GAS_LIMIT,
                        };
                        let outcome = execute_operation_with(
                            &bundle,
                            &deploy,
                            deps.clone(),
                            input,
                            deploy_options.clone(),
                        )
                        .await;
                        let deployed = output_of(outcome).map_err(|err| {
                            with_context(
                                err,
                                format!("failed to deploy {} for chain {}", contract, chain.selector),
                            )
                        })?;

                        let input = ConfigureInput {
                            chain,
                            contract: contract.to_string(),
                        };
                        let outcome = execute_operation_with(
                            &bundle,
                            &configure,
                            deps.clone(),
                            input,
                            configure_options.clone(),
                        )
                        .await;
                        output_of(outcome).map_err(|err| {
                            with_context(
                                err,
                                format!("failed to configure {} for chain {}", contract, chain.selector),
                            )
                        })?;

                        addresses.insert(contract.to_string(), deployed.address);
                    }

                    Ok(addresses)
                }
            },
        );

        Self { deploy_chain }
    }

    /// Run the chain's sequence as a top-level invocation.
    ///
    /// The sequence itself is not retried: its steps are retried individually.
    pub async fn deploy_chain(
        &self,
        bundle: &Bundle,
        deps: ChangesetDeps,
        chain: Chain,
    ) -> SequenceOutcome<Chain, ChainAddresses> {
        let options = ExecuteOptions::new().with_retry_config(RetryConfig::disabled());
        execute_sequence_with(bundle, &self.deploy_chain, deps, chain, options).await
    }
}

/// Deploys one contract, skipping chains where the address book already
/// knows it.
fn deploy_contract() -> Operation<DeployInput, DeployOutput, ChangesetDeps> {
    Operation::new(
        "deploy-contract",
        Version::new(1, 0, 0),
        "Deploy a contract to a chain",
        |bundle: Bundle, deps: ChangesetDeps, input: DeployInput| async move {
            if let Some(address) = deps.address_book.get(input.chain.selector, &input.contract).await {
                info!("{} already deployed on {} at {}", input.contract, input.chain, address);
                return Ok(DeployOutput {
                    address,
                    tx_hash: None,
                });
            }

            let payload = format!("deploy:{}", input.contract);
            let tx_hash = deps
                .rpc
                .send(&bundle.context(), input.chain, &payload, input.gas_limit)
                .await?;

            let address = input
                .chain
                .family
                .simulated_address(input.chain.selector, &input.contract);
            deps.address_book
                .insert(input.chain.selector, &input.contract, address.clone())
                .await;

            info!("📦 Deployed {} on {} at {}", input.contract, input.chain, address);
            Ok(DeployOutput {
                address,
                tx_hash: Some(tx_hash),
            })
        },
    )
}

/// Configures a deployed contract. Fails for good if it was never deployed.
fn configure_contract() -> Operation<ConfigureInput, ConfigureOutput, ChangesetDeps> {
    Operation::new(
        "configure-contract",
        Version::new(1, 0, 0),
        "Configure a deployed contract",
        |bundle: Bundle, deps: ChangesetDeps, input: ConfigureInput| async move {
            let address = deps
                .address_book
                .get(input.chain.selector, &input.contract)
                .await
                .ok_or_else(|| {
                    OpflowError::unrecoverable(anyhow!(
                        "{} is not deployed on chain {}",
                        input.contract,
                        input.chain.selector
                    ))
                })?;

            let payload = format!("configure:{}", address);
            let tx_hash = deps
                .rpc
                .send(&bundle.context(), input.chain, &payload, CONFIGURE_GAS_LIMIT)
                .await?;

            Ok(ConfigureOutput { tx_hash })
        },
    )
}

fn operation_retry<I, D>(config: &RunnerConfig) -> RetryConfig<I, D> {
    RetryConfig::default()
        .with_max_attempts(config.max_attempts)
        .with_disable_retry(config.disable_retry)
}

/// Double the gas limit for the next deployment attempt.
fn raise_gas_limit(input: &DeployInput, _deps: &ChangesetDeps) -> DeployInput {
    DeployInput {
        gas_limit: input.gas_limit.saturating_mul(2),
        ..input.clone()
    }
}

fn output_of<I, O>(outcome: OperationOutcome<I, O>) -> Result<O> {
    outcome?.into_result()
}

/// Prefix an error with a message, keeping whether it is recoverable.
fn with_context(err: OpflowError, message: String) -> OpflowError {
    OpflowError::from(anyhow::Error::new(err).context(message))
}

/// Deploy to every configured chain concurrently.
///
/// Fails with the first chain's error if any chain failed. All reports stay
/// in the bundle's store either way.
pub async fn run(
    config: &RunnerConfig,
    bundle: &Bundle,
    deps: ChangesetDeps,
) -> anyhow::Result<ChangesetOutput> {
    let changeset = Changeset::new(config);

    let handles: Vec<_> = config
        .chains
        .iter()
        .map(|chain| {
            let changeset = changeset.clone();
            let bundle = bundle.clone();
            let deps = deps.clone();
            let chain = *chain;
            tokio::spawn(async move { changeset.deploy_chain(&bundle, deps, chain).await })
        })
        .collect();

    let mut reports = Vec::new();
    let mut failures = Vec::new();

    for (chain, joined) in config.chains.iter().zip(join_all(handles).await) {
        let outcome = joined.with_context(|| format!("Sequence for chain {} panicked", chain))?;
        match outcome {
            Ok(report) => {
                info!("✅ Chain {} done with {} reports", chain, report.execution_reports.len());
                reports.extend(report.execution_reports);
            }
            Err(failure) => {
                error!("❌ Chain {} failed: {}", chain, failure.error);
                reports.extend(failure.report.execution_reports);
                failures.push(anyhow!(failure.error).context(format!("Chain {} failed", chain)));
            }
        }
    }

    let failed = failures.len();
    if let Some(first) = failures.into_iter().next() {
        return Err(first.context(format!(
            "{} of {} chain(s) failed",
            failed,
            config.chains.len()
        )));
    }

    Ok(ChangesetOutput {
        reports,
        address_book: deps.address_book.snapshot().await,
    })
}
