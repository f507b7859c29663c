//! # CLI Module.
//!
//! This module contains all CLI related data handling and conversions.

use crate::{
	fs::{load_seed, save_config, save_results},
	scenarios::{Scenario, ScenarioOptions},
};
use clap::{Args, Parser, Subcommand};
use eigentrust_sim::{agent::lock, error::EigenError, TrustConfig};
use log::{debug, info};
use std::str::FromStr;

/// Peers listed by the trust diagnostic of the first agent.
const TOP_PEERS: usize = 5;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
	#[command(subcommand)]
	pub mode: Mode,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Mode {
	/// Run a scenario and save the results. Requires 'RunData'.
	Run(RunData),
	/// List the available scenarios.
	Scenarios,
	/// Display the current configuration.
	Show,
	/// Update the configuration. Requires 'UpdateData'.
	Update(UpdateData),
}

/// Run subcommand input.
#[derive(Args, Debug)]
pub struct RunData {
	/// Scenario name (one, two, three, four, A-F).
	#[clap(long = "scenario")]
	scenario: Option<String>,
	/// Network size; scenarios enforce their own minimum (default 10).
	#[clap(long = "nodes")]
	nodes: Option<String>,
	/// Transaction rounds (default 100).
	#[clap(long = "rounds")]
	rounds: Option<String>,
	/// Peers every honest agent pre-trusts (default 2).
	#[clap(long = "pre-trusted")]
	pre_trusted: Option<String>,
	/// Rounds between sensing passes (default 5).
	#[clap(long = "sense-every")]
	sense_every: Option<String>,
	/// RNG seed; falls back to SIM_SEED, then to a random seed.
	#[clap(long = "seed")]
	seed: Option<String>,
	/// Run sensing passes concurrently.
	#[clap(long = "concurrent")]
	concurrent: bool,
}

/// Configuration update subcommand input.
#[derive(Args, Debug, Default)]
pub struct UpdateData {
	/// Per-transaction trust increment.
	#[clap(long = "epsilon")]
	epsilon: Option<String>,
	/// Trust of a peer nobody has transacted with yet (0-1).
	#[clap(long = "baseline-trust")]
	baseline_trust: Option<String>,
	/// Transactions required for promotion into the primary set.
	#[clap(long = "alpha")]
	alpha: Option<String>,
	/// Transactions required for graduation into the extended set.
	#[clap(long = "beta")]
	beta: Option<String>,
	/// Share of the network the primary set must cover (0-1).
	#[clap(long = "gamma")]
	gamma: Option<String>,
	/// Tolerance below perfect altruism (0-1).
	#[clap(long = "delta")]
	delta: Option<String>,
	/// Share of the network a primary informant may deflate (0-1).
	#[clap(long = "sweep-ratio")]
	sweep_ratio: Option<String>,
	/// Multiple of epsilon removed by a negative transaction.
	#[clap(long = "negative-penalty")]
	negative_penalty: Option<String>,
}

fn parse_field<T: FromStr>(name: &str, value: &Option<String>) -> Result<Option<T>, EigenError>
where
	T::Err: std::fmt::Display,
{
	value
		.as_deref()
		.map(|raw| {
			raw.parse::<T>()
				.map_err(|e| EigenError::ParsingError(format!("Invalid {}: {}", name, e)))
		})
		.transpose()
}

impl RunData {
	/// Parses the scenario, its options and the explicit seed, if any.
	pub fn to_options(&self) -> Result<(Scenario, ScenarioOptions, Option<u64>), EigenError> {
		let scenario: Scenario = self
			.scenario
			.as_deref()
			.ok_or_else(|| EigenError::ValidationError("Missing scenario.".to_string()))?
			.parse()?;

		let defaults = ScenarioOptions::default();
		let options = ScenarioOptions {
			nodes: parse_field("nodes", &self.nodes)?.unwrap_or(defaults.nodes),
			rounds: parse_field("rounds", &self.rounds)?.unwrap_or(defaults.rounds),
			pre_trusted: parse_field("pre-trusted", &self.pre_trusted)?
				.unwrap_or(defaults.pre_trusted),
			sense_every: parse_field("sense-every", &self.sense_every)?
				.unwrap_or(defaults.sense_every),
			concurrent: self.concurrent,
		};

		if options.nodes == 0 {
			return Err(EigenError::ValidationError("--nodes must be positive.".to_string()));
		}

		let seed = parse_field("seed", &self.seed)?;
		Ok((scenario, options, seed))
	}
}

impl UpdateData {
	/// Applies the update on a copy of `config` and validates the result.
	pub fn apply(&self, config: &TrustConfig) -> Result<TrustConfig, EigenError> {
		let mut updated = config.clone();

		if let Some(epsilon) = parse_field("epsilon", &self.epsilon)? {
			updated.epsilon = epsilon;
		}
		if let Some(trust) = parse_field("baseline-trust", &self.baseline_trust)? {
			updated.baseline_trust = trust;
		}
		if let Some(alpha) = parse_field("alpha", &self.alpha)? {
			updated.alpha = alpha;
		}
		if let Some(beta) = parse_field("beta", &self.beta)? {
			updated.beta = beta;
		}
		if let Some(gamma) = parse_field("gamma", &self.gamma)? {
			updated.gamma = gamma;
		}
		if let Some(delta) = parse_field("delta", &self.delta)? {
			updated.delta = delta;
		}
		if let Some(ratio) = parse_field("sweep-ratio", &self.sweep_ratio)? {
			updated.deflation_sweep_ratio = ratio;
		}
		if let Some(penalty) = parse_field("negative-penalty", &self.negative_penalty)? {
			updated.negative_penalty = penalty;
		}

		updated.validate()?;
		Ok(updated)
	}
}

/// Handles the `run` command.
pub async fn handle_run(config: TrustConfig, data: RunData) -> Result<(), EigenError> {
	let (scenario, options, seed) = data.to_options()?;
	let seed = match seed {
		Some(seed) => seed,
		None => load_seed()?.unwrap_or_else(rand::random),
	};
	info!("Running scenario {} with seed {}", scenario, seed);
	debug!("Options: {:?}", options);

	let sim = scenario.run(config, seed, &options).await?;

	if let Some(first) = sim.agents().first() {
		let agent = lock(first);
		let normalized = agent.normalized_trust();
		info!("Peers of {} by trust:", agent.node());
		for view in agent.peers_by_trust().iter().take(TOP_PEERS) {
			let share = normalized.get(&view.identity()).copied().unwrap_or_default();
			info!("  {} C={:.4}", view, share);
		}
	}

	let detection = sim.detection();
	info!(
		"Honest agents condemned {}/{} adversary views ({:.2}%) and {}/{} honest views ({:.2}%)",
		detection.adversaries_condemned,
		detection.adversary_views,
		detection.detection_rate() * 100.0,
		detection.honest_condemned,
		detection.honest_views,
		detection.false_positive_rate() * 100.0
	);

	let filepath = save_results(sim.summary())?;
	info!("Results saved at \"{}\".", filepath.display());

	Ok(())
}

/// Handles the `scenarios` command.
pub fn handle_scenarios() {
	for scenario in Scenario::ALL {
		info!("{:>5}  {}", scenario.name(), scenario.description());
	}
}

/// Handles the CLI project configuration update.
pub fn handle_update(config: &mut TrustConfig, data: UpdateData) -> Result<(), EigenError> {
	*config = data.apply(config)?;
	let filepath = save_config(config)?;
	info!("Configuration saved at \"{}\".", filepath.display());
	Ok(())
}
