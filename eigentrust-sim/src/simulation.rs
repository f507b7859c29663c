//! # Simulation Module.
//!
//! The driver around the trust engine: builds and wires agents, runs
//! transaction rounds and sensing passes and summarises the outcome.

use crate::{
	agent::{lock, Agent, AgentHandle},
	config::TrustConfig,
	directory::Directory,
	error::EigenError,
	node::Identity,
	protocol::{self, Outcome, TransactionRating},
	strategy::{Behaviour, ReportingStrategy},
	trust_set::TrustReport,
};
use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};
use tokio::task::JoinSet;

/// Chance that a transaction between two honest agents goes wrong anyway.
pub const HONEST_NOISE: f64 = 1.0 / 251.0;
/// Default number of rounds between sensing passes.
pub const DEFAULT_SENSE_EVERY: u64 = 5;

/// How one round is driven.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundPlan {
	/// Chance that an agent transacts with each of its peers in a round.
	pub transact_probability: f64,
	/// Chance of a forced negative between honest agents.
	pub honest_noise: Option<f64>,
	/// Replace an adversary by a fresh identity once it served an honest
	/// agent badly.
	pub replace_sybils: bool,
}

impl Default for RoundPlan {
	fn default() -> Self {
		Self { transact_probability: 0.5, honest_noise: None, replace_sybils: false }
	}
}

impl RoundPlan {
	/// A plan with honest noise at the default rate.
	pub fn noisy() -> Self {
		Self { honest_noise: Some(HONEST_NOISE), ..Default::default() }
	}

	fn validate(&self) -> Result<(), EigenError> {
		let probabilities =
			[Some(self.transact_probability), self.honest_noise].into_iter().flatten();
		for p in probabilities {
			if !(0.0..=1.0).contains(&p) {
				return Err(EigenError::ValidationError(format!(
					"probability must be within [0, 1], got {}",
					p
				)));
			}
		}
		Ok(())
	}
}

/// Tally of one round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoundStats {
	/// Transactions attempted.
	pub attempted: usize,
	/// Positive outcomes.
	pub positive: usize,
	/// Negative outcomes.
	pub negative: usize,
	/// Unreachable counterparts.
	pub unreachable: usize,
	/// Adversaries replaced by fresh identities.
	pub replaced: usize,
}

impl RoundStats {
	fn record(&mut self, outcome: Outcome) {
		self.attempted += 1;
		match outcome {
			Outcome::Positive => self.positive += 1,
			Outcome::Negative => self.negative += 1,
			Outcome::Unreachable => self.unreachable += 1,
		}
	}
}

/// One row of the results table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
	/// Agent identity.
	pub identity: String,
	/// Whether the agent runs an adversarial strategy.
	pub adversarial: bool,
	/// Peers it knows.
	pub known_peers: usize,
	/// Peers it condemned.
	pub condemned_peers: usize,
	/// Size of its primary set.
	pub primary: usize,
	/// Size of its extended set.
	pub extended: usize,
	/// Honest agents that condemned it.
	pub condemned_by: usize,
	/// Mean trust the rest of the network holds in it.
	pub mean_trust: f64,
	/// Transactions it served honestly.
	pub served_positive: u64,
	/// Transactions it served maliciously.
	pub served_negative: u64,
}

/// How well the honest agents told adversaries apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Detection {
	/// Views honest agents hold about adversaries.
	pub adversary_views: usize,
	/// Those of them that are condemned.
	pub adversaries_condemned: usize,
	/// Views honest agents hold about other honest agents.
	pub honest_views: usize,
	/// Those of them that are condemned.
	pub honest_condemned: usize,
}

impl Detection {
	/// Share of adversary views that are condemned.
	pub fn detection_rate(&self) -> f64 {
		ratio(self.adversaries_condemned, self.adversary_views)
	}

	/// Share of honest views that are condemned.
	pub fn false_positive_rate(&self) -> f64 {
		ratio(self.honest_condemned, self.honest_views)
	}
}

fn ratio(part: usize, whole: usize) -> f64 {
	if whole == 0 {
		return 0.0;
	}
	part as f64 / whole as f64
}

/// A simulated network.
pub struct Simulation {
	config: TrustConfig,
	directory: Arc<Directory>,
	agents: Vec<AgentHandle>,
	rng: StdRng,
	round: u64,
}

impl Simulation {
	/// Creates an empty network.
	pub fn new(config: TrustConfig, seed: u64) -> Result<Self, EigenError> {
		config.validate()?;
		Ok(Self {
			config,
			directory: Arc::new(Directory::new()),
			agents: Vec::new(),
			rng: StdRng::seed_from_u64(seed),
			round: 0,
		})
	}

	/// The configuration every agent is created with.
	pub fn config(&self) -> &TrustConfig {
		&self.config
	}

	/// The directory.
	pub fn directory(&self) -> &Arc<Directory> {
		&self.directory
	}

	/// All agents, in creation order.
	pub fn agents(&self) -> &[AgentHandle] {
		&self.agents
	}

	/// Rounds completed.
	pub fn round(&self) -> u64 {
		self.round
	}

	/// Creates and registers `count` agents.
	pub fn spawn(
		&mut self, count: usize, behaviour: Behaviour, no_prisoners: bool,
	) -> Vec<AgentHandle> {
		let handles: Vec<AgentHandle> = (0..count)
			.map(|_| {
				let identity = Identity::random(&mut self.rng);
				let seed = self.rng.gen();
				Agent::new(identity, &self.config)
					.with_malice(behaviour.strategy(seed))
					.with_no_prisoners(no_prisoners)
					.into_handle()
			})
			.collect();

		for handle in &handles {
			let identity = self.directory.register(Arc::clone(handle));
			debug!("Spawned {:?} agent {}", behaviour, identity);
		}
		self.agents.extend(handles.iter().cloned());
		handles
	}

	/// Replaces the reporting strategy of every agent in `group`.
	pub fn set_reporting<F>(&mut self, group: &[AgentHandle], mut make: F)
	where
		F: FnMut(&mut StdRng) -> Box<dyn ReportingStrategy>,
	{
		for handle in group {
			let reporting = make(&mut self.rng);
			lock(handle).set_reporting(reporting);
		}
	}

	/// Introduces every member of `group` to every other one.
	pub fn introduce(&self, group: &[AgentHandle]) {
		for (i, a) in group.iter().enumerate() {
			for b in &group[i + 1..] {
				protocol::introduce(a, b);
			}
		}
	}

	/// Introduces every member of `a` to every member of `b`.
	pub fn introduce_groups(&self, a: &[AgentHandle], b: &[AgentHandle]) {
		for x in a {
			for y in b {
				protocol::introduce(x, y);
			}
		}
	}

	/// Up to `count` distinct members of `group`, drawn at random.
	pub fn sample(&mut self, group: &[AgentHandle], count: usize) -> Vec<AgentHandle> {
		group.choose_multiple(&mut self.rng, count).cloned().collect()
	}

	/// Every agent of `group` pre-trusts the first `count` peers it knows.
	pub fn pre_trust(&self, group: &[AgentHandle], count: usize) -> Result<(), EigenError> {
		for handle in group {
			let mut agent = lock(handle);
			let chosen: Vec<Identity> = agent.peers().identities().into_iter().take(count).collect();
			for identity in chosen {
				agent.pre_trust(identity)?;
			}
		}
		Ok(())
	}

	/// Every agent of `group` pre-trusts `count` of its peers, drawn at random.
	pub fn pre_trust_random(
		&mut self, group: &[AgentHandle], count: usize,
	) -> Result<(), EigenError> {
		for handle in group {
			let mut agent = lock(handle);
			let known = agent.peers().identities();
			let chosen: Vec<Identity> =
				known.choose_multiple(&mut self.rng, count).copied().collect();
			for identity in chosen {
				agent.pre_trust(identity)?;
			}
		}
		Ok(())
	}

	/// Every agent of `group` pre-trusts the known peers matching `predicate`.
	pub fn pre_trust_where<P>(&self, group: &[AgentHandle], predicate: P) -> Result<(), EigenError>
	where
		P: Fn(&Identity) -> bool,
	{
		for handle in group {
			let mut agent = lock(handle);
			let chosen: Vec<Identity> =
				agent.peers().identities().into_iter().filter(|id| predicate(id)).collect();
			for identity in chosen {
				agent.pre_trust(identity)?;
			}
		}
		Ok(())
	}

	fn adversaries(&self) -> HashSet<Identity> {
		self.agents
			.iter()
			.filter_map(|handle| {
				let agent = lock(handle);
				agent.is_adversarial().then(|| agent.identity())
			})
			.collect()
	}

	/// Runs one round in which every agent may transact with its peers.
	pub fn run_round(&mut self, plan: &RoundPlan) -> Result<RoundStats, EigenError> {
		let initiators = self.agents.clone();
		self.run_round_for(&initiators, plan)
	}

	/// Runs one round in which only `initiators` may transact.
	pub fn run_round_for(
		&mut self, initiators: &[AgentHandle], plan: &RoundPlan,
	) -> Result<RoundStats, EigenError> {
		plan.validate()?;
		let adversaries = self.adversaries();
		let mut stats = RoundStats::default();
		let mut sybils = Vec::new();

		for handle in initiators {
			let (identity, peers) = {
				let agent = lock(handle);
				(agent.identity(), agent.peers().identities())
			};
			let honest = !adversaries.contains(&identity);

			for peer in peers {
				if !self.rng.gen_bool(plan.transact_probability) {
					continue;
				}
				let forced = match plan.honest_noise {
					Some(rate) if honest && !adversaries.contains(&peer) && self.rng.gen_bool(rate) => {
						debug!("{} has a bad transaction with honest {}", identity, peer);
						Some(TransactionRating::Negative)
					},
					_ => None,
				};

				let outcome = protocol::transact_with(&self.directory, handle, &peer, forced);
				stats.record(outcome);

				if plan.replace_sybils
					&& honest && forced.is_none()
					&& outcome == Outcome::Negative
					&& adversaries.contains(&peer)
				{
					sybils.push((Arc::clone(handle), peer));
				}
			}
		}

		for (victim, sybil) in sybils {
			self.replace_sybil(&victim, &sybil);
			stats.replaced += 1;
		}

		self.round += 1;
		debug!("Round {} done: {:?}", self.round, stats);
		Ok(stats)
	}

	/// The victim forgets the sybil, which leaves the network, and meets a
	/// fresh malicious identity instead.
	fn replace_sybil(&mut self, victim: &AgentHandle, sybil: &Identity) {
		lock(victim).forget(sybil);
		if let Some(gone) = self.directory.remove(sybil) {
			self.agents.retain(|handle| !Arc::ptr_eq(handle, &gone));
		}
		let fresh = self.spawn(1, Behaviour::Malicious, false);
		for handle in &fresh {
			protocol::introduce(victim, handle);
		}
	}

	/// Whether the round just completed is followed by a sensing pass.
	pub fn should_sense(&self, every: u64) -> bool {
		every > 0 && self.round > 2 && self.round % every == 0
	}

	/// Whether new agents join after the round just completed, spreading
	/// growth over `total_rounds` in five steps.
	pub fn growth_due(&self, total_rounds: u64) -> bool {
		let step = total_rounds / 5;
		let completed = self.round.saturating_sub(1);
		step > 0 && completed > 5 && completed % step == 0
	}

	/// Runs a trust pass on every agent, one after the other.
	pub fn sense(&self) -> Vec<TrustReport> {
		info!("Round {}: {} agents sensing", self.round, self.agents.len());
		self.agents.iter().map(|handle| protocol::calculate_trust(&self.directory, handle)).collect()
	}

	/// Runs a trust pass on every agent, each on a blocking task. Reports
	/// come back in agent order.
	pub async fn sense_concurrently(&self) -> Result<Vec<TrustReport>, EigenError> {
		info!("Round {}: {} agents sensing concurrently", self.round, self.agents.len());
		let mut tasks = JoinSet::new();
		for (index, handle) in self.agents.iter().enumerate() {
			let directory = Arc::clone(&self.directory);
			let handle = Arc::clone(handle);
			tasks.spawn_blocking(move || (index, protocol::calculate_trust(&directory, &handle)));
		}

		let mut reports = Vec::with_capacity(self.agents.len());
		while let Some(result) = tasks.join_next().await {
			reports.push(result.map_err(|e| EigenError::TaskError(e.to_string()))?);
		}
		reports.sort_by_key(|(index, _)| *index);
		Ok(reports.into_iter().map(|(_, report)| report).collect())
	}

	/// Runs `rounds` rounds with sensing every `sense_every` rounds.
	pub fn run(
		&mut self, rounds: u64, plan: &RoundPlan, sense_every: u64,
	) -> Result<Vec<RoundStats>, EigenError> {
		let mut stats = Vec::new();
		for _ in 0..rounds {
			stats.push(self.run_round(plan)?);
			if self.should_sense(sense_every) {
				self.sense();
			}
		}
		Ok(stats)
	}

	/// One row per agent, in creation order.
	pub fn summary(&self) -> Vec<AgentSummary> {
		let adversaries = self.adversaries();
		let mut held: HashMap<Identity, Vec<f64>> = HashMap::new();
		let mut condemned_by: HashMap<Identity, usize> = HashMap::new();

		for handle in &self.agents {
			let agent = lock(handle);
			let honest = !adversaries.contains(&agent.identity());
			for view in agent.peers().iter() {
				held.entry(view.identity()).or_default().push(view.trust());
				if honest && view.is_condemned() {
					*condemned_by.entry(view.identity()).or_default() += 1;
				}
			}
		}

		self.agents
			.iter()
			.map(|handle| {
				let agent = lock(handle);
				let identity = agent.identity();
				let trusts = held.get(&identity).map(Vec::as_slice).unwrap_or_default();
				let mean_trust = if trusts.is_empty() {
					0.0
				} else {
					trusts.iter().sum::<f64>() / trusts.len() as f64
				};
				let responses = agent.responses();
				AgentSummary {
					identity: identity.to_string(),
					adversarial: agent.is_adversarial(),
					known_peers: agent.peers().len(),
					condemned_peers: agent.peers().iter().filter(|v| v.is_condemned()).count(),
					primary: agent.trust_set().primary().len(),
					extended: agent.trust_set().extended().len(),
					condemned_by: condemned_by.get(&identity).copied().unwrap_or_default(),
					mean_trust,
					served_positive: responses.positive,
					served_negative: responses.negative,
				}
			})
			.collect()
	}

	/// Detection quality over the views of honest agents.
	pub fn detection(&self) -> Detection {
		let adversaries = self.adversaries();
		let mut detection = Detection::default();
		for handle in &self.agents {
			let agent = lock(handle);
			if adversaries.contains(&agent.identity()) {
				continue;
			}
			for view in agent.peers().iter() {
				if adversaries.contains(&view.identity()) {
					detection.adversary_views += 1;
					detection.adversaries_condemned += usize::from(view.is_condemned());
				} else {
					detection.honest_views += 1;
					detection.honest_condemned += usize::from(view.is_condemned());
				}
			}
		}
		detection
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn simulation() -> Simulation {
		Simulation::new(TrustConfig::default(), 42).unwrap()
	}

	#[test]
	fn test_invalid_config_is_rejected() {
		let config = TrustConfig { delta: 2.0, ..Default::default() };
		assert!(matches!(Simulation::new(config, 1), Err(EigenError::ConfigurationError(_))));
	}

	#[test]
	fn test_spawn_registers_agents() {
		let mut sim = simulation();
		let good = sim.spawn(3, Behaviour::Honest, false);
		let bad = sim.spawn(2, Behaviour::Malicious, false);
		assert_eq!(sim.agents().len(), 5);
		assert_eq!(sim.directory().len(), 5);
		assert!(!lock(&good[0]).is_adversarial());
		assert!(lock(&bad[1]).is_adversarial());
	}

	#[test]
	fn test_introduce_and_pre_trust() {
		let mut sim = simulation();
		let good = sim.spawn(4, Behaviour::Honest, false);
		let bad = sim.spawn(2, Behaviour::Malicious, false);
		sim.introduce(&good);
		sim.introduce_groups(&good, &bad);
		assert_eq!(lock(&good[0]).peers().len(), 5);
		assert_eq!(lock(&bad[0]).peers().len(), 4);

		sim.pre_trust(&good, 2).unwrap();
		for handle in &good {
			assert_eq!(lock(handle).trust_set().primary().len(), 2);
		}

		let bad_ids: HashSet<Identity> = bad.iter().map(|h| lock(h).identity()).collect();
		sim.pre_trust_where(&bad, |id| !bad_ids.contains(id)).unwrap();
		assert_eq!(lock(&bad[0]).trust_set().primary().len(), 4);
	}

	#[test]
	fn test_rounds_and_sensing_cadence() {
		let mut sim = simulation();
		let good = sim.spawn(3, Behaviour::Honest, false);
		sim.introduce(&good);

		let mut sensed = Vec::new();
		for _ in 0..15 {
			sim.run_round(&RoundPlan::default()).unwrap();
			if sim.should_sense(DEFAULT_SENSE_EVERY) {
				sensed.push(sim.round());
			}
		}
		assert_eq!(sensed, vec![5, 10, 15]);
		assert_eq!(sim.round(), 15);
	}

	#[test]
	fn test_growth_schedule() {
		let mut sim = simulation();
		let mut grown = Vec::new();
		for _ in 0..50 {
			sim.run_round(&RoundPlan::default()).unwrap();
			if sim.growth_due(50) {
				grown.push(sim.round() - 1);
			}
		}
		assert_eq!(grown, vec![10, 20, 30, 40]);
	}

	#[test]
	fn test_invalid_plan_is_rejected() {
		let mut sim = simulation();
		let plan = RoundPlan { transact_probability: 1.5, ..Default::default() };
		assert!(matches!(sim.run_round(&plan), Err(EigenError::ValidationError(_))));
	}

	#[test]
	fn test_honest_agents_condemn_malicious() {
		let mut sim = simulation();
		let good = sim.spawn(4, Behaviour::Honest, false);
		let bad = sim.spawn(4, Behaviour::Malicious, false);
		sim.introduce(&good);
		sim.introduce(&bad);
		sim.introduce_groups(&good, &bad);

		let plan = RoundPlan { transact_probability: 1.0, ..Default::default() };
		sim.run(10, &plan, DEFAULT_SENSE_EVERY).unwrap();

		let detection = sim.detection();
		assert_eq!(detection.adversary_views, 16);
		assert_eq!(detection.detection_rate(), 1.0);
		assert_eq!(detection.false_positive_rate(), 0.0);

		let summary = sim.summary();
		assert_eq!(summary.len(), 8);
		for row in summary.iter().filter(|row| row.adversarial) {
			assert_eq!(row.condemned_by, 4);
		}
	}

	#[test]
	fn test_sybils_are_replaced() {
		let mut sim = simulation();
		let good = sim.spawn(2, Behaviour::Honest, false);
		let bad = sim.spawn(2, Behaviour::Malicious, false);
		sim.introduce(&good);
		sim.introduce_groups(&good, &bad);

		let plan = RoundPlan { transact_probability: 1.0, replace_sybils: true, ..Default::default() };
		let stats = sim.run_round_for(&good, &plan).unwrap();
		assert_eq!(stats.negative, 4);
		assert_eq!(stats.replaced, 4);
		// both sybils left, one fresh identity per bad transaction
		assert_eq!(sim.agents().len(), 6);
		for handle in &bad {
			assert!(sim.directory().resolve(&lock(handle).identity()).is_none());
		}
		for handle in &good {
			assert_eq!(lock(handle).peers().len(), 3);
		}
	}

	#[tokio::test]
	async fn test_concurrent_sensing_matches_agents() {
		let mut sim = simulation();
		let good = sim.spawn(4, Behaviour::Honest, false);
		let bad = sim.spawn(2, Behaviour::Malicious, false);
		sim.introduce(&good);
		sim.introduce_groups(&good, &bad);
		sim.pre_trust(&good, 1).unwrap();

		let plan = RoundPlan { transact_probability: 1.0, ..Default::default() };
		for _ in 0..3 {
			sim.run_round(&plan).unwrap();
		}
		let reports = sim.sense_concurrently().await.unwrap();
		assert_eq!(reports.len(), 6);
		assert_eq!(sim.detection().detection_rate(), 1.0);
	}
}
