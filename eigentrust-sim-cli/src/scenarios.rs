//! # Scenarios Module.
//!
//! Network setups that exercise the trust engine: four growth scenarios and
//! six threat models.
//!
//! Every scenario works best when honest agents have pre-trusted peers to
//! defer to. Rounds are followed by a sensing pass every `sense_every`
//! rounds, and growing scenarios add new agents in five steps over the run.

use eigentrust_sim::{
	agent::{lock, AgentHandle},
	error::EigenError,
	simulation::{RoundPlan, Simulation, DEFAULT_SENSE_EVERY},
	strategy::{Behaviour, CollectiveInflation, Deflationary, InflationRule},
	Identity, TrustConfig,
};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::HashSet, fmt::Display, str::FromStr};

/// Share of every 100 transactions a camouflaged agent serves badly.
const CAMOUFLAGE_FRACTION: f64 = 0.2;
/// Transactions between two infected files.
const VIRUS_PERIOD: u64 = 100;

/// Knobs shared by all scenarios.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioOptions {
	/// Requested network size. Scenarios enforce their own minimum.
	pub nodes: usize,
	/// Transaction rounds.
	pub rounds: u64,
	/// Peers every honest agent pre-trusts.
	pub pre_trusted: usize,
	/// Rounds between sensing passes.
	pub sense_every: u64,
	/// Run sensing passes on blocking tasks.
	pub concurrent: bool,
}

impl Default for ScenarioOptions {
	fn default() -> Self {
		Self {
			nodes: 10,
			rounds: 100,
			pre_trusted: 2,
			sense_every: DEFAULT_SENSE_EVERY,
			concurrent: false,
		}
	}
}

/// The available scenarios.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
	/// Half good, half bad.
	One,
	/// Half good, half bad, with growth and honest noise.
	Two,
	/// Deflating pre-trusted peers, with growth and honest noise.
	Three,
	/// No adversaries, growth and honest noise.
	Four,
	/// Independent adversaries.
	A,
	/// Chain of collectives.
	B,
	/// Collectives with camouflage.
	C,
	/// Collectives with accomplices.
	D,
	/// Sybil identities.
	E,
	/// Virus disseminators.
	F,
}

/// Agents a scenario keeps track of while it runs.
struct Cast {
	good: Vec<AgentHandle>,
	bad: Vec<AgentHandle>,
}

impl Scenario {
	/// Every scenario, in listing order.
	pub const ALL: [Scenario; 10] = [
		Scenario::One,
		Scenario::Two,
		Scenario::Three,
		Scenario::Four,
		Scenario::A,
		Scenario::B,
		Scenario::C,
		Scenario::D,
		Scenario::E,
		Scenario::F,
	];

	/// Name used on the command line.
	pub fn name(&self) -> &'static str {
		match self {
			Scenario::One => "one",
			Scenario::Two => "two",
			Scenario::Three => "three",
			Scenario::Four => "four",
			Scenario::A => "A",
			Scenario::B => "B",
			Scenario::C => "C",
			Scenario::D => "D",
			Scenario::E => "E",
			Scenario::F => "F",
		}
	}

	/// One-line description.
	pub fn description(&self) -> &'static str {
		match self {
			Scenario::One => "Half of the population are good peers, pre-trusting each other.",
			Scenario::Two => {
				"Like one, with new peers every fifth of the run and 1 in 251 bad transactions \
				 between good peers."
			},
			Scenario::Three => {
				"Mostly good peers whose pre-trusted peers are maximally deflationary, with growth."
			},
			Scenario::Four => "No malicious peers, growth from a small number of initial users.",
			Scenario::A => "Independently malicious peers unaware of each other.",
			Scenario::B => "A chain of malicious collectives vouching for each other.",
			Scenario::C => "Malicious collectives with camouflage, honest in 80% of the cases.",
			Scenario::D => "Collectives boosted by accomplices that only provide good service.",
			Scenario::E => "Sybil attack: a malicious identity is replaced once contacted.",
			Scenario::F => "Virus disseminators sending one infected file every 100th request.",
		}
	}

	/// Rounds actually run for a requested count.
	pub fn rounds(&self, requested: u64) -> u64 {
		match self {
			Scenario::C => requested.max(100),
			Scenario::F => requested.max(1000),
			_ => requested,
		}
	}

	fn grows(&self) -> bool {
		matches!(self, Scenario::Two | Scenario::Three | Scenario::Four)
	}

	/// Builds the network, runs it and returns it for inspection.
	pub async fn run(
		&self, config: TrustConfig, seed: u64, options: &ScenarioOptions,
	) -> Result<Simulation, EigenError> {
		let mut sim = Simulation::new(config, seed)?;
		let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
		let cast = self.build(&mut sim, options)?;
		let rounds = self.rounds(options.rounds);
		info!(
			"Scenario {}: {} agents, {} rounds of transactions with all peers",
			self.name(),
			sim.agents().len(),
			rounds
		);

		for _ in 0..rounds {
			self.step(&mut sim, &cast)?;

			if sim.should_sense(options.sense_every) {
				if options.concurrent {
					sim.sense_concurrently().await?;
				} else {
					sim.sense();
				}
			}

			if self.grows() && sim.growth_due(rounds) {
				self.grow(&mut sim, &cast, &mut rng);
			}
		}

		if *self == Scenario::C {
			for handle in &cast.bad {
				let agent = lock(handle);
				let responses = agent.responses();
				info!(
					"{} {} negative transactions, {} positive",
					agent.node(),
					responses.negative,
					responses.positive
				);
			}
		}

		Ok(sim)
	}

	fn build(&self, sim: &mut Simulation, options: &ScenarioOptions) -> Result<Cast, EigenError> {
		let n = options.nodes;
		let pre = options.pre_trusted;
		let divisor = if n == 1 { 1 } else { 2 };

		let cast = match self {
			Scenario::One | Scenario::Two => {
				let total = n.max(4);
				let good = sim.spawn(total / 2, Behaviour::Honest, false);
				let bad = sim.spawn(total - total / 2, Behaviour::Malicious, false);
				sim.introduce(&good);
				sim.pre_trust(&good, pre)?;
				sim.introduce(&bad);
				sim.introduce_groups(&good, &bad);
				Cast { good, bad }
			},
			Scenario::Three => {
				let good = sim.spawn(n.max(4), Behaviour::Honest, false);
				let deflators = sim.spawn(pre.max(1), Behaviour::Honest, false);
				sim.set_reporting(&deflators, |rng| Box::new(Deflationary::new(rng.gen())));
				let everyone: Vec<AgentHandle> = sim.agents().to_vec();
				sim.introduce(&everyone);
				let deflating = identities(&deflators);
				sim.pre_trust_where(&good, |id| deflating.contains(id))?;
				Cast { good, bad: deflators }
			},
			Scenario::Four => {
				let good = sim.spawn(n.max(4), Behaviour::Honest, false);
				sim.introduce(&good);
				sim.pre_trust(&good, pre)?;
				Cast { good, bad: Vec::new() }
			},
			Scenario::A => {
				let bad = sim.spawn(n.max(10), Behaviour::Malicious, false);
				let good = sim.spawn(1, Behaviour::Honest, false);
				sim.introduce_groups(&good, &bad);
				Cast { good, bad }
			},
			Scenario::B => {
				let bad = sim.spawn(n.max(7), Behaviour::Malicious, false);
				let good = sim.spawn(n.max(3), Behaviour::Honest, false);
				let collective = identities(&bad);
				sim.set_reporting(&bad, |_| {
					Box::new(CollectiveInflation::new(collective.iter().copied(), InflationRule::Chain))
				});
				sim.introduce(&bad);
				sim.introduce(&good);
				sim.pre_trust(&good, pre)?;
				let exposed = sim.sample(&bad, bad.len() / divisor);
				sim.introduce_groups(&good, &exposed);
				Cast { good, bad }
			},
			Scenario::C => {
				let bad = sim.spawn(n.max(10), Behaviour::Camouflaged(CAMOUFLAGE_FRACTION), false);
				let good = sim.spawn(n.max(5), Behaviour::Honest, false);
				sim.introduce(&good);
				sim.introduce(&bad);
				sim.pre_trust(&good, pre)?;
				let exposed = sim.sample(&bad, n);
				sim.introduce_groups(&good, &exposed);
				Cast { good, bad }
			},
			Scenario::D => {
				let bad = sim.spawn(n.max(10), Behaviour::Malicious, false);
				let accomplices = sim.spawn(n.max(10), Behaviour::Honest, false);
				let good = sim.spawn(n.max(20), Behaviour::Honest, false);
				let collective = identities(&bad);
				sim.set_reporting(&bad, |_| {
					Box::new(CollectiveInflation::new(collective.iter().copied(), InflationRule::Floored))
				});
				sim.set_reporting(&accomplices, |_| {
					Box::new(CollectiveInflation::new(
						collective.iter().copied(),
						InflationRule::Additive,
					))
				});
				let everyone: Vec<AgentHandle> = sim.agents().to_vec();
				sim.introduce(&everyone);
				sim.pre_trust_random(&good, pre)?;
				Cast { good, bad }
			},
			Scenario::E => {
				let bad = sim.spawn(n.max(100), Behaviour::Malicious, false);
				let good = sim.spawn(n.max(100), Behaviour::Honest, false);
				sim.introduce(&bad);
				sim.introduce(&good);
				sim.pre_trust(&good, pre)?;
				let total = sim.agents().len();
				let exposed = sim.sample(&bad, total / divisor);
				sim.introduce_groups(&good, &exposed);
				Cast { good, bad }
			},
			Scenario::F => {
				let bad = sim.spawn(n.max(10), Behaviour::Periodic(VIRUS_PERIOD), false);
				let good = sim.spawn(n.max(5), Behaviour::Honest, false);
				sim.introduce(&good);
				sim.introduce(&bad);
				sim.pre_trust(&good, pre)?;
				let exposed = sim.sample(&bad, n);
				sim.introduce_groups(&good, &exposed);
				Cast { good, bad }
			},
		};

		Ok(cast)
	}

	fn step(&self, sim: &mut Simulation, cast: &Cast) -> Result<(), EigenError> {
		match self {
			Scenario::Two | Scenario::Three | Scenario::Four => {
				sim.run_round(&RoundPlan::noisy())?;
			},
			Scenario::D => {
				sim.run_round_for(&cast.good, &RoundPlan::default())?;
				sim.run_round(&RoundPlan::default())?;
			},
			Scenario::E => {
				let hunt = RoundPlan { replace_sybils: true, ..Default::default() };
				sim.run_round_for(&cast.good, &hunt)?;
				sim.run_round(&RoundPlan::default())?;
			},
			_ => {
				sim.run_round(&RoundPlan::default())?;
			},
		}
		Ok(())
	}

	/// Adds one to three good and, except in scenario four, one to three
	/// bad agents, each introduced to a random sample of the network.
	fn grow(&self, sim: &mut Simulation, cast: &Cast, rng: &mut StdRng) {
		let mut newcomers = sim.spawn(rng.gen_range(1..=3), Behaviour::Honest, false);
		if *self != Scenario::Four {
			newcomers.extend(sim.spawn(rng.gen_range(1..=3), Behaviour::Malicious, false));
		}

		for newcomer in &newcomers {
			let pool: Vec<AgentHandle> = match self {
				Scenario::Three => cast.good.clone(),
				_ => sim.agents().to_vec(),
			};
			let size = match self {
				Scenario::Three => rng.gen_range(2..6),
				_ if pool.len() > 2 => rng.gen_range(2..pool.len()),
				_ => pool.len(),
			};
			let contacts = sim.sample(&pool, size);
			sim.introduce_groups(std::slice::from_ref(newcomer), &contacts);
			info!("Introduced {} into the system", lock(newcomer).node());
		}
	}
}

fn identities(group: &[AgentHandle]) -> HashSet<Identity> {
	group.iter().map(|handle| lock(handle).identity()).collect()
}

impl FromStr for Scenario {
	type Err = EigenError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Scenario::ALL
			.into_iter()
			.find(|scenario| scenario.name() == s)
			.ok_or_else(|| EigenError::ParsingError(format!("Unknown scenario: {}", s)))
	}
}

impl Display for Scenario {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}
