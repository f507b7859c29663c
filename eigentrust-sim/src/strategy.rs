//! # Strategy Module.
//!
//! Adversarial behaviour is injected into an agent through two seams:
//! - a `MaliceStrategy`, asked on every transaction whether the agent serves
//!   its counterpart badly,
//! - a `ReportingStrategy`, asked for every record the agent publishes about
//!   its peers.
//!
//! Both may keep state between calls.

use crate::node::{Identity, NodeView, PeerRecord};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt::Debug};

/// Decides, per transaction, whether an agent misbehaves.
pub trait MaliceStrategy: Debug + Send {
	/// Whether the next transaction is served maliciously.
	fn malicious(&mut self) -> bool;

	/// Whether the agent is adversarial at all.
	fn is_adversarial(&self) -> bool {
		true
	}
}

/// Never misbehaves.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysHonest;

impl MaliceStrategy for AlwaysHonest {
	fn malicious(&mut self) -> bool {
		false
	}

	fn is_adversarial(&self) -> bool {
		false
	}
}

/// Always misbehaves.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysMalicious;

impl MaliceStrategy for AlwaysMalicious {
	fn malicious(&mut self) -> bool {
		true
	}
}

/// Misbehaves on every n-th call, e.g. a peer that ships one infected file
/// every hundred requests.
#[derive(Clone, Copy, Debug)]
pub struct PeriodicMalicious {
	every_nth: u64,
	counter: u64,
}

impl PeriodicMalicious {
	/// Creates the strategy. `every_nth` of zero is treated as one.
	pub fn new(every_nth: u64) -> Self {
		Self { every_nth: every_nth.max(1), counter: 0 }
	}
}

impl MaliceStrategy for PeriodicMalicious {
	fn malicious(&mut self) -> bool {
		self.counter += 1;
		self.counter % self.every_nth == 0
	}
}

/// Misbehaves with probability `fraction`.
#[derive(Clone, Debug)]
pub struct ProbabilisticMalicious {
	fraction: f64,
	rng: StdRng,
}

impl ProbabilisticMalicious {
	/// Creates the strategy with its own seeded generator.
	pub fn new(fraction: f64, seed: u64) -> Self {
		Self { fraction: fraction.clamp(0.0, 1.0), rng: StdRng::seed_from_u64(seed) }
	}
}

impl MaliceStrategy for ProbabilisticMalicious {
	fn malicious(&mut self) -> bool {
		self.rng.gen_bool(self.fraction)
	}
}

/// Camouflaged collective member: misbehaves on the first `fraction` share
/// of every 100-call cycle and serves honestly for the rest.
#[derive(Clone, Copy, Debug)]
pub struct CamouflagedMalicious {
	fraction: f64,
	counter: u32,
}

impl CamouflagedMalicious {
	/// Cycle length.
	pub const CYCLE: u32 = 100;

	/// Creates the strategy.
	pub fn new(fraction: f64) -> Self {
		Self { fraction: fraction.clamp(0.0, 1.0), counter: 0 }
	}

	fn malicious_calls(&self) -> u32 {
		// fraction is clamped, the product fits in u32
		let calls = (f64::from(Self::CYCLE) * self.fraction).floor() as u32;
		calls.max(1)
	}
}

impl MaliceStrategy for CamouflagedMalicious {
	fn malicious(&mut self) -> bool {
		self.counter += 1;
		if self.counter >= Self::CYCLE {
			self.counter = 0;
		}
		self.counter <= self.malicious_calls()
	}
}

/// Serialisable description of a malice strategy, used by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Behaviour {
	/// `AlwaysHonest`.
	Honest,
	/// `AlwaysMalicious`.
	Malicious,
	/// `PeriodicMalicious`.
	Periodic(u64),
	/// `ProbabilisticMalicious`.
	Probabilistic(f64),
	/// `CamouflagedMalicious`.
	Camouflaged(f64),
}

impl Behaviour {
	/// Builds the strategy. `seed` feeds the probabilistic variant only.
	pub fn strategy(&self, seed: u64) -> Box<dyn MaliceStrategy> {
		match *self {
			Behaviour::Honest => Box::new(AlwaysHonest),
			Behaviour::Malicious => Box::new(AlwaysMalicious),
			Behaviour::Periodic(every_nth) => Box::new(PeriodicMalicious::new(every_nth)),
			Behaviour::Probabilistic(fraction) => {
				Box::new(ProbabilisticMalicious::new(fraction, seed))
			},
			Behaviour::Camouflaged(fraction) => Box::new(CamouflagedMalicious::new(fraction)),
		}
	}
}

/// Decides what an agent publishes about one of its peers.
pub trait ReportingStrategy: Debug + Send {
	/// Record published by `reporter` about `peer`.
	fn report(&mut self, reporter: &NodeView, peer: &NodeView) -> PeerRecord;
}

/// Publishes its beliefs unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Truthful;

impl ReportingStrategy for Truthful {
	fn report(&mut self, _reporter: &NodeView, peer: &NodeView) -> PeerRecord {
		peer.public_view()
	}
}

/// Reports every peer as maximally bad: either the lowest trust reachable
/// through honest negative transactions, or zero.
#[derive(Clone, Debug)]
pub struct Deflationary {
	rng: StdRng,
}

impl Deflationary {
	/// Creates the strategy with its own seeded generator.
	pub fn new(seed: u64) -> Self {
		Self { rng: StdRng::seed_from_u64(seed) }
	}
}

impl ReportingStrategy for Deflationary {
	fn report(&mut self, reporter: &NodeView, peer: &NodeView) -> PeerRecord {
		let mut record = peer.public_view();
		let low = reporter.trust() - record.transactions as f64 * reporter.epsilon();
		record.trust = if self.rng.gen_bool(0.5) { low } else { 0.0 };
		record
	}
}

/// The formulas collectives use to inflate each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InflationRule {
	/// `transactions * epsilon`, a chain of mutual high local trust.
	Chain,
	/// `baseline + transactions * epsilon`, perfect-looking history.
	Additive,
	/// `max(baseline + transactions * epsilon, baseline)`.
	Floored,
	/// Twice the real trust.
	Doubling,
}

impl InflationRule {
	/// Applies the rule.
	pub fn inflate(&self, reporter: &NodeView, peer: &NodeView) -> f64 {
		let earned = peer.transactions() as f64 * reporter.epsilon();
		match self {
			InflationRule::Chain => earned,
			InflationRule::Additive => reporter.trust() + earned,
			InflationRule::Floored => (reporter.trust() + earned).max(reporter.trust()),
			InflationRule::Doubling => peer.trust() * 2.0,
		}
	}
}

/// Inflates the trust of collective members, reports everyone else truthfully.
#[derive(Clone, Debug)]
pub struct CollectiveInflation {
	collective: HashSet<Identity>,
	rule: InflationRule,
}

impl CollectiveInflation {
	/// Creates the strategy.
	pub fn new(collective: impl IntoIterator<Item = Identity>, rule: InflationRule) -> Self {
		Self { collective: collective.into_iter().collect(), rule }
	}
}

impl ReportingStrategy for CollectiveInflation {
	fn report(&mut self, reporter: &NodeView, peer: &NodeView) -> PeerRecord {
		let mut record = peer.public_view();
		if self.collective.contains(&peer.identity()) {
			record.trust = self.rule.inflate(reporter, peer);
		}
		record
	}
}
