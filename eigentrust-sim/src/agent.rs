//! # Agent Module.
//!
//! A simulated network member. An agent owns its self view, the views it
//! holds about every peer it knows, the injected strategies deciding how it
//! serves and what it reports, and its trust set.

use crate::{
	config::TrustConfig,
	error::EigenError,
	node::{Identity, NodeView, PeerRecord, PeerSet, TransactionPolicy},
	protocol::{Outcome, TransactionRating},
	strategy::{AlwaysHonest, MaliceStrategy, ReportingStrategy, Truthful},
	scoring::{local_trust, normalized_trust},
	trust_set::{InformantReports, TrustReport, TrustSet},
};
use log::{debug, trace};
use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Shared, exclusively locked agent.
pub type AgentHandle = Arc<Mutex<Agent>>;

/// Locks an agent. A poisoned lock still guards consistent state, since no
/// agent operation panics half way through a mutation.
pub fn lock(handle: &AgentHandle) -> MutexGuard<'_, Agent> {
	handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How an agent answered the transactions it served.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Responses {
	/// Transactions served honestly.
	pub positive: u64,
	/// Transactions served maliciously.
	pub negative: u64,
}

/// A network member.
#[derive(Debug)]
pub struct Agent {
	node: NodeView,
	peers: PeerSet,
	malice: Box<dyn MaliceStrategy>,
	reporting: Box<dyn ReportingStrategy>,
	policy: TransactionPolicy,
	trust_set: TrustSet,
	responses: Responses,
}

impl Agent {
	/// Creates an honest, truthful agent.
	pub fn new(identity: Identity, config: &TrustConfig) -> Self {
		let policy =
			TransactionPolicy { no_prisoners: false, negative_penalty: config.negative_penalty };
		Self {
			node: NodeView::with_baseline(identity, config.baseline_trust, config.epsilon),
			peers: PeerSet::new(),
			malice: Box::new(AlwaysHonest),
			reporting: Box::new(Truthful),
			policy,
			trust_set: TrustSet::new(config.clone()),
			responses: Responses::default(),
		}
	}

	/// Sets the malice strategy.
	pub fn with_malice(mut self, malice: Box<dyn MaliceStrategy>) -> Self {
		self.malice = malice;
		self
	}

	/// Sets the reporting strategy.
	pub fn with_reporting(mut self, reporting: Box<dyn ReportingStrategy>) -> Self {
		self.reporting = reporting;
		self
	}

	/// Sets the no-prisoners policy.
	pub fn with_no_prisoners(mut self, no_prisoners: bool) -> Self {
		self.policy.no_prisoners = no_prisoners;
		self
	}

	/// Replaces the reporting strategy of a running agent.
	pub fn set_reporting(&mut self, reporting: Box<dyn ReportingStrategy>) {
		self.reporting = reporting;
	}

	/// Wraps the agent for sharing.
	pub fn into_handle(self) -> AgentHandle {
		Arc::new(Mutex::new(self))
	}

	/// Own identity.
	pub fn identity(&self) -> Identity {
		self.node.identity()
	}

	/// Own view, the baseline for altruism.
	pub fn node(&self) -> &NodeView {
		&self.node
	}

	/// Views of the known peers.
	pub fn peers(&self) -> &PeerSet {
		&self.peers
	}

	/// The trust set.
	pub fn trust_set(&self) -> &TrustSet {
		&self.trust_set
	}

	/// How this agent has served so far.
	pub fn responses(&self) -> Responses {
		self.responses
	}

	/// Whether the next transaction is served maliciously.
	pub fn malicious(&mut self) -> bool {
		let malicious = self.malice.malicious();
		if malicious {
			self.responses.negative += 1;
		} else {
			self.responses.positive += 1;
		}
		malicious
	}

	/// Whether the agent runs an adversarial strategy.
	pub fn is_adversarial(&self) -> bool {
		self.malice.is_adversarial()
	}

	/// Starts tracking a peer with a fresh view. Returns `false` for self
	/// and for peers already known.
	pub fn learn(&mut self, view: &NodeView) -> bool {
		if view.identity() == self.identity() {
			return false;
		}
		self.peers.insert(view.copy(self.trust_set.config().baseline_trust))
	}

	/// Forgets a peer and drops it from the trust set.
	pub fn forget(&mut self, identity: &Identity) -> Option<NodeView> {
		self.trust_set.remove(identity);
		self.peers.remove(identity)
	}

	/// Seeds a known peer into the primary set.
	pub fn pre_trust(&mut self, identity: Identity) -> Result<(), EigenError> {
		if identity == self.identity() || !self.peers.contains(&identity) {
			return Err(EigenError::PeerNotFound(format!(
				"{} cannot pre-trust unknown peer {}",
				self.node, identity
			)));
		}
		self.trust_set.insert_primary(identity);
		Ok(())
	}

	/// Records published about every known peer, in peer-set order.
	pub fn public_view(&mut self) -> Vec<PeerRecord> {
		let node = &self.node;
		let reporting = &mut self.reporting;
		self.peers.iter().map(|peer| reporting.report(node, peer)).collect()
	}

	/// One transaction with `counterpart`, who serves it.
	///
	/// Counterparts that are self, unknown or condemned are unreachable and
	/// nothing changes. Otherwise the outcome is applied to the local view
	/// and both agents learn the peers the other one knows.
	pub fn transact_with(
		&mut self, counterpart: &mut Agent, forced: Option<TransactionRating>,
	) -> Outcome {
		let identity = counterpart.identity();
		if identity == self.identity() {
			return Outcome::Unreachable;
		}
		match self.peers.get(&identity) {
			Some(view) if !view.is_condemned() => {},
			_ => return Outcome::Unreachable,
		}

		let positive = match forced {
			Some(rating) => rating == TransactionRating::Positive,
			None => !counterpart.malicious(),
		};
		if let Some(view) = self.peers.get_mut(&identity) {
			view.transact(positive, &self.policy);
			trace!("{} -> {}", self.node, view);
		}

		let learned = self.gossip_from(counterpart);
		let taught = counterpart.gossip_from(self);
		if learned + taught > 0 {
			debug!(
				"{} and {} exchanged {} and {} peers",
				self.node.identity().short(),
				identity.short(),
				learned,
				taught
			);
		}

		if positive {
			Outcome::Positive
		} else {
			Outcome::Negative
		}
	}

	fn gossip_from(&mut self, other: &Agent) -> usize {
		other.peers.iter().filter(|view| self.learn(view)).count()
	}

	/// Runs a trust pass against the informant reports gathered for it.
	pub fn calculate_trust(&mut self, reports: &InformantReports) -> TrustReport {
		self.trust_set.calculate_trust(&self.node, &mut self.peers, reports)
	}

	/// Normalised trust of every known peer. Falls back to the primary set
	/// while no peer has earned local trust.
	pub fn normalized_trust(&self) -> HashMap<Identity, f64> {
		let baseline = self.node.trust();
		let local: HashMap<Identity, f64> = self
			.peers
			.iter()
			.map(|view| (view.identity(), local_trust(view.trust(), baseline, view.epsilon())))
			.collect();
		normalized_trust(&local, self.trust_set.primary())
	}

	/// Known peers sorted by descending trust. Ties keep peer-set order.
	pub fn peers_by_trust(&self) -> Vec<NodeView> {
		let mut views: Vec<NodeView> = self.peers.iter().cloned().collect();
		views.sort_by(|a, b| b.trust().total_cmp(&a.trust()));
		views
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::strategy::{AlwaysMalicious, CollectiveInflation, InflationRule};
	use rand::{rngs::StdRng, SeedableRng};

	fn agents(count: usize, seed: u64) -> Vec<Agent> {
		let rng = &mut StdRng::seed_from_u64(seed);
		let config = TrustConfig::default();
		(0..count).map(|_| Agent::new(Identity::random(rng), &config)).collect()
	}

	fn introduce(a: &mut Agent, b: &mut Agent) {
		let (va, vb) = (a.node().clone(), b.node().clone());
		a.learn(&vb);
		b.learn(&va);
	}

	#[test]
	fn test_learn_skips_self_and_known() {
		let mut agents = agents(2, 1);
		let other = agents[1].node().clone();
		let own = agents[0].node().clone();
		assert!(!agents[0].learn(&own));
		assert!(agents[0].learn(&other));
		assert!(!agents[0].learn(&other));
		assert_eq!(agents[0].peers().len(), 1);
	}

	#[test]
	fn test_transact_positive_and_negative() {
		let mut agents = agents(2, 2);
		let (a, b) = agents.split_at_mut(1);
		let (a, b) = (&mut a[0], &mut b[0]);
		introduce(a, b);

		for _ in 0..10 {
			assert_eq!(a.transact_with(b, None), Outcome::Positive);
		}
		let view = a.peers().get(&b.identity()).unwrap();
		assert!((view.trust() - 0.501).abs() < 1e-12);
		assert_eq!(view.transactions(), 10);
		assert_eq!(b.responses().positive, 10);

		assert_eq!(a.transact_with(b, Some(TransactionRating::Negative)), Outcome::Negative);
		let view = a.peers().get(&b.identity()).unwrap();
		assert!((view.trust() - 0.5009).abs() < 1e-12);
		// forced ratings do not consult the counterpart
		assert_eq!(b.responses().positive, 10);
	}

	#[test]
	fn test_unreachable_leaves_state_untouched() {
		let mut agents = agents(3, 3);
		let mut c = agents.pop().unwrap();
		let mut b = agents.pop().unwrap();
		let mut a = agents.pop().unwrap();

		// unknown counterpart
		assert_eq!(a.transact_with(&mut b, None), Outcome::Unreachable);
		assert!(a.peers().is_empty());

		introduce(&mut a, &mut b);
		introduce(&mut b, &mut c);
		a.peers.get_mut(&b.identity()).unwrap().condemn();
		assert_eq!(a.transact_with(&mut b, None), Outcome::Unreachable);
		assert_eq!(a.peers().get(&b.identity()).unwrap().transactions(), 0);
		assert!(!a.peers().contains(&c.identity()));
		assert_eq!(b.responses(), Responses::default());
	}

	#[test]
	fn test_gossip_is_bidirectional() {
		let mut agents = agents(4, 4);
		let mut d = agents.pop().unwrap();
		let mut c = agents.pop().unwrap();
		let mut b = agents.pop().unwrap();
		let mut a = agents.pop().unwrap();
		introduce(&mut a, &mut b);
		introduce(&mut a, &mut c);
		introduce(&mut b, &mut d);

		a.transact_with(&mut b, None);
		assert!(a.peers().contains(&d.identity()));
		assert!(b.peers().contains(&c.identity()));
		assert!(!a.peers().contains(&a.identity()));
		assert!(!b.peers().contains(&b.identity()));

		// learned views start fresh
		let learned = a.peers().get(&d.identity()).unwrap();
		assert_eq!(learned.transactions(), 0);
		assert_eq!(learned.trust(), 0.5);
	}

	#[test]
	fn test_views_start_at_configured_baseline() {
		let rng = &mut StdRng::seed_from_u64(9);
		let config = TrustConfig { baseline_trust: 0.4, ..TrustConfig::default() };
		let mut a = Agent::new(Identity::random(rng), &config);
		let mut b = Agent::new(Identity::random(rng), &config);
		let mut c = Agent::new(Identity::random(rng), &config);
		assert_eq!(a.node().trust(), 0.4);

		introduce(&mut a, &mut b);
		introduce(&mut a, &mut c);
		introduce(&mut b, &mut c);
		assert_eq!(a.peers().get(&c.identity()).unwrap().trust(), 0.4);
		a.pre_trust(b.identity()).unwrap();

		for _ in 0..10 {
			b.transact_with(&mut c, None);
			a.transact_with(&mut c, None);
		}
		assert!((a.peers().get(&c.identity()).unwrap().trust() - 0.401).abs() < 1e-12);

		// An honest informant's report lies within the bounds of the same baseline.
		let mut reports = InformantReports::new();
		reports.insert(b.identity(), b.public_view());
		let report = a.calculate_trust(&reports);
		assert!(report.evicted.is_empty());
		assert!(report.condemned.is_empty());
		assert!(a.trust_set().primary().contains(&b.identity()));
	}

	#[test]
	fn test_normalized_trust_of_peers() {
		let mut agents = agents(4, 10);
		let mut others: Vec<Agent> = agents.drain(1..).collect();
		let mut a = agents.pop().unwrap();
		for other in &mut others {
			introduce(&mut a, other);
		}
		a.pre_trust(others[2].identity()).unwrap();

		// nothing earned yet, the primary set carries the weight
		let normalized = a.normalized_trust();
		assert_eq!(normalized[&others[2].identity()], 1.0);
		assert_eq!(normalized[&others[0].identity()], 0.0);

		for _ in 0..3 {
			a.transact_with(&mut others[0], Some(TransactionRating::Positive));
		}
		a.transact_with(&mut others[1], Some(TransactionRating::Positive));
		a.transact_with(&mut others[2], Some(TransactionRating::Negative));

		let normalized = a.normalized_trust();
		assert!((normalized[&others[0].identity()] - 0.75).abs() < 1e-9);
		assert!((normalized[&others[1].identity()] - 0.25).abs() < 1e-9);
		assert_eq!(normalized[&others[2].identity()], 0.0);
	}

	#[test]
	fn test_malicious_counterpart_and_no_prisoners() {
		let mut agents = agents(2, 5);
		let b = agents.pop().unwrap().with_malice(Box::new(AlwaysMalicious));
		let a = agents.pop().unwrap().with_no_prisoners(true);
		let (mut a, mut b) = (a, b);
		introduce(&mut a, &mut b);

		assert_eq!(a.transact_with(&mut b, None), Outcome::Negative);
		assert_eq!(a.peers().get(&b.identity()).unwrap().trust(), 0.0);
		assert_eq!(b.responses().negative, 1);
		assert_eq!(a.transact_with(&mut b, None), Outcome::Unreachable);
	}

	#[test]
	fn test_pre_trust_requires_known_peer() {
		let mut agents = agents(2, 6);
		let mut b = agents.pop().unwrap();
		let mut a = agents.pop().unwrap();
		assert!(matches!(a.pre_trust(b.identity()), Err(EigenError::PeerNotFound(_))));
		assert!(a.pre_trust(a.identity()).is_err());

		introduce(&mut a, &mut b);
		assert!(a.pre_trust(b.identity()).is_ok());
		assert!(a.trust_set().primary().contains(&b.identity()));

		a.forget(&b.identity());
		assert!(!a.trust_set().contains(&b.identity()));
		assert!(a.peers().is_empty());
	}

	#[test]
	fn test_public_view_uses_reporting_strategy() {
		let mut agents = agents(3, 7);
		let mut c = agents.pop().unwrap();
		let mut b = agents.pop().unwrap();
		let mut a = agents.pop().unwrap();
		introduce(&mut a, &mut b);
		introduce(&mut a, &mut c);
		for _ in 0..5 {
			a.transact_with(&mut b, None);
		}

		let truthful = a.public_view();
		assert_eq!(truthful.len(), 2);
		assert_eq!(truthful[0].identity, b.identity());
		assert_eq!(truthful[0].transactions, 5);
		assert_eq!(truthful[1].identity, c.identity());

		a.set_reporting(Box::new(CollectiveInflation::new([c.identity()], InflationRule::Additive)));
		let inflated = a.public_view();
		assert_eq!(inflated[0], truthful[0]);
		assert_eq!(inflated[1].trust, 0.5);
	}

	#[test]
	fn test_peers_by_trust_is_stable() {
		let mut agents = agents(4, 8);
		let mut others: Vec<Agent> = agents.drain(1..).collect();
		let mut a = agents.pop().unwrap();
		for other in &mut others {
			introduce(&mut a, other);
		}
		a.transact_with(&mut others[2], Some(TransactionRating::Positive));
		a.transact_with(&mut others[0], Some(TransactionRating::Negative));

		let order: Vec<Identity> = a.peers_by_trust().iter().map(NodeView::identity).collect();
		assert_eq!(order, vec![others[2].identity(), others[1].identity(), others[0].identity()]);
	}
}
