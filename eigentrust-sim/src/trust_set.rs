//! # Trust Set Module.
//!
//! The two-tier pre-trusted set of an agent and the `calculate_trust` pass.
//!
//! The primary set ("P") holds peers whose opinion is weighted into
//! condemnation and graduation decisions. The extended set ("EP") holds
//! candidates under observation. A pass screens the informants of both sets,
//! judges every known peer locally and, when P covers enough of the network,
//! against the consensus of P, then moves peers between the sets.
//!
//! ```text
//! Unknown --graduation--> Extended --alpha reached--> Primary
//!    ^                       |                          |
//!    +-----altruism lost-----+--------------------------+
//! ```
//!
//! A peer whose trust is zero stays condemned and never graduates again.

use crate::{
	config::TrustConfig,
	node::{Identity, NodeView, PeerRecord, PeerSet},
	scoring::{altruism, credibility, is_perfect, robust_median, round_to, similarity},
};
use log::{debug, info, log_enabled, Level};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Experience, in multiples of the informant multiplier, a condemned peer
/// needs before an inflating report about it is held against the informant.
const INFLATION_EXPERIENCE: f64 = 5.0;
/// Reports at or below this altruism about an extended informant's peer
/// count as deflation.
const EXTENDED_DEFLATION_CUTOFF: f64 = 0.8;
/// Same, for primary informants.
const PRIMARY_DEFLATION_CUTOFF: f64 = 0.5;
/// Required informant surplus of transactions over the observer, relative
/// to the informant's own count.
const INFORMANT_SURPLUS: f64 = 0.01;
/// Local altruism above which only proven informants are consulted.
const PROVEN_INFORMANT_LOCAL: f64 = 0.99;
/// Local altruism a peer needs for a damning report to count as deflation.
const SWEEP_MIN_LOCAL: f64 = 0.95;
/// Transactions a peer needs for a damning report to count as deflation.
const SWEEP_MIN_TRANSACTIONS: u64 = 20;
/// Slack on the impossible-value bounds for accumulated rounding.
const BOUNDS_SLACK: f64 = 1e-9;

/// The two tiers of the trust set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Tier {
	/// The pre-trusted set "P".
	Primary,
	/// The candidate set "EP".
	Extended,
}

/// Why an informant left its tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EvictionReason {
	/// Vouched for a peer the observer condemned.
	Inflation,
	/// Reported a peer worse than the evidence allows.
	Deflation,
	/// Reported a trust no transaction history can produce.
	ImpossibleValue,
	/// Own altruism is no longer perfect.
	Altruism,
	/// Damned most of the network against the observer's experience.
	SystematicDeflation,
}

/// One eviction from the trust set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Eviction {
	/// The evicted member.
	pub identity: Identity,
	/// Tier it was evicted from.
	pub tier: Tier,
	/// Why.
	pub reason: EvictionReason,
}

/// What a `calculate_trust` pass changed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrustReport {
	/// Peers whose trust was zeroed.
	pub condemned: Vec<Identity>,
	/// Members evicted from either tier.
	pub evicted: Vec<Eviction>,
	/// Peers that entered the extended set.
	pub graduated: Vec<Identity>,
	/// Peers moved from the extended into the primary set.
	pub promoted: Vec<Identity>,
}

impl TrustReport {
	/// Whether the pass changed nothing.
	pub fn is_empty(&self) -> bool {
		self.condemned.is_empty()
			&& self.evicted.is_empty()
			&& self.graduated.is_empty()
			&& self.promoted.is_empty()
	}
}

/// Public views of the informants, fetched once per pass.
#[derive(Clone, Debug, Default)]
pub struct InformantReports {
	reports: HashMap<Identity, HashMap<Identity, PeerRecord>>,
}

impl InformantReports {
	/// Creates an empty collection.
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores the public view of an informant.
	pub fn insert(&mut self, informant: Identity, view: Vec<PeerRecord>) {
		let records = view.into_iter().map(|record| (record.identity, record)).collect();
		self.reports.insert(informant, records);
	}

	/// What `informant` reported about `peer`, if anything.
	pub fn get(&self, informant: &Identity, peer: &Identity) -> Option<&PeerRecord> {
		self.reports.get(informant).and_then(|records| records.get(peer))
	}

	/// Everything `informant` reported.
	pub fn records(&self, informant: &Identity) -> impl Iterator<Item = &PeerRecord> {
		self.reports.get(informant).into_iter().flat_map(|records| records.values())
	}

	/// Number of informants heard from.
	pub fn len(&self) -> usize {
		self.reports.len()
	}

	/// Whether no informant was heard from.
	pub fn is_empty(&self) -> bool {
		self.reports.is_empty()
	}
}

/// Values fixed for the duration of one pass.
struct Pass {
	baseline: f64,
	multiplier: f64,
	network_size: usize,
}

/// A peer that went through local judgement, kept for the deflation sweep.
struct Judged {
	identity: Identity,
	local: f64,
	transactions: u64,
}

/// The pre-trusted sets of one agent.
#[derive(Clone, Debug)]
pub struct TrustSet {
	primary: BTreeSet<Identity>,
	extended: BTreeSet<Identity>,
	config: TrustConfig,
}

impl TrustSet {
	/// Creates empty sets.
	pub fn new(config: TrustConfig) -> Self {
		Self { primary: BTreeSet::new(), extended: BTreeSet::new(), config }
	}

	/// The primary set.
	pub fn primary(&self) -> &BTreeSet<Identity> {
		&self.primary
	}

	/// The extended set.
	pub fn extended(&self) -> &BTreeSet<Identity> {
		&self.extended
	}

	/// The configuration the set was created with.
	pub fn config(&self) -> &TrustConfig {
		&self.config
	}

	/// Whether the peer is a member of either tier.
	pub fn contains(&self, identity: &Identity) -> bool {
		self.primary.contains(identity) || self.extended.contains(identity)
	}

	/// Members of both tiers, primary first.
	pub fn informants(&self) -> Vec<Identity> {
		self.primary.iter().chain(self.extended.iter()).copied().collect()
	}

	/// Seeds a pre-trusted peer, taking it out of the extended set.
	pub fn insert_primary(&mut self, identity: Identity) -> bool {
		self.extended.remove(&identity);
		self.primary.insert(identity)
	}

	/// Adds a candidate unless it already is in the primary set.
	pub fn insert_extended(&mut self, identity: Identity) -> bool {
		if self.primary.contains(&identity) {
			return false;
		}
		self.extended.insert(identity)
	}

	/// Drops the peer from both tiers.
	pub fn remove(&mut self, identity: &Identity) -> bool {
		let primary = self.primary.remove(identity);
		let extended = self.extended.remove(identity);
		primary || extended
	}

	fn members(&self, tier: Tier) -> &BTreeSet<Identity> {
		match tier {
			Tier::Primary => &self.primary,
			Tier::Extended => &self.extended,
		}
	}

	fn members_mut(&mut self, tier: Tier) -> &mut BTreeSet<Identity> {
		match tier {
			Tier::Primary => &mut self.primary,
			Tier::Extended => &mut self.extended,
		}
	}

	/// Runs one pass over every known peer of `own`.
	pub fn calculate_trust(
		&mut self, own: &NodeView, peers: &mut PeerSet, reports: &InformantReports,
	) -> TrustReport {
		let network_size = peers.len();
		let pass = Pass {
			baseline: own.trust(),
			multiplier: self.config.informant_multiplier(network_size),
			network_size,
		};
		let mut report = TrustReport::default();
		let mut judged = Vec::new();

		for identity in peers.identities() {
			if identity == own.identity() {
				continue;
			}
			let Some(peer) = peers.get(&identity).cloned() else {
				continue;
			};

			self.screen(Tier::Extended, &peer, peers, reports, &pass, &mut report);
			self.screen(Tier::Primary, &peer, peers, reports, &pass, &mut report);

			// Screening may have condemned the peer as an informant.
			let Some(peer) = peers.get(&identity).cloned() else {
				continue;
			};
			if peer.is_condemned() {
				continue;
			}

			let local = altruism(peer.trust(), peer.transactions(), pass.baseline, peer.epsilon());
			if local + self.config.delta < 1.0 {
				debug!("{} condemned on local experience ({:.4})", peer, local);
				Self::condemn(peers, identity, &mut report);
				continue;
			}
			judged.push(Judged { identity, local, transactions: peer.transactions() });

			let consensus = self.consensus(&peer, local, reports, &pass);
			if let Some(median) = consensus {
				if median + self.config.delta < 1.0 {
					debug!("{} condemned by consensus ({:.4})", peer, median);
					Self::condemn(peers, identity, &mut report);
					continue;
				}
			}

			self.graduate(&peer, consensus.unwrap_or(local), reports, &mut report);
		}

		self.settle(Tier::Extended, peers, &pass, &mut report);
		self.settle(Tier::Primary, peers, &pass, &mut report);
		self.sweep_deflators(&judged, reports, &pass, &mut report);

		if log_enabled!(Level::Debug) {
			for (informant, share) in self.credibility(own, peers, reports) {
				debug!("{} credibility of {}: {:.4}", own.identity().short(), informant, share);
			}
		}

		if !report.is_empty() {
			info!(
				"{} trust pass: {} condemned, {} evicted, {} graduated, {} promoted",
				own,
				report.condemned.len(),
				report.evicted.len(),
				report.graduated.len(),
				report.promoted.len()
			);
		}

		report
	}

	/// Credibility of every primary informant heard from, by how similar its
	/// feedback is to the observer's own.
	pub fn credibility(
		&self, own: &NodeView, peers: &PeerSet, reports: &InformantReports,
	) -> Vec<(Identity, f64)> {
		let observed: Vec<PeerRecord> = peers.iter().map(NodeView::public_view).collect();
		let informants: Vec<Identity> = self
			.primary
			.iter()
			.copied()
			.filter(|informant| reports.records(informant).next().is_some())
			.collect();
		let similarities: Vec<f64> = informants
			.iter()
			.map(|informant| {
				similarity(&observed, reports.records(informant), own.trust(), self.config.epsilon)
			})
			.collect();
		informants.into_iter().zip(credibility(&similarities)).collect()
	}

	fn condemn(peers: &mut PeerSet, identity: Identity, report: &mut TrustReport) {
		if let Some(view) = peers.get_mut(&identity) {
			view.condemn();
			report.condemned.push(identity);
		}
	}

	/// Evicts the informants of `tier` whose report about `peer` is inflated,
	/// deflated or impossible. Works on a snapshot of the tier.
	fn screen(
		&mut self, tier: Tier, peer: &NodeView, peers: &mut PeerSet, reports: &InformantReports,
		pass: &Pass, report: &mut TrustReport,
	) {
		let snapshot: Vec<Identity> = self.members(tier).iter().copied().collect();
		for informant in snapshot {
			if informant == peer.identity() {
				continue;
			}
			let Some(record) = reports.get(&informant, &peer.identity()) else {
				continue;
			};
			let Some(reason) = self.violation(tier, peer, record, pass) else {
				continue;
			};

			self.members_mut(tier).remove(&informant);
			debug!("{:?} informant {} evicted: {:?} about {}", tier, informant, reason, peer);
			if tier == Tier::Extended {
				if let Some(view) = peers.get_mut(&informant) {
					view.condemn();
					report.condemned.push(informant);
				}
			}
			report.evicted.push(Eviction { identity: informant, tier, reason });
		}
	}

	fn violation(
		&self, tier: Tier, peer: &NodeView, record: &PeerRecord, pass: &Pass,
	) -> Option<EvictionReason> {
		let reported = altruism(record.trust, record.transactions, pass.baseline, self.config.epsilon);
		let record_tx = record.transactions as f64;
		let peer_tx = peer.transactions() as f64;
		let experience = INFLATION_EXPERIENCE * pass.multiplier;

		if peer.is_condemned()
			&& peer_tx > experience
			&& record_tx >= peer_tx * pass.multiplier
			&& round_to(reported, 1) >= 1.0
		{
			return Some(EvictionReason::Inflation);
		}

		let deflated = match tier {
			Tier::Extended => reported <= EXTENDED_DEFLATION_CUTOFF,
			Tier::Primary => reported <= PRIMARY_DEFLATION_CUTOFF && record_tx >= experience,
		};
		if deflated && record.trust > 0.0 {
			return Some(EvictionReason::Deflation);
		}

		// Only negative transactions can move by more than epsilon.
		let earned = record_tx * self.config.epsilon;
		let low = pass.baseline - earned * self.config.negative_penalty.max(1.0) - BOUNDS_SLACK;
		let high = pass.baseline + earned + BOUNDS_SLACK;
		if record.trust != 0.0 && !(low..=high).contains(&record.trust) {
			return Some(EvictionReason::ImpossibleValue);
		}

		None
	}

	/// Robust median of the primary informants' altruism about `peer`, or
	/// `None` when the primary set should not be consulted.
	fn consensus(
		&self, peer: &NodeView, local: f64, reports: &InformantReports, pass: &Pass,
	) -> Option<f64> {
		if self.primary.is_empty() || pass.network_size == 0 {
			return None;
		}
		let coverage = self.primary.len() as f64 / pass.network_size as f64;
		if coverage < self.config.gamma {
			return None;
		}

		let mut informants: Vec<&PeerRecord> = self
			.primary
			.iter()
			.filter_map(|informant| reports.get(informant, &peer.identity()))
			.filter(|record| {
				record.transactions >= peer.transactions()
					&& (record.transactions - peer.transactions()) as f64
						>= INFORMANT_SURPLUS * record.transactions as f64
			})
			.collect();
		if local >= PROVEN_INFORMANT_LOCAL {
			informants.retain(|record| record.transactions > self.config.alpha);
		}

		let perfect = is_perfect(local);
		if informants.is_empty()
			|| (informants.len() == 1 && perfect)
			|| (peer.transactions() > 0 && perfect)
		{
			return None;
		}

		let scores: Vec<f64> = informants
			.iter()
			.map(|record| {
				altruism(record.trust, record.transactions, pass.baseline, self.config.epsilon)
			})
			.collect();
		Some(robust_median(&scores))
	}

	fn graduate(
		&mut self, peer: &NodeView, consensus: f64, reports: &InformantReports,
		report: &mut TrustReport,
	) {
		let identity = peer.identity();
		if peer.is_condemned() || self.contains(&identity) {
			return;
		}

		if self.primary.is_empty() {
			if peer.transactions() < self.config.beta {
				return;
			}
		} else {
			if round_to(consensus, 1) != 1.0 {
				return;
			}
			let votes = self
				.primary
				.iter()
				.filter_map(|informant| reports.get(informant, &identity))
				.filter(|record| record.transactions >= self.config.beta)
				.count();
			if (votes as f64) < self.primary.len() as f64 / 2.0 {
				return;
			}
		}

		debug!("{} graduated into the extended set", peer);
		self.extended.insert(identity);
		report.graduated.push(identity);
	}

	/// Evicts members of `tier` whose own altruism is no longer perfect and
	/// promotes experienced extended members.
	fn settle(&mut self, tier: Tier, peers: &PeerSet, pass: &Pass, report: &mut TrustReport) {
		let snapshot: Vec<Identity> = self.members(tier).iter().copied().collect();
		for identity in snapshot {
			let view = peers.get(&identity);
			let perfect = view.map_or(false, |view| {
				is_perfect(altruism(view.trust(), view.transactions(), pass.baseline, view.epsilon()))
			});

			if !perfect {
				self.members_mut(tier).remove(&identity);
				debug!("{:?} member {} evicted: altruism", tier, identity);
				report.evicted.push(Eviction { identity, tier, reason: EvictionReason::Altruism });
				continue;
			}

			let experienced = view.map_or(false, |view| view.transactions() >= self.config.alpha);
			if tier == Tier::Extended && experienced {
				self.extended.remove(&identity);
				self.primary.insert(identity);
				debug!("{} promoted into the primary set", identity);
				report.promoted.push(identity);
			}
		}
	}

	/// Evicts primary informants that damn most of the network the observer
	/// has good experience with.
	fn sweep_deflators(
		&mut self, judged: &[Judged], reports: &InformantReports, pass: &Pass,
		report: &mut TrustReport,
	) {
		let limit = self.config.deflation_sweep_ratio * pass.network_size as f64;
		let snapshot: Vec<Identity> = self.primary.iter().copied().collect();
		for informant in snapshot {
			let damned = judged
				.iter()
				.filter(|peer| {
					peer.identity != informant
						&& peer.local > SWEEP_MIN_LOCAL
						&& peer.transactions >= SWEEP_MIN_TRANSACTIONS
				})
				.filter_map(|peer| reports.get(&informant, &peer.identity))
				.filter(|record| {
					altruism(record.trust, record.transactions, pass.baseline, self.config.epsilon)
						<= 0.0
				})
				.count();

			if damned as f64 > limit {
				self.primary.remove(&informant);
				debug!("Primary informant {} evicted: damned {} peers", informant, damned);
				report.evicted.push(Eviction {
					identity: informant,
					tier: Tier::Primary,
					reason: EvictionReason::SystematicDeflation,
				});
			}
		}
	}
}
