//! # Node Module.
//!
//! This module contains the local belief an agent holds about a remote peer
//! (`NodeView`), the record it publishes about it (`PeerRecord`) and the
//! insertion-ordered collection of views every agent keeps (`PeerSet`).

use crate::config::{DEFAULT_EPSILON, DEFAULT_TRUST};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
	collections::HashMap,
	fmt::{Display, Formatter, Result as FmtResult},
	net::Ipv4Addr,
};

/// Length of a node id in bytes.
pub const NODE_ID_LEN: usize = 20;

/// Opaque node id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl NodeId {
	/// Draws a random id.
	pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
		let mut bytes = [0u8; NODE_ID_LEN];
		rng.fill(&mut bytes[..]);
		Self(bytes)
	}
}

impl Display for NodeId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

/// Identity of a peer: the `(id, ip, port)` triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
	/// Node id.
	pub id: NodeId,
	/// Address the peer listens on.
	pub ip: Ipv4Addr,
	/// Port the peer listens on.
	pub port: u16,
}

impl Identity {
	/// Creates a new identity.
	pub fn new(id: NodeId, ip: Ipv4Addr, port: u16) -> Self {
		Self { id, ip, port }
	}

	/// Draws a random localhost identity.
	pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
		Self::new(NodeId::random(rng), Ipv4Addr::LOCALHOST, rng.gen())
	}

	/// Short form used in log lines.
	pub fn short(&self) -> String {
		format!("{}:{}", self.ip, self.port)
	}
}

impl Display for Identity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "<{} {}:{}>", self.id, self.ip, self.port)
	}
}

/// How negative transactions are penalised.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransactionPolicy {
	/// One negative transaction zeroes the peer's trust.
	pub no_prisoners: bool,
	/// Multiple of epsilon removed per negative transaction otherwise.
	pub negative_penalty: f64,
}

impl Default for TransactionPolicy {
	fn default() -> Self {
		Self { no_prisoners: false, negative_penalty: 1.0 }
	}
}

/// The externally visible record about one peer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
	/// Who the record is about.
	pub identity: Identity,
	/// Reported trust.
	pub trust: f64,
	/// Reported number of transactions.
	pub transactions: u64,
}

/// A local, possibly stale belief about one remote peer.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeView {
	identity: Identity,
	trust: f64,
	transactions: u64,
	epsilon: f64,
}

impl NodeView {
	/// Creates a fresh view with default trust and epsilon.
	pub fn new(identity: Identity) -> Self {
		Self::with_epsilon(identity, DEFAULT_EPSILON)
	}

	/// Creates a fresh view with a custom epsilon.
	pub fn with_epsilon(identity: Identity, epsilon: f64) -> Self {
		Self::with_baseline(identity, DEFAULT_TRUST, epsilon)
	}

	/// Creates a fresh view starting at `baseline` trust.
	pub fn with_baseline(identity: Identity, baseline: f64, epsilon: f64) -> Self {
		Self { identity, trust: baseline, transactions: 0, epsilon }
	}

	/// Returns the identity of the peer.
	pub fn identity(&self) -> Identity {
		self.identity
	}

	/// Returns the current trust.
	pub fn trust(&self) -> f64 {
		self.trust
	}

	/// Returns the number of transactions observed.
	pub fn transactions(&self) -> u64 {
		self.transactions
	}

	/// Returns the per-transaction increment.
	pub fn epsilon(&self) -> f64 {
		self.epsilon
	}

	/// Whether the peer has been condemned (or drove its trust to zero).
	pub fn is_condemned(&self) -> bool {
		self.trust <= 0.0
	}

	/// Records the outcome of one transaction.
	pub fn transact(&mut self, positive: bool, policy: &TransactionPolicy) {
		if positive {
			self.trust += self.epsilon;
		} else if policy.no_prisoners {
			self.trust = 0.0;
		} else {
			self.trust -= self.epsilon * policy.negative_penalty;
		}
		self.transactions += 1;
	}

	/// Zeroes the trust.
	pub fn condemn(&mut self) {
		self.trust = 0.0;
	}

	/// A fresh observation channel for the same peer, starting at the
	/// receiver's `baseline`. History is not carried over.
	pub fn copy(&self, baseline: f64) -> Self {
		Self::with_baseline(self.identity, baseline, self.epsilon)
	}

	/// The record published across the agent boundary.
	pub fn public_view(&self) -> PeerRecord {
		PeerRecord { identity: self.identity, trust: self.trust, transactions: self.transactions }
	}

	#[cfg(test)]
	pub(crate) fn with_history(identity: Identity, trust: f64, transactions: u64) -> Self {
		Self { identity, trust, transactions, epsilon: DEFAULT_EPSILON }
	}
}

impl Display for NodeView {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "<Node {} {:.4}T/{}>", self.identity.short(), self.trust, self.transactions)
	}
}

/// Insertion-ordered set of views, unique by identity.
#[derive(Clone, Debug, Default)]
pub struct PeerSet {
	views: Vec<NodeView>,
	index: HashMap<Identity, usize>,
}

impl PeerSet {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of known peers.
	pub fn len(&self) -> usize {
		self.views.len()
	}

	/// Whether no peer is known.
	pub fn is_empty(&self) -> bool {
		self.views.is_empty()
	}

	/// Whether a peer is known.
	pub fn contains(&self, identity: &Identity) -> bool {
		self.index.contains_key(identity)
	}

	/// Returns the view of a peer.
	pub fn get(&self, identity: &Identity) -> Option<&NodeView> {
		self.index.get(identity).map(|&i| &self.views[i])
	}

	/// Returns the view of a peer, mutably.
	pub fn get_mut(&mut self, identity: &Identity) -> Option<&mut NodeView> {
		self.index.get(identity).map(|&i| &mut self.views[i])
	}

	/// Adds a view. Returns `false` if the peer was already known.
	pub fn insert(&mut self, view: NodeView) -> bool {
		if self.contains(&view.identity) {
			return false;
		}
		self.index.insert(view.identity, self.views.len());
		self.views.push(view);
		true
	}

	/// Forgets a peer, keeping the order of the rest.
	pub fn remove(&mut self, identity: &Identity) -> Option<NodeView> {
		let position = self.index.remove(identity)?;
		let view = self.views.remove(position);
		for i in self.index.values_mut() {
			if *i > position {
				*i -= 1;
			}
		}
		Some(view)
	}

	/// Iterates in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = &NodeView> {
		self.views.iter()
	}

	/// Identities in insertion order.
	pub fn identities(&self) -> Vec<Identity> {
		self.views.iter().map(NodeView::identity).collect()
	}
}
