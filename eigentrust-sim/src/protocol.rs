//! # Protocol Module.
//!
//! Interactions between live agents resolved through the directory.
//!
//! An operation that touches two agents locks both in ascending identity
//! order. A trust pass never holds more than one agent lock at a time: it
//! first collects the public views of the informants, then locks the
//! observer for the pass itself.

use crate::{
	agent::{lock, Agent, AgentHandle},
	directory::Directory,
	error::EigenError,
	node::{Identity, PeerRecord},
	trust_set::{InformantReports, TrustReport},
};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	str::FromStr,
	sync::{Arc, MutexGuard},
};

/// Rating forced onto a transaction instead of asking the counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRating {
	/// Served honestly.
	Positive,
	/// Served maliciously.
	Negative,
}

impl FromStr for TransactionRating {
	type Err = EigenError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"positive" => Ok(TransactionRating::Positive),
			"negative" => Ok(TransactionRating::Negative),
			_ => Err(EigenError::ParsingError(format!("Invalid transaction rating: {}", s))),
		}
	}
}

/// Result of a transaction attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
	/// The counterpart served honestly.
	Positive,
	/// The counterpart served maliciously.
	Negative,
	/// Self, unknown, unresolvable or condemned counterpart.
	Unreachable,
}

impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Outcome::Positive => write!(f, "positive"),
			Outcome::Negative => write!(f, "negative"),
			Outcome::Unreachable => write!(f, "unreachable"),
		}
	}
}

/// Locks two distinct agents in ascending identity order.
fn lock_pair<'a>(
	first: &'a AgentHandle, second: &'a AgentHandle,
) -> (MutexGuard<'a, Agent>, MutexGuard<'a, Agent>) {
	let first_id = lock(first).identity();
	let second_id = lock(second).identity();
	if first_id <= second_id {
		let a = lock(first);
		let b = lock(second);
		(a, b)
	} else {
		let b = lock(second);
		let a = lock(first);
		(a, b)
	}
}

/// `initiator` transacts with the agent owning `peer`.
pub fn transact_with(
	directory: &Directory, initiator: &AgentHandle, peer: &Identity,
	forced: Option<TransactionRating>,
) -> Outcome {
	let Some(counterpart) = directory.resolve(peer) else {
		trace!("{} is not in the directory", peer);
		return Outcome::Unreachable;
	};
	if Arc::ptr_eq(initiator, &counterpart) {
		return Outcome::Unreachable;
	}

	let (mut initiator, mut counterpart) = lock_pair(initiator, &counterpart);
	initiator.transact_with(&mut counterpart, forced)
}

/// Makes two agents aware of each other.
pub fn introduce(a: &AgentHandle, b: &AgentHandle) -> bool {
	if Arc::ptr_eq(a, b) {
		return false;
	}
	let (mut a, mut b) = lock_pair(a, b);
	let (a_view, b_view) = (a.node().clone(), b.node().clone());
	let learned = a.learn(&b_view);
	let taught = b.learn(&a_view);
	learned || taught
}

/// The public view of the agent owning `identity`, if it is registered.
pub fn public_view(directory: &Directory, identity: &Identity) -> Option<Vec<PeerRecord>> {
	let handle = directory.resolve(identity)?;
	let view = lock(&handle).public_view();
	Some(view)
}

/// Gathers the reports of `agent`'s informants and runs its trust pass.
/// Informants missing from the directory are skipped.
pub fn calculate_trust(directory: &Directory, agent: &AgentHandle) -> TrustReport {
	let (identity, informants) = {
		let agent = lock(agent);
		(agent.identity(), agent.trust_set().informants())
	};

	let mut reports = InformantReports::new();
	for informant in informants {
		if informant == identity {
			continue;
		}
		match public_view(directory, &informant) {
			Some(view) => reports.insert(informant, view),
			None => debug!("Informant {} of {} is unreachable", informant, identity),
		}
	}

	lock(agent).calculate_trust(&reports)
}
