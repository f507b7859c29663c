//! # Directory Module.
//!
//! Resolves an identity to the live agent owning it. Stands in for peer
//! discovery in a real deployment. Lookups may run concurrently; membership
//! changes only between rounds.

use crate::{
	agent::{lock, AgentHandle},
	node::Identity,
};
use log::warn;
use std::{
	collections::HashMap,
	sync::{PoisonError, RwLock},
};

/// Shared identity to agent lookup.
#[derive(Debug, Default)]
pub struct Directory {
	agents: RwLock<HashMap<Identity, AgentHandle>>,
}

impl Directory {
	/// Creates an empty directory.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an agent under its identity, replacing any previous owner.
	pub fn register(&self, handle: AgentHandle) -> Identity {
		let identity = lock(&handle).identity();
		let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
		if agents.insert(identity, handle).is_some() {
			warn!("Replaced directory entry for {}", identity);
		}
		identity
	}

	/// Unregisters an identity.
	pub fn remove(&self, identity: &Identity) -> Option<AgentHandle> {
		self.agents.write().unwrap_or_else(PoisonError::into_inner).remove(identity)
	}

	/// Resolves an identity.
	pub fn resolve(&self, identity: &Identity) -> Option<AgentHandle> {
		self.agents.read().unwrap_or_else(PoisonError::into_inner).get(identity).cloned()
	}

	/// Number of registered agents.
	pub fn len(&self) -> usize {
		self.agents.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	/// Whether nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Registered identities, sorted.
	pub fn identities(&self) -> Vec<Identity> {
		let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
		let mut identities: Vec<Identity> = agents.keys().copied().collect();
		identities.sort();
		identities
	}
}
