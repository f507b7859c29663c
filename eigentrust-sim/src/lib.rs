//! # Eigen Trust Sim
//!
//! A library for simulating decentralized trust computation between peers of
//! an overlay network.
//!
//! ## Main characteristics:
//!
//! **Self-policing** - every agent judges its peers from its own transaction
//! history and from the reports of a small set of peers it trusts, without a
//! central authority.
//!
//! **Pre-emptive** - honest agents starve malicious peers of service before
//! transacting with them, by following the consensus of their pre-trusted
//! peers.
//!
//! **Incorruptible** - informants that inflate, deflate or report impossible
//! values are evicted, and reputation is only obtained by consistent good
//! behavior through many transactions. Collectives, camouflage and sybil
//! identities are modelled as injected strategies.
//!
//! ## Implementation
//!
//! The trust engine follows the EigenTrust++ two-tier pre-trusted set: a
//! primary set whose consensus is consulted, and an extended set of
//! candidates under observation. Agents live in memory behind a shared
//! [`directory::Directory`] and may sense concurrently.

// Rustc
#![warn(trivial_casts)]
#![deny(
	absolute_paths_not_starting_with_crate, deprecated, future_incompatible, missing_docs,
	nonstandard_style, unreachable_code, unreachable_patterns
)]
#![forbid(unsafe_code)]
// Clippy
#![allow(clippy::tabs_in_doc_comments, clippy::new_without_default)]
#![deny(
	// Complexity
 	clippy::unnecessary_cast,
	clippy::needless_question_mark,
	clippy::clone_on_copy,
	// Pedantic
 	clippy::cast_lossless,
 	clippy::cast_possible_wrap,
	// Perf
	clippy::redundant_clone,
	// Restriction
 	clippy::panic,
	// Style
 	clippy::let_and_return,
 	clippy::needless_borrow
)]

pub mod agent;
pub mod config;
pub mod directory;
pub mod error;
pub mod node;
pub mod protocol;
pub mod scoring;
pub mod simulation;
pub mod storage;
pub mod strategy;
pub mod trust_set;

pub use agent::{Agent, AgentHandle};
pub use config::TrustConfig;
pub use directory::Directory;
pub use node::{Identity, NodeView, PeerRecord};
pub use protocol::{Outcome, TransactionRating};
pub use simulation::{RoundPlan, Simulation};
pub use trust_set::{TrustReport, TrustSet};
