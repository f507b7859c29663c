//! # Config Module.
//!
//! Tunables of the trust engine. Every agent carries its own copy so that
//! networks with mixed settings can be simulated.

use crate::error::EigenError;
use serde::{Deserialize, Serialize};

/// Per-transaction trust increment.
pub const DEFAULT_EPSILON: f64 = 0.0001;
/// Trust every fresh peer view starts with.
pub const DEFAULT_TRUST: f64 = 0.5;
/// Transactions needed to move from the extended set into the primary set.
pub const DEFAULT_ALPHA: u64 = 500;
/// Transactions needed to graduate into the extended set.
pub const DEFAULT_BETA: u64 = 250;
/// Share of the known network that must sit in the primary set before its
/// consensus is consulted.
pub const DEFAULT_GAMMA: f64 = 0.04;
/// Tolerance below perfect altruism before a peer is condemned.
pub const DEFAULT_DELTA: f64 = 0.005;

/// Trust engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
	/// Per-transaction trust increment.
	pub epsilon: f64,
	/// Trust of a peer nobody has transacted with yet.
	pub baseline_trust: f64,
	/// Transactions required for extended to primary promotion.
	pub alpha: u64,
	/// Transactions required for graduation into the extended set.
	pub beta: u64,
	/// Minimum `|P| / |network|` ratio for consulting the primary set.
	pub gamma: f64,
	/// Tolerance below perfect altruism before condemnation.
	pub delta: f64,
	/// Informant experience multiplier used in small networks.
	pub small_network_multiplier: f64,
	/// Informant experience multiplier used in larger networks.
	pub large_network_multiplier: f64,
	/// Networks with fewer known peers than this count as small.
	pub small_network_size: usize,
	/// Share of the network a primary informant may deflate before eviction.
	pub deflation_sweep_ratio: f64,
	/// Multiple of `epsilon` removed by a negative transaction.
	pub negative_penalty: f64,
}

impl Default for TrustConfig {
	fn default() -> Self {
		Self {
			epsilon: DEFAULT_EPSILON,
			baseline_trust: DEFAULT_TRUST,
			alpha: DEFAULT_ALPHA,
			beta: DEFAULT_BETA,
			gamma: DEFAULT_GAMMA,
			delta: DEFAULT_DELTA,
			small_network_multiplier: 2.1,
			large_network_multiplier: 1.1,
			small_network_size: 40,
			deflation_sweep_ratio: 0.7,
			negative_penalty: 1.0,
		}
	}
}

impl TrustConfig {
	/// Checks that every threshold is in its admissible range.
	pub fn validate(&self) -> Result<(), EigenError> {
		if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
			return Err(EigenError::ConfigurationError(format!(
				"epsilon must be positive, got {}",
				self.epsilon
			)));
		}

		for (name, value) in [
			("baseline_trust", self.baseline_trust),
			("gamma", self.gamma),
			("delta", self.delta),
			("deflation_sweep_ratio", self.deflation_sweep_ratio),
		] {
			if !(0.0..=1.0).contains(&value) {
				return Err(EigenError::ConfigurationError(format!(
					"{} must be within [0, 1], got {}",
					name, value
				)));
			}
		}

		if self.small_network_multiplier < 1.0 || self.large_network_multiplier < 1.0 {
			return Err(EigenError::ConfigurationError(
				"informant multipliers must be at least 1".to_string(),
			));
		}

		if self.negative_penalty <= 0.0 {
			return Err(EigenError::ConfigurationError(format!(
				"negative_penalty must be positive, got {}",
				self.negative_penalty
			)));
		}

		if self.alpha < self.beta {
			return Err(EigenError::ConfigurationError(format!(
				"alpha ({}) must not be lower than beta ({})",
				self.alpha, self.beta
			)));
		}

		Ok(())
	}

	/// How much more experience an informant needs, scaled by network size.
	pub fn informant_multiplier(&self, network_size: usize) -> f64 {
		if network_size < self.small_network_size {
			self.small_network_multiplier
		} else {
			self.large_network_multiplier
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config_is_valid() {
		let config = TrustConfig::default();
		assert!(config.validate().is_ok());
		assert_eq!(config.alpha, 500);
		assert_eq!(config.beta, 250);
	}

	#[test]
	fn test_out_of_range_thresholds() {
		let config = TrustConfig { gamma: 1.5, ..Default::default() };
		assert!(matches!(config.validate(), Err(EigenError::ConfigurationError(_))));

		let config = TrustConfig { delta: -0.1, ..Default::default() };
		assert!(config.validate().is_err());

		let config = TrustConfig { epsilon: 0.0, ..Default::default() };
		assert!(config.validate().is_err());

		let config = TrustConfig { alpha: 100, beta: 250, ..Default::default() };
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_informant_multiplier() {
		let config = TrustConfig::default();
		assert_eq!(config.informant_multiplier(10), 2.1);
		assert_eq!(config.informant_multiplier(39), 2.1);
		assert_eq!(config.informant_multiplier(40), 1.1);
	}

	#[test]
	fn test_partial_json_uses_defaults() {
		let config: TrustConfig = serde_json::from_str(r#"{ "alpha": 800 }"#).unwrap();
		assert_eq!(config.alpha, 800);
		assert_eq!(config.beta, DEFAULT_BETA);
		assert_eq!(config.epsilon, DEFAULT_EPSILON);
	}
}
