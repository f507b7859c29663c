//! # Scoring Module.
//!
//! Scoring primitives shared by the trust set: altruism of a record relative
//! to an observer's baseline and the damped median used for consensus.
//!
//! The EigenTrust++ weights live here too:
//! - `S`, local trust: net satisfied transactions, floored at zero,
//! - `C`, normalised trust: `S` over the sum of `S`, falling back to the
//!   pre-trusted peers when nobody earned any,
//! - `sim`, feedback similarity of two agents over the peers both rated,
//! - `f`, credibility: similarity as a share of all informants' similarity.

use crate::node::{Identity, PeerRecord};
use std::collections::{BTreeSet, HashMap};

/// Distance from 1.0 still treated as perfect altruism.
/// Accumulating `epsilon` in floating point drifts by far less than this.
pub const ALTRUISM_TOLERANCE: f64 = 1e-6;

/// How consistent `trust` is with honest behaviour over `transactions`.
///
/// 1.0 means every transaction was positive, -1.0 means every one was
/// negative. A record with no transactions is benign only if its trust never
/// moved away from the baseline.
pub fn altruism(trust: f64, transactions: u64, baseline: f64, epsilon: f64) -> f64 {
	let divisor = transactions as f64 * epsilon;
	let deviation = trust - baseline;
	if divisor == 0.0 {
		if deviation.abs() < f64::EPSILON {
			return 1.0;
		}
		return 0.0;
	}
	deviation / divisor
}

/// Whether a score counts as exactly 1.0.
pub fn is_perfect(value: f64) -> bool {
	(value - 1.0).abs() < ALTRUISM_TOLERANCE
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
	let factor = 10f64.powi(places);
	(value * factor).round() / factor
}

/// Mean of the arithmetic mean and the median of the values in `[0, 1]`,
/// clamped to `[0, 1]`. Returns 0.0 when nothing survives the filter.
///
/// Values within `ALTRUISM_TOLERANCE` outside the range are drift, not
/// outliers, and are clamped in.
pub fn robust_median(values: &[f64]) -> f64 {
	let range = -ALTRUISM_TOLERANCE..=1.0 + ALTRUISM_TOLERANCE;
	let mut survivors: Vec<f64> = values
		.iter()
		.copied()
		.filter(|v| v.is_finite() && range.contains(v))
		.map(|v| v.clamp(0.0, 1.0))
		.collect();
	if survivors.is_empty() {
		return 0.0;
	}

	survivors.sort_by(f64::total_cmp);
	let mean = survivors.iter().sum::<f64>() / survivors.len() as f64;
	let median = median_of_sorted(&survivors);

	((mean + median) / 2.0).clamp(0.0, 1.0)
}

/// Local trust `S`: net satisfied transactions implied by `trust`, never
/// below zero.
pub fn local_trust(trust: f64, baseline: f64, epsilon: f64) -> f64 {
	if epsilon <= 0.0 {
		return 0.0;
	}
	((trust - baseline) / epsilon).max(0.0)
}

/// Normalised trust `C` for every peer in `local`.
///
/// When no peer earned any local trust, the weight is spread evenly over the
/// members of `primary` found in `local`.
pub fn normalized_trust(
	local: &HashMap<Identity, f64>, primary: &BTreeSet<Identity>,
) -> HashMap<Identity, f64> {
	let total: f64 = local.values().map(|value| value.max(0.0)).sum();
	if total > 0.0 {
		return local.iter().map(|(id, value)| (*id, value.max(0.0) / total)).collect();
	}

	let pre_trusted = local.keys().filter(|id| primary.contains(id)).count();
	local
		.keys()
		.map(|id| {
			let share = if primary.contains(id) { 1.0 / pre_trusted as f64 } else { 0.0 };
			(*id, share)
		})
		.collect()
}

/// Feedback `tr` carried by a record: the share of positive transactions its
/// trust implies. `None` for a record without transactions.
pub fn feedback(record: &PeerRecord, baseline: f64, epsilon: f64) -> Option<f64> {
	if record.transactions == 0 {
		return None;
	}
	let score = altruism(record.trust, record.transactions, baseline, epsilon);
	Some(((score + 1.0) / 2.0).clamp(0.0, 1.0))
}

/// Feedback similarity `sim`: one minus the root mean square difference of
/// the feedback `u` and `v` give the peers both have transacted with.
/// 0.0 when there is no such peer.
pub fn similarity<'a>(
	u: impl IntoIterator<Item = &'a PeerRecord>, v: impl IntoIterator<Item = &'a PeerRecord>,
	baseline: f64, epsilon: f64,
) -> f64 {
	let other: HashMap<Identity, f64> = v
		.into_iter()
		.filter_map(|record| Some((record.identity, feedback(record, baseline, epsilon)?)))
		.collect();
	let squares: Vec<f64> = u
		.into_iter()
		.filter_map(|record| {
			let mine = feedback(record, baseline, epsilon)?;
			other.get(&record.identity).map(|theirs| (mine - theirs).powi(2))
		})
		.collect();
	if squares.is_empty() {
		return 0.0;
	}

	let mean = squares.iter().sum::<f64>() / squares.len() as f64;
	1.0 - mean.sqrt()
}

/// Credibility `f` of each informant given its similarity to the observer.
pub fn credibility(similarities: &[f64]) -> Vec<f64> {
	let total: f64 = similarities.iter().map(|value| value.max(0.0)).sum();
	if total <= 0.0 {
		return vec![0.0; similarities.len()];
	}
	similarities.iter().map(|value| value.max(0.0) / total).collect()
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
	let mid = sorted.len() / 2;
	if sorted.len() % 2 == 0 {
		(sorted[mid - 1] + sorted[mid]) / 2.0
	} else {
		sorted[mid]
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::{rngs::StdRng, SeedableRng};

	const EPSILON: f64 = 0.0001;
	const BASELINE: f64 = 0.5;

	fn identities(count: usize) -> Vec<Identity> {
		let rng = &mut StdRng::seed_from_u64(42);
		(0..count).map(|_| Identity::random(rng)).collect()
	}

	fn record(identity: Identity, trust: f64, transactions: u64) -> PeerRecord {
		PeerRecord { identity, trust, transactions }
	}

	#[test]
	fn test_altruism_scales_with_k() {
		for k in [-1.0, -0.5, 0.0, 0.25, 1.0, 2.0] {
			for transactions in [1u64, 10, 333, 5000] {
				let trust = BASELINE + transactions as f64 * EPSILON * k;
				let score = altruism(trust, transactions, BASELINE, EPSILON);
				assert!((score - k).abs() < 1e-9, "k={} tx={} got {}", k, transactions, score);
			}
		}
	}

	#[test]
	fn test_altruism_without_transactions() {
		assert_eq!(altruism(BASELINE, 0, BASELINE, EPSILON), 1.0);
		assert_eq!(altruism(0.7, 0, BASELINE, EPSILON), 0.0);
		assert_eq!(altruism(0.0, 0, BASELINE, EPSILON), 0.0);
	}

	#[test]
	fn test_is_perfect() {
		let mut trust = BASELINE;
		for _ in 0..2000 {
			trust += EPSILON;
		}
		assert!(is_perfect(altruism(trust, 2000, BASELINE, EPSILON)));
		assert!(!is_perfect(altruism(trust - 2.0 * EPSILON, 2000, BASELINE, EPSILON)));
	}

	#[test]
	fn test_round_to() {
		assert_eq!(round_to(0.96, 1), 1.0);
		assert_eq!(round_to(0.94, 1), 0.9);
		assert_eq!(round_to(1.04, 1), 1.0);
	}

	#[test]
	fn test_robust_median_filters() {
		assert_eq!(robust_median(&[]), 0.0);
		assert_eq!(robust_median(&[-1.0, 2.0, f64::NAN, f64::INFINITY]), 0.0);
		assert_eq!(robust_median(&[1.0, 1.0, 1.0]), 1.0);
	}

	#[test]
	fn test_robust_median_damps_outliers() {
		// mean 0.7, median 1.0
		let value = robust_median(&[1.0, 1.0, 0.1]);
		assert!((value - 0.85).abs() < 1e-12);

		// mean 0.5, median 0.5 (even count)
		let value = robust_median(&[0.0, 0.4, 0.6, 1.0]);
		assert!((value - 0.5).abs() < 1e-12);

		// out-of-range entries do not count
		let value = robust_median(&[1.0, 1.0, -3.0, 7.0]);
		assert_eq!(value, 1.0);

		let drifted = altruism(0.5 + 100.0 * EPSILON, 100, BASELINE, EPSILON);
		assert_eq!(robust_median(&[drifted]), 1.0);
	}

	#[test]
	fn test_local_trust() {
		assert!((local_trust(0.501, BASELINE, EPSILON) - 10.0).abs() < 1e-9);
		assert_eq!(local_trust(0.4995, BASELINE, EPSILON), 0.0);
		assert_eq!(local_trust(0.0, BASELINE, EPSILON), 0.0);
		assert_eq!(local_trust(0.6, BASELINE, 0.0), 0.0);
	}

	#[test]
	fn test_normalized_trust() {
		let ids = identities(3);
		let local: HashMap<Identity, f64> = [(ids[0], 30.0), (ids[1], 10.0), (ids[2], 0.0)].into();
		let primary: BTreeSet<Identity> = [ids[2]].into();
		let normalized = normalized_trust(&local, &primary);
		assert!((normalized[&ids[0]] - 0.75).abs() < 1e-12);
		assert!((normalized[&ids[1]] - 0.25).abs() < 1e-12);
		assert_eq!(normalized[&ids[2]], 0.0);
	}

	#[test]
	fn test_normalized_trust_falls_back_to_primary() {
		let ids = identities(3);
		let local: HashMap<Identity, f64> = ids.iter().map(|id| (*id, 0.0)).collect();
		let primary: BTreeSet<Identity> = [ids[0], ids[2]].into();
		let normalized = normalized_trust(&local, &primary);
		assert_eq!(normalized[&ids[0]], 0.5);
		assert_eq!(normalized[&ids[1]], 0.0);
		assert_eq!(normalized[&ids[2]], 0.5);

		let normalized = normalized_trust(&local, &BTreeSet::new());
		assert!(normalized.values().all(|value| *value == 0.0));
	}

	#[test]
	fn test_feedback() {
		let id = identities(1)[0];
		assert!((feedback(&record(id, 0.501, 10), BASELINE, EPSILON).unwrap() - 1.0).abs() < 1e-9);
		assert!(feedback(&record(id, 0.4995, 5), BASELINE, EPSILON).unwrap().abs() < 1e-9);
		assert_eq!(feedback(&record(id, BASELINE, 10), BASELINE, EPSILON), Some(0.5));
		assert_eq!(feedback(&record(id, 0.0, 100), BASELINE, EPSILON), Some(0.0));
		assert_eq!(feedback(&record(id, 0.7, 0), BASELINE, EPSILON), None);
	}

	#[test]
	fn test_similarity() {
		let ids = identities(3);
		let good = |id| record(id, 0.501, 10);
		let bad = |id| record(id, 0.499, 10);

		let u = vec![good(ids[0]), bad(ids[1])];
		assert_eq!(similarity(&u, &u, BASELINE, EPSILON), 1.0);

		let opposite = vec![bad(ids[0]), good(ids[1])];
		assert!(similarity(&u, &opposite, BASELINE, EPSILON).abs() < 1e-9);

		// one of two common peers rated the other way
		let split = vec![good(ids[0]), good(ids[1]), good(ids[2])];
		let expected = 1.0 - 0.5f64.sqrt();
		assert!((similarity(&u, &split, BASELINE, EPSILON) - expected).abs() < 1e-9);

		// no common peer with transactions
		let strangers = vec![good(ids[2]), record(ids[0], BASELINE, 0)];
		assert_eq!(similarity(&u, &strangers, BASELINE, EPSILON), 0.0);
	}

	#[test]
	fn test_credibility() {
		let shares = credibility(&[0.5, 1.5, 0.0]);
		assert_eq!(shares, vec![0.25, 0.75, 0.0]);
		assert_eq!(credibility(&[-0.5, 1.0]), vec![0.0, 1.0]);
		assert_eq!(credibility(&[0.0, 0.0]), vec![0.0, 0.0]);
		assert!(credibility(&[]).is_empty());
	}
}
