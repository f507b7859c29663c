// Unwrap is allowed while testing
#![allow(clippy::unwrap_used)]

use eigentrust_sim::{
	agent::lock,
	protocol::{self, Outcome},
	simulation::{RoundPlan, Simulation},
	strategy::{Behaviour, Deflationary},
	trust_set::EvictionReason,
	Identity, TrustConfig,
};
use rand::Rng;
use std::collections::HashSet;

fn eager() -> RoundPlan {
	RoundPlan { transact_probability: 1.0, ..Default::default() }
}

#[test]
fn simulate_condemning_malicious_peers() {
	let mut sim = Simulation::new(TrustConfig::default(), 2024).unwrap();
	let good = sim.spawn(6, Behaviour::Honest, false);
	let bad = sim.spawn(6, Behaviour::Malicious, false);
	sim.introduce(&good);
	sim.pre_trust(&good, 2).unwrap();
	sim.introduce(&bad);
	sim.introduce_groups(&good, &bad);

	sim.run(5, &eager(), 5).unwrap();

	let detection = sim.detection();
	assert_eq!(detection.adversary_views, 36);
	assert_eq!(detection.detection_rate(), 1.0);
	assert_eq!(detection.false_positive_rate(), 0.0);

	// Condemned peers are no longer served.
	let stats = sim.run_round(&eager()).unwrap();
	assert!(stats.unreachable >= 36);

	for row in sim.summary().iter().filter(|row| row.adversarial) {
		assert_eq!(row.condemned_by, 6);
		assert_eq!(row.mean_trust, 0.0);
	}
}

#[test]
fn simulate_gossip_through_directory() {
	let mut sim = Simulation::new(TrustConfig::default(), 5).unwrap();
	let agents = sim.spawn(3, Behaviour::Honest, false);
	let (a, b, c) = (&agents[0], &agents[1], &agents[2]);
	protocol::introduce(a, b);
	protocol::introduce(b, c);

	let b_id = lock(b).identity();
	let c_id = lock(c).identity();
	let a_id = lock(a).identity();
	assert!(!lock(a).peers().contains(&c_id));
	assert_eq!(protocol::transact_with(sim.directory(), a, &c_id, None), Outcome::Unreachable);

	assert_eq!(protocol::transact_with(sim.directory(), a, &b_id, None), Outcome::Positive);
	assert!(lock(a).peers().contains(&c_id));
	assert_eq!(lock(a).peers().get(&c_id).unwrap().transactions(), 0);

	assert_eq!(protocol::transact_with(sim.directory(), a, &c_id, None), Outcome::Positive);

	let view = protocol::public_view(sim.directory(), &a_id).unwrap();
	assert_eq!(view.len(), 2);
	assert!(view.iter().all(|record| record.transactions == 1));

	let stranger = Identity::random(&mut rand::thread_rng());
	assert!(protocol::public_view(sim.directory(), &stranger).is_none());
	assert_eq!(protocol::transact_with(sim.directory(), a, &stranger, None), Outcome::Unreachable);
}

#[test]
fn simulate_evicting_deflating_informant() {
	let mut sim = Simulation::new(TrustConfig::default(), 17).unwrap();
	let observer = sim.spawn(1, Behaviour::Honest, false);
	let deflator = sim.spawn(1, Behaviour::Honest, false);
	sim.spawn(4, Behaviour::Honest, false);
	sim.set_reporting(&deflator, |rng| Box::new(Deflationary::new(rng.gen())));
	let everyone = sim.agents().to_vec();
	sim.introduce(&everyone);

	let deflator_id = lock(&deflator[0]).identity();
	sim.pre_trust_where(&observer, |id| *id == deflator_id).unwrap();

	let mut evictions = Vec::new();
	for _ in 0..25 {
		sim.run_round(&eager()).unwrap();
		if sim.should_sense(5) {
			// Reports come back in agent order, the observer first.
			let reports = sim.sense();
			evictions.extend(reports[0].evicted.iter().copied());
		}
	}

	let observer = lock(&observer[0]);
	assert!(observer.trust_set().primary().is_empty());
	assert!(observer.peers().iter().all(|view| !view.is_condemned()));
	assert_eq!(evictions.len(), 1);
	assert_eq!(evictions[0].identity, deflator_id);
	assert!(matches!(
		evictions[0].reason,
		EvictionReason::Deflation | EvictionReason::SystematicDeflation
	));
}

#[tokio::test]
async fn simulate_concurrent_sensing() {
	let mut sim = Simulation::new(TrustConfig::default(), 99).unwrap();
	let good = sim.spawn(5, Behaviour::Honest, false);
	let bad = sim.spawn(5, Behaviour::Malicious, false);
	sim.introduce(&good);
	sim.pre_trust(&good, 2).unwrap();
	sim.introduce_groups(&good, &bad);

	for _ in 0..5 {
		sim.run_round(&eager()).unwrap();
	}
	let reports = sim.sense_concurrently().await.unwrap();
	assert_eq!(reports.len(), 10);

	let bad_ids: HashSet<Identity> = bad.iter().map(|handle| lock(handle).identity()).collect();
	for report in &reports[..good.len()] {
		let condemned: HashSet<Identity> = report.condemned.iter().copied().collect();
		assert_eq!(condemned, bad_ids);
		assert!(report.evicted.is_empty());
	}
	assert_eq!(sim.detection().detection_rate(), 1.0);
}
