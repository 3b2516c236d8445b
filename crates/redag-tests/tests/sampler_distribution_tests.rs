//! Statistical tests of the action sampler: empirical draw frequencies
//! must match the target categorical distribution across every batch-size
//! and cache-size configuration, before and after disables.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use redag_core::action::ActionSampler;
use redag_tests::binomial_test;

const CHOICES: usize = 10_000;

/// Draws `CHOICES` actions and checks every action's hit frequency with a
/// two-tailed binomial test against its normalized probability.
fn assert_matches_distribution(
    sampler: &mut ActionSampler,
    ps: &[f64],
    rng: &mut ChaCha8Rng,
    label: &str,
) {
    let lls: Vec<f64> = ps.iter().map(|p| p.ln()).collect();
    let mut score = |i: usize| lls[i];
    let mut hits = vec![0u64; ps.len()];
    for _ in 0..CHOICES {
        if let Some(choice) = sampler.random_action(rng, &mut score) {
            hits[choice as usize] += 1;
        }
    }
    let total: u64 = hits.iter().sum();
    let ps_sum: f64 = ps.iter().sum();
    for i in 0..ps.len() {
        let expected = ps[i] / ps_sum;
        let p_value = binomial_test(hits[i], total, expected);
        assert!(
            p_value > 1e-6,
            "{label}: action {i} expected p {expected:.4}, got {}/{total} (p-value {p_value:.2e})",
            hits[i],
        );
    }
}

#[test]
fn frequencies_match_across_batch_and_cache_sizes() {
    let ps = [1.0, 1.0, 0.1, 0.1, 1.0, 0.1, 1.0, 0.5, 0.5];
    let initial_ll = (1.0f64 / ps.len() as f64).ln();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for batch_size in 1..=ps.len() {
        for cache_size in 0..=ps.len() {
            let mut sampler =
                ActionSampler::new(ps.len(), batch_size, cache_size, initial_ll, 1.0);
            assert_matches_distribution(
                &mut sampler,
                &ps,
                &mut rng,
                &format!("batch={batch_size} cache={cache_size}"),
            );
        }
    }
}

#[test]
fn frequencies_track_disable_and_re_enable() {
    const VARIABLES: usize = 10;
    const TOGGLES: usize = 40;

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let original: Vec<f64> = (0..VARIABLES).map(|_| rng.gen::<f64>()).collect();
    let lls: Vec<f64> = original.iter().map(|p| p.ln()).collect();
    let initial_ll = (1.0f64 / VARIABLES as f64).ln();

    let mut sampler = ActionSampler::new(VARIABLES, 3, 2, initial_ll, 1.0);
    let mut ps = original.clone();
    let mut disabled = vec![false; VARIABLES];
    let mut score = |i: usize| lls[i];

    for toggle in 0..TOGGLES {
        let var = rng.gen_range(0..VARIABLES);
        if disabled[var] {
            ps[var] = original[var];
            sampler.re_enable_action(var as u32, &mut score);
        } else {
            // Never disable the last live action; the distribution would
            // be empty and sampling it is outside the contract.
            if disabled.iter().filter(|d| !**d).count() == 1 {
                continue;
            }
            ps[var] = 0.0;
            sampler.disable_action(var as u32, lls[var]);
        }
        disabled[var] = !disabled[var];

        let mut hits = vec![0u64; VARIABLES];
        for _ in 0..CHOICES {
            if let Some(choice) = sampler.random_action(&mut rng, &mut score) {
                hits[choice as usize] += 1;
            }
        }
        let total: u64 = hits.iter().sum();
        let ps_sum: f64 = ps.iter().sum();
        for i in 0..VARIABLES {
            let expected = ps[i] / ps_sum;
            let p_value = binomial_test(hits[i], total, expected);
            assert!(
                p_value > 1e-6,
                "toggle {toggle}: action {i} expected p {expected:.4}, got {}/{total} (p-value {p_value:.2e})",
                hits[i],
            );
        }
        assert!(disabled[var] != (ps[var] > 0.0));
    }
}
