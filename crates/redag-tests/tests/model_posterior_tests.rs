//! Long-run chain behavior against an exactly enumerated posterior.
//!
//! On three variables the DAG space is small enough to integrate the
//! posterior edge probabilities in closed form; empirical frequencies
//! from many independent chains must agree under a binomial test.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use redag_core::action::SamplerFactory;
use redag_core::bn::sf::Bde;
use redag_core::mcmc::Model;
use redag_core::{Network, ScoreCache, Variable};
use redag_tests::binomial_test;

fn log_sum(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    let max = a.max(b);
    ((a - max).exp() + (b - max).exp()).ln() + max
}

/// Toy data: three variables where C is driven by a threshold function
/// of A and B.
fn toy_variables(samples: usize, rng: &mut ChaCha8Rng) -> Vec<Variable> {
    let a: Vec<f64> = (0..samples).map(|_| rng.gen()).collect();
    let b: Vec<f64> = (0..samples).map(|_| rng.gen()).collect();
    let c: Vec<f64> = (0..samples)
        .map(|i| {
            if a[i] > 2.0 / 3.0 && b[i] > 2.0 / 3.0 {
                rng.gen::<f64>() / 3.0
            } else if a[i] < 1.0 / 3.0 && b[i] < 1.0 / 3.0 {
                0.6 + rng.gen::<f64>() / 3.0
            } else {
                rng.gen()
            }
        })
        .collect();
    vec![
        Variable::new("VAR1", &a, 3, 0).unwrap(),
        Variable::new("VAR2", &b, 3, 1).unwrap(),
        Variable::new("VAR3", &c, 3, 2).unwrap(),
    ]
}

/// Integrates the exact posterior over every DAG reachable by branching
/// on each ordered pair, returning per-edge probabilities and the total
/// evidence.
fn exact_solve(net: &mut Network, v: u32, u: u32) -> (Vec<Vec<f64>>, f64) {
    let n = net.size() as u32;
    if v == n {
        let score: f64 = (0..n).map(|i| net.score(i)).sum();
        let mut probs = vec![vec![0.0; n as usize]; n as usize];
        for (i, row) in probs.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = if net.edge_exists(i as u32, j as u32) {
                    1.0
                } else {
                    0.0
                };
            }
        }
        return (probs, score);
    }
    if u >= n {
        return exact_solve(net, v + 1, 0);
    }
    if v == u || net.path_exists(u, v) {
        return exact_solve(net, v, u + 1);
    }

    let mut with_edge = net.clone_for_chain();
    with_edge.add_edge(v, u);
    let (probs_without, score_without) = exact_solve(net, v, u + 1);
    let (probs_with, score_with) = exact_solve(&mut with_edge, v, u + 1);

    let total = log_sum(score_with, score_without);
    let k_without = (score_without - total).exp();
    let k_with = (score_with - total).exp();
    let mut probs = vec![vec![0.0; n as usize]; n as usize];
    for i in 0..n as usize {
        for j in 0..n as usize {
            probs[i][j] = probs_without[i][j] * k_without + probs_with[i][j] * k_with;
        }
    }
    (probs, total)
}

#[test]
fn long_run_edge_frequencies_match_the_exact_posterior() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
    // The memo table makes the repeated-restart loop cheap: three
    // variables only have a handful of distinct families to score.
    let scoring = Arc::new(ScoreCache::new(Bde::default()));
    let net = Network::new(toy_variables(240, &mut rng), scoring).unwrap();
    let expected = exact_solve(&mut net.clone_for_chain(), 0, 0).0;

    let models = 300u64;
    let steps = 3_000u64;
    let n = net.size();
    let mut counts = vec![vec![0u64; n]; n];

    for _ in 0..models {
        let mut model = Model::new(&net, SamplerFactory::new(1, 2), 10, 1.0);
        model.init(true, &mut rng);
        while !model.step(steps, &mut rng) {}

        assert!(
            (model.compute_log_likelihood() - model.log_likelihood()).abs() < 0.1,
            "likelihood bookkeeping drifted"
        );
        let adj = model.adj_matrix();
        for v in 0..n {
            for u in 0..n {
                if adj[v][u] {
                    counts[v][u] += 1;
                }
            }
        }
    }

    for v in 0..n {
        for u in 0..n {
            if v == u {
                continue;
            }
            let p_value = binomial_test(counts[v][u], models, expected[v][u]);
            assert!(
                p_value > 1e-4,
                "edge {v}->{u}: expected p {:.4}, got {}/{models} (p-value {p_value:.2e})",
                expected[v][u],
                counts[v][u],
            );
        }
    }
}
