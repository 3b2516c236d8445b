//! Test-support helpers shared by the integration suites.

/// ln C(n, k) via the log-gamma function.
fn ln_choose(n: u64, k: u64) -> f64 {
    libm::lgamma((n + 1) as f64) - libm::lgamma((k + 1) as f64) - libm::lgamma((n - k + 1) as f64)
}

/// Binomial CDF P(X <= k) by direct summation in log space.
pub fn binomial_cdf(k: i64, n: u64, p: f64) -> f64 {
    if k < 0 {
        return 0.0;
    }
    if k as u64 >= n {
        return 1.0;
    }
    if p <= 0.0 {
        return 1.0;
    }
    if p >= 1.0 {
        return 0.0;
    }
    let (lp, lq) = (p.ln(), (1.0 - p).ln());
    let mut total = 0.0;
    for i in 0..=k as u64 {
        total += (ln_choose(n, i) + i as f64 * lp + (n - i) as f64 * lq).exp();
    }
    total.min(1.0)
}

/// Two-tailed binomial test: the probability, under Binomial(n, p), of an
/// outcome at least as far from the mean as `k`. Small values reject.
pub fn binomial_test(k: u64, n: u64, p: f64) -> f64 {
    let mean = p * n as f64;
    let delta = (k as f64 - mean).abs();
    let lower = binomial_cdf((mean - delta).floor() as i64, n, p);
    let upper = 1.0 - binomial_cdf((mean + delta).ceil() as i64 - 1, n, p);
    (lower + upper).min(1.0)
}
