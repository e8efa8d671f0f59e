use statrs::distribution::{DiscreteCDF, Poisson};
use unwrap::unwrap;

/// Result of a Poisson observed-count bound search
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoissonBound {
    pub value: i64,

    /// Cumulative probability at `value`
    pub prob: f64,

    /// False if the search stopped on the iteration limit
    pub converged: bool,
}

/// Find the observed count at which the Poisson CDF with mean `expected_val` reaches `required_prob`
///
/// The search starts from an analytic window on the side of the mean selected by `required_prob`,
/// with the window width scaled to the Poisson standard deviation, then bisects until the relative
/// probability error is below 0.001 or the window collapses. If the iteration limit is hit first,
/// the current test value is returned as an approximate bound with `converged` set to false.
///
/// The returned bound is on the same side of `expected_val` as the requested probability.
///
pub fn get_poisson_observed_given_prob(expected_val: i64, required_prob: f64) -> PoissonBound {
    get_poisson_observed_given_prob_impl(expected_val, required_prob, 20)
}

fn get_poisson_observed_given_prob_impl(
    expected_val: i64,
    required_prob: f64,
    max_iterations: usize,
) -> PoissonBound {
    assert!(required_prob > 0.0 && required_prob < 1.0);

    if expected_val <= 0 {
        return PoissonBound {
            value: 0,
            prob: 1.0,
            converged: true,
        };
    }

    let poisson = unwrap!(
        Poisson::new(expected_val as f64),
        "Invalid Poisson mean: {expected_val}"
    );
    let cdf = |x: i64| poisson.cdf(x.max(0) as u64);

    let max_rel_prob_error = 0.001;

    // Window width is tuned at the reference count and scales with sqrt(expected)
    let ref_count = 25.0;
    let ref_range_perc = 0.44;

    let expected = expected_val as f64;
    let range_perc = ref_range_perc / (expected / ref_count).sqrt();
    let range = range_perc * expected;

    let (mut test_lower, mut test_upper) = if required_prob > 0.5 {
        (
            (expected + range * 0.2).max(0.0).round() as i64,
            (expected + range * 1.5).round() as i64,
        )
    } else {
        (
            (expected - range * 1.2).max(0.0).round() as i64,
            (expected - range * 0.2).round() as i64,
        )
    };

    let mut test_value = ((test_lower + test_upper) as f64 * 0.5) as i64;
    let mut current_prob = cdf(test_value);
    let mut iterations = 0;

    while iterations < max_iterations {
        let prob_diff = (required_prob - current_prob).abs() / required_prob;
        if prob_diff < max_rel_prob_error {
            break;
        }

        if current_prob > required_prob {
            if test_value <= test_lower + 1 {
                break;
            }
            test_upper = test_value;
            test_value = ((test_value + test_lower) as f64 * 0.5).round() as i64;
        } else {
            if test_value >= test_upper - 1 {
                break;
            }
            test_lower = test_value;
            test_value = ((test_value + test_upper) as f64 * 0.5).round() as i64;
        }

        current_prob = cdf(test_value);
        iterations += 1;
    }

    PoissonBound {
        value: test_value,
        prob: current_prob,
        converged: iterations < max_iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisson_bounds_bracket_expected_value() {
        for expected_val in 1..=400 {
            let low = get_poisson_observed_given_prob(expected_val, 0.005);
            let high = get_poisson_observed_given_prob(expected_val, 0.995);
            assert!(low.value >= 0);
            assert!(
                low.value <= expected_val,
                "low bound {} above expected {expected_val}",
                low.value
            );
            assert!(
                high.value >= expected_val,
                "high bound {} below expected {expected_val}",
                high.value
            );
        }
    }

    #[test]
    fn test_poisson_bounds_at_100() {
        let low = get_poisson_observed_given_prob(100, 0.005);
        let high = get_poisson_observed_given_prob(100, 0.995);
        assert!((70..=80).contains(&low.value), "low: {}", low.value);
        assert!((120..=132).contains(&high.value), "high: {}", high.value);
    }

    #[test]
    fn test_poisson_bound_iteration_limit() {
        let expected_val = 1_000_000;

        // The first window midpoint is about 1.9 standard deviations above the mean, well short of
        // the 0.995 quantile, so the search needs more than one bisection step
        let bound = get_poisson_observed_given_prob_impl(expected_val, 0.995, 1);
        assert!(!bound.converged);
        assert!(bound.value > expected_val);

        let bound = get_poisson_observed_given_prob(expected_val, 0.995);
        assert!(bound.converged);
        assert!(bound.value > expected_val);
    }

    #[test]
    fn test_poisson_bound_zero_expected() {
        let bound = get_poisson_observed_given_prob(0, 0.995);
        assert_eq!(bound.value, 0);
        assert!(bound.converged);
    }
}
