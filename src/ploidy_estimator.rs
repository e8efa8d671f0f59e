//! Fuse the copy number change and read count derived ploidy observations of one SV into a single
//! ploidy estimate with uncertainty
//!

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::prob_utils::get_poisson_observed_given_prob;

const ABS_UNCERTAINTY: f64 = 0.15;
const RELATIVE_UNCERTAINTY: f64 = 0.10;
const ADDITIONAL_ABS_UNCERTAINTY: f64 = 0.4;
const ADDITIONAL_REL_UNCERTAINTY: f64 = 0.15;

/// Fraction of the mean copy number side uncertainty added to the read count ploidy uncertainty
const PROPORTION_CNCHANGE_USED_IN_PLOIDY_UNC: f64 = 0.5;

const POISSON_PROB_LOW: f64 = 0.005;
const POISSON_PROB_HIGH: f64 = 0.995;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PloidyEstimate {
    pub estimate: f64,
    pub uncertainty: f64,

    /// If false, the estimate and uncertainty are both zero and the SV ploidy should be treated as
    /// unreliable
    pub valid: bool,
}

impl PloidyEstimate {
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// A single noisy ploidy observation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PloidyObservation {
    pub value: f64,
    pub uncertainty: f64,
}

/// Copy number evidence on one side of an SV
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CopyNumberSideObservation {
    /// Copy number change across the breakend
    pub copy_number_change: f64,

    /// Higher of the copy numbers on each side of the breakend
    pub max_copy_number: f64,

    /// Depth window counts of the segments before and after the breakend
    pub depth_window_counts: [u32; 2],
}

/// All ploidy evidence available for one SV
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SvPloidyObservations {
    pub start: Option<CopyNumberSideObservation>,
    pub end: Option<CopyNumberSideObservation>,
    pub tumor_variant_read_count: u32,

    /// Ploidy from the upstream segment fit
    pub ploidy: f64,
}

/// Uncertainty of a copy number change observation given the local copy number and the depth
/// window support on either side of the breakend
///
pub fn get_copy_number_side_uncertainty(copy_number: f64, depth_window_counts: &[u32; 2]) -> f64 {
    let min_depth_count = (depth_window_counts[0].min(depth_window_counts[1]) as f64).max(0.1);

    let uncertainty = (copy_number * RELATIVE_UNCERTAINTY).max(ABS_UNCERTAINTY);
    uncertainty
        + ADDITIONAL_ABS_UNCERTAINTY.max(ADDITIONAL_REL_UNCERTAINTY * copy_number)
            / min_depth_count.sqrt()
}

/// Combine observations by inverse-variance weighting
///
/// The combined uncertainty is corrected for observation disagreement, with each observation's
/// deviation from the consensus floored at half its own uncertainty.
///
/// A single observation is returned unchanged.
///
pub fn fuse_ploidy_observations(observations: &[PloidyObservation]) -> PloidyEstimate {
    let (est_ploidy, est_uncertainty) = match observations {
        [] => (0.0, 0.0),
        [single] => (single.value, single.uncertainty),
        _ => {
            let inv_sq = |x: &PloidyObservation| 1.0 / x.uncertainty.powi(2);

            let sum_weight = observations.iter().map(inv_sq).sum::<f64>();
            let sum_weighted_obs = observations
                .iter()
                .map(|x| x.value * inv_sq(x))
                .sum::<f64>();
            let est_ploidy = sum_weighted_obs / sum_weight;

            let adj_uncertainty = observations
                .iter()
                .map(|x| {
                    let deviation = (x.value - est_ploidy).abs().max(x.uncertainty / 2.0);
                    inv_sq(x) * deviation.powi(2)
                })
                .sum::<f64>();

            let n = observations.len() as f64;
            let est_uncertainty = (n / (n - 1.0) * adj_uncertainty / sum_weight).sqrt();
            (est_ploidy, est_uncertainty)
        }
    };

    if est_ploidy.is_nan() || est_ploidy <= 0.0 || est_uncertainty.is_nan() || est_uncertainty <= 0.0
    {
        PloidyEstimate::invalid()
    } else {
        PloidyEstimate {
            estimate: est_ploidy,
            uncertainty: est_uncertainty,
            valid: true,
        }
    }
}

/// Ploidy observation derived from the tumor variant read count
///
/// The read count is replaced by the midpoint of its 99% Poisson interval, and the uncertainty
/// is half the interval width relative to the read count, plus a share of the copy number side
/// uncertainty.
///
fn get_read_count_observation(
    read_count: u32,
    ploidy: f64,
    cn_uncertainties: &[f64],
    diagnostics: &mut Diagnostics,
) -> PloidyObservation {
    let read_count = read_count as i64;
    let mut get_bound = |prob| {
        let bound = get_poisson_observed_given_prob(read_count, prob);
        if !bound.converged {
            diagnostics.push(Diagnostic::PoissonBoundNotConverged {
                expected_count: read_count,
                required_prob: prob,
                bound: bound.value,
                prob: bound.prob,
            });
        }
        bound.value as f64
    };
    let rc_low = get_bound(POISSON_PROB_LOW);
    let rc_high = get_bound(POISSON_PROB_HIGH);

    let read_count = read_count as f64;
    let rc_ploidy = ploidy * ((rc_low + rc_high) * 0.5) / read_count;

    let cn_uncertainty_factor = if cn_uncertainties.is_empty() {
        0.0
    } else {
        cn_uncertainties.iter().sum::<f64>() / cn_uncertainties.len() as f64
    };

    let uncertainty = rc_ploidy * (rc_high - rc_low) / read_count * 0.5
        + cn_uncertainty_factor * PROPORTION_CNCHANGE_USED_IN_PLOIDY_UNC;

    PloidyObservation {
        value: rc_ploidy,
        uncertainty,
    }
}

/// Estimate SV ploidy from up to three observations: the copy number change at each breakend and
/// the ploidy implied by the tumor variant read count
///
pub fn estimate_ploidy(
    sv_observations: &SvPloidyObservations,
    diagnostics: &mut Diagnostics,
) -> PloidyEstimate {
    let mut observations = [&sv_observations.start, &sv_observations.end]
        .into_iter()
        .flatten()
        .map(|x| PloidyObservation {
            value: x.copy_number_change,
            uncertainty: get_copy_number_side_uncertainty(x.max_copy_number, &x.depth_window_counts),
        })
        .filter(|x| x.uncertainty > 0.0)
        .collect::<Vec<_>>();

    if sv_observations.tumor_variant_read_count > 0 {
        let cn_uncertainties = observations.iter().map(|x| x.uncertainty).collect::<Vec<_>>();
        let rc_observation = get_read_count_observation(
            sv_observations.tumor_variant_read_count,
            sv_observations.ploidy,
            &cn_uncertainties,
            diagnostics,
        );
        if rc_observation.uncertainty > 0.0 {
            observations.push(rc_observation);
        }
    }

    fuse_ploidy_observations(&observations)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_copy_number_side_uncertainty() {
        // Low copy number uses the absolute terms
        let u = get_copy_number_side_uncertainty(1.0, &[4, 100]);
        assert_relative_eq!(u, 0.15 + 0.4 / 2.0, epsilon = 1e-12);

        // High copy number uses the relative terms
        let u = get_copy_number_side_uncertainty(10.0, &[100, 25]);
        assert_relative_eq!(u, 1.0 + 1.5 / 5.0, epsilon = 1e-12);

        // Zero depth support is floored
        let u = get_copy_number_side_uncertainty(1.0, &[0, 10]);
        assert_relative_eq!(u, 0.15 + 0.4 / 0.1f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_single_observation_passthrough() {
        let obs = PloidyObservation {
            value: 1.7,
            uncertainty: 0.3,
        };
        let result = fuse_ploidy_observations(&[obs]);
        assert!(result.valid);
        assert_eq!(result.estimate, 1.7);
        assert_eq!(result.uncertainty, 0.3);
    }

    #[test]
    fn test_fusion_is_order_independent() {
        let obs = [
            PloidyObservation {
                value: 2.1,
                uncertainty: 0.4,
            },
            PloidyObservation {
                value: 1.8,
                uncertainty: 0.6,
            },
            PloidyObservation {
                value: 3.5,
                uncertainty: 1.2,
            },
        ];
        let expected = fuse_ploidy_observations(&obs);
        assert!(expected.valid);

        let permutations = [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for perm in permutations {
            let permuted = perm.map(|i| obs[i]);
            let result = fuse_ploidy_observations(&permuted);
            assert_relative_eq!(result.estimate, expected.estimate, epsilon = 1e-12);
            assert_relative_eq!(result.uncertainty, expected.uncertainty, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_two_observation_fusion() {
        // Equal uncertainties average the observations. Each deviation of 0.1 is below half the
        // observation uncertainty, so the floor of 0.25 applies to both terms
        let obs = [
            PloidyObservation {
                value: 2.0,
                uncertainty: 0.5,
            },
            PloidyObservation {
                value: 2.2,
                uncertainty: 0.5,
            },
        ];
        let result = fuse_ploidy_observations(&obs);
        assert_relative_eq!(result.estimate, 2.1, epsilon = 1e-12);
        assert_relative_eq!(result.uncertainty, (2.0f64 / 1.0 * 0.5 / 8.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_discordant_observation_inflates_uncertainty() {
        let concordant = [
            PloidyObservation {
                value: 2.0,
                uncertainty: 0.5,
            },
            PloidyObservation {
                value: 2.0,
                uncertainty: 0.5,
            },
        ];
        let discordant = [
            PloidyObservation {
                value: 2.0,
                uncertainty: 0.5,
            },
            PloidyObservation {
                value: 5.0,
                uncertainty: 0.5,
            },
        ];
        let concordant = fuse_ploidy_observations(&concordant);
        let discordant = fuse_ploidy_observations(&discordant);
        assert!(discordant.uncertainty > concordant.uncertainty);
    }

    #[test]
    fn test_invalid_estimates() {
        assert_eq!(fuse_ploidy_observations(&[]), PloidyEstimate::invalid());

        let negative = [PloidyObservation {
            value: -0.5,
            uncertainty: 0.3,
        }];
        assert_eq!(fuse_ploidy_observations(&negative), PloidyEstimate::invalid());

        let nan = [
            PloidyObservation {
                value: f64::NAN,
                uncertainty: 0.3,
            },
            PloidyObservation {
                value: 1.0,
                uncertainty: 0.3,
            },
        ];
        assert_eq!(fuse_ploidy_observations(&nan), PloidyEstimate::invalid());
    }

    #[test]
    fn test_read_count_only_estimate() {
        let obs = SvPloidyObservations {
            start: None,
            end: None,
            tumor_variant_read_count: 100,
            ploidy: 2.0,
        };
        let mut diagnostics = Diagnostics::default();
        let result = estimate_ploidy(&obs, &mut diagnostics);

        // The result should be exactly the single read count observation
        let expected =
            get_read_count_observation(100, 2.0, &[], &mut Diagnostics::default());
        assert!(result.valid);
        assert_eq!(result.estimate, expected.value);
        assert_eq!(result.uncertainty, expected.uncertainty);
        assert!(result.uncertainty > 0.0);
        assert!(result.uncertainty < 2.0);
        assert!(diagnostics.data.is_empty());
    }

    #[test]
    fn test_full_estimate() {
        let side = CopyNumberSideObservation {
            copy_number_change: 2.0,
            max_copy_number: 4.0,
            depth_window_counts: [50, 60],
        };
        let obs = SvPloidyObservations {
            start: Some(side),
            end: Some(CopyNumberSideObservation {
                copy_number_change: 1.8,
                ..side
            }),
            tumor_variant_read_count: 30,
            ploidy: 1.9,
        };
        let result = estimate_ploidy(&obs, &mut Diagnostics::default());
        assert!(result.valid);
        assert!(result.estimate > 1.7 && result.estimate < 2.1);
        assert!(result.uncertainty > 0.0);
    }
}
