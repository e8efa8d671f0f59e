//! Non-fatal conditions found while processing one sample
//!
//! Every diagnostic is also written to the log when it is recorded, but callers and tests can
//! inspect the returned list instead of relying on log output.
//!

use log::{debug, warn};
use serde::Serialize;

use crate::cluster::ClusterId;
use crate::structural_variant::SvId;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Diagnostic {
    /// Poisson bound search hit its iteration cap, the last test value was used as the bound
    PoissonBoundNotConverged {
        expected_count: i64,
        required_prob: f64,
        bound: i64,
        prob: f64,
    },

    /// The fused ploidy estimate was NaN or non-positive
    InvalidPloidyEstimate {
        sv_id: SvId,
        estimate: f64,
        uncertainty: f64,
    },

    /// Copy number segments could not be built for one chromosome
    SegmentBuildFailure { chromosome: String, message: String },

    /// Cluster ploidy range does not support replication
    InvalidClusterPloidy {
        cluster_id: ClusterId,
        min_ploidy: f64,
        max_ploidy: f64,
    },

    /// Replication multiples were scaled down to stay within the chaining limit
    ReplicationScaled {
        cluster_id: ClusterId,
        total_replication_count: u32,
        replication_cap: u32,
    },

    /// Cluster breakends do not balance from telomere to telomere
    InconsistentCluster {
        cluster_id: ClusterId,
        consistency_count: i32,
    },
}

impl Diagnostic {
    fn log(&self) {
        match self {
            Diagnostic::PoissonBoundNotConverged {
                expected_count,
                required_prob,
                bound,
                prob,
            } => {
                warn!(
                    "Max iterations reached in Poisson bound search: expected({expected_count}) required_prob({required_prob}) bound({bound}) prob({prob:.4})"
                );
            }
            Diagnostic::InvalidPloidyEstimate {
                sv_id,
                estimate,
                uncertainty,
            } => {
                debug!("SV {sv_id} has unexpected ploidy estimate({estimate}) uncertainty({uncertainty})");
            }
            Diagnostic::SegmentBuildFailure {
                chromosome,
                message,
            } => {
                warn!("Copy number segment build failed for chromosome '{chromosome}': {message}");
            }
            Diagnostic::InvalidClusterPloidy {
                cluster_id,
                min_ploidy,
                max_ploidy,
            } => {
                debug!(
                    "Cluster {cluster_id} has invalid ploidy variation (min={min_ploidy} max={max_ploidy})"
                );
            }
            Diagnostic::ReplicationScaled {
                cluster_id,
                total_replication_count,
                replication_cap,
            } => {
                debug!(
                    "Cluster {cluster_id} replication count {total_replication_count} scaled to limit {replication_cap}"
                );
            }
            Diagnostic::InconsistentCluster {
                cluster_id,
                consistency_count,
            } => {
                debug!("Cluster {cluster_id} is inconsistent (count={consistency_count})");
            }
        }
    }
}

/// Collects the diagnostics for one sample
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub data: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        diagnostic.log();
        self.data.push(diagnostic);
    }
}
