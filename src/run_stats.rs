//! Track stats for the whole svploidy run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::diagnostics::Diagnostic;
use crate::sample_analysis::SampleAnalysis;

pub const RUN_STATS_FILENAME: &str = "run_stats.json";

#[derive(Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SampleRunStats {
    pub sample_id: String,
    pub sv_count: usize,
    pub invalid_ploidy_estimate_count: usize,
    pub segment_build_failure_count: usize,
    pub cluster_count: usize,
    pub resolved_cluster_count: usize,

    /// Clusters with more than one SV
    pub multi_sv_cluster_count: usize,

    pub diagnostic_count: usize,
    pub analysis_time_secs: f64,
}

impl SampleRunStats {
    pub fn new(analysis: &SampleAnalysis, analysis_time_secs: f64) -> Self {
        let count_diagnostics = |f: fn(&Diagnostic) -> bool| {
            analysis.diagnostics.iter().filter(|&x| f(x)).count()
        };
        Self {
            sample_id: analysis.sample_id.clone(),
            sv_count: analysis.sv_ploidy.len(),
            invalid_ploidy_estimate_count: count_diagnostics(|x| {
                matches!(x, Diagnostic::InvalidPloidyEstimate { .. })
            }),
            segment_build_failure_count: analysis.segment_build_errors.len(),
            cluster_count: analysis.clusters.len(),
            resolved_cluster_count: analysis.clusters.iter().filter(|x| x.is_resolved).count(),
            multi_sv_cluster_count: analysis
                .clusters
                .iter()
                .filter(|x| x.member_sv_ids.len() > 1)
                .count(),
            diagnostic_count: analysis.diagnostics.len(),
            analysis_time_secs,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RunStats {
    pub samples: Vec<SampleRunStats>,
    pub total_sv_count: usize,
    pub total_cluster_count: usize,
    pub total_runtime_secs: f64,
}

impl RunStats {
    pub fn new(samples: Vec<SampleRunStats>, total_runtime_secs: f64) -> Self {
        Self {
            total_sv_count: samples.iter().map(|x| x.sv_count).sum(),
            total_cluster_count: samples.iter().map(|x| x.cluster_count).sum(),
            samples,
            total_runtime_secs,
        }
    }
}

/// Write run_stats structure out in json format
pub fn write_run_stats(output_dir: &Utf8Path, run_stats: &RunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_stats_totals() {
        let sample = |sample_id: &str, sv_count, cluster_count| SampleRunStats {
            sample_id: sample_id.to_string(),
            sv_count,
            cluster_count,
            ..Default::default()
        };
        let run_stats = RunStats::new(vec![sample("S1", 10, 4), sample("S2", 3, 3)], 1.5);
        assert_eq!(run_stats.total_sv_count, 13);
        assert_eq!(run_stats.total_cluster_count, 7);
        assert_eq!(run_stats.samples[1].sample_id, "S2");
    }
}
