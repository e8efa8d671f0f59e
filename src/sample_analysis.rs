//! Run ploidy estimation, copy number segmentation and clustering for one sample
//!

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use serde::Serialize;
use simple_error::{SimpleResult, bail};

use crate::cluster::{
    ArmGroup, Chain, Cluster, ClusterId, ClusterReason, ClusteringSettings, ClusterSet, LohEvent,
    ResolvedType, build_clusters, classify_cluster,
};
use crate::copy_number_segment::{BreakendCopyNumber, CopyNumberSegment};
use crate::copy_number_segment_builder::{AllelePloidyBaseline, build_copy_number_profile};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::ploidy_estimator::PloidyEstimate;
use crate::ref_genome_arms::RefGenomeArms;
use crate::sample_input::SampleInput;
use crate::sample_ploidy::estimate_sample_ploidy;
use crate::structural_variant::{PloidyRange, StructuralVariant, SvId, SvType};

const DOUBLE_MINUTE_ANNOTATION: &str = "DM";

#[derive(Clone, Debug)]
pub struct AnalysisSettings {
    pub allele_ploidy: AllelePloidyBaseline,
    pub clustering: ClusteringSettings,

    /// If true, a copy number segmentation failure on any chromosome fails the whole sample
    pub abort_on_invalid_copy_number: bool,
}

#[derive(Debug, Serialize)]
pub struct SvPloidyOutput {
    pub sv_id: SvId,
    pub sv_type: SvType,
    pub ploidy_estimate: PloidyEstimate,

    /// Ploidy used for segmentation and clustering
    pub ploidy: f64,

    pub ploidy_range: Option<PloidyRange>,
    pub start_copy_number: Option<BreakendCopyNumber>,
    pub end_copy_number: Option<BreakendCopyNumber>,
    pub cluster_id: ClusterId,

    /// Copy count of the SV within its cluster after ploidy replication
    pub replication_multiple: u32,
}

#[derive(Debug, Serialize)]
pub struct ClusterOutput {
    pub id: ClusterId,
    pub member_sv_ids: Vec<SvId>,
    pub consistency_count: i32,
    pub min_ploidy: f64,
    pub max_ploidy: f64,
    pub resolved_type: ResolvedType,
    pub is_resolved: bool,
    pub synthetic_length: Option<i64>,
    pub replication_multiples: BTreeMap<SvId, u32>,
    pub cluster_reasons: Vec<ClusterReason>,
    pub annotations: Vec<String>,
    pub arm_groups: Vec<ArmGroup>,
    pub chains: Vec<Chain>,
    pub loh_events: Vec<LohEvent>,
    pub foldbacks: Vec<SvId>,
    pub inversions: Vec<SvId>,
    pub long_del_dups: Vec<SvId>,
    pub double_minute_svs: Vec<SvId>,
    pub is_line: bool,
    pub is_subclonal: bool,
    pub requires_replication: bool,
}

impl From<&Cluster> for ClusterOutput {
    fn from(cluster: &Cluster) -> Self {
        let (min_ploidy, max_ploidy) = cluster.min_max_ploidy();
        Self {
            id: cluster.id(),
            member_sv_ids: cluster.members().iter().map(|x| x.sv_id).collect(),
            consistency_count: cluster.consistency_count(),
            min_ploidy,
            max_ploidy,
            resolved_type: cluster.resolved_type(),
            is_resolved: cluster.is_resolved(),
            synthetic_length: cluster.synthetic_length(),
            replication_multiples: cluster.replication_multiples().clone(),
            cluster_reasons: cluster.cluster_reasons().to_vec(),
            annotations: cluster.annotations().to_vec(),
            arm_groups: cluster.arm_groups().to_vec(),
            chains: cluster.chains().to_vec(),
            loh_events: cluster.loh_events().to_vec(),
            foldbacks: cluster.foldbacks().to_vec(),
            inversions: cluster.inversions().to_vec(),
            long_del_dups: cluster.long_del_dups().to_vec(),
            double_minute_svs: cluster.double_minute_svs().to_vec(),
            is_line: cluster.is_line(),
            is_subclonal: cluster.is_subclonal(),
            requires_replication: cluster.requires_replication(),
        }
    }
}

/// All results for one sample
#[derive(Debug, Serialize)]
pub struct SampleAnalysis {
    pub sample_id: String,
    pub sv_ploidy: Vec<SvPloidyOutput>,
    pub copy_number_segments: BTreeMap<String, Vec<CopyNumberSegment>>,

    /// Copy number segments with same-valued centromere boundaries merged, for track output
    #[serde(skip)]
    pub collapsed_copy_number_segments: BTreeMap<String, Vec<CopyNumberSegment>>,

    pub segment_build_errors: Vec<String>,
    pub clusters: Vec<ClusterOutput>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Attach upstream LOH events and double minute groups to the clusters of their SVs
fn annotate_clusters(sample_input: &SampleInput, cluster_set: &mut ClusterSet) {
    for loh_event in sample_input.loh_events.iter() {
        for sv_id in loh_event.sv_ids() {
            if let Some(cluster) = cluster_set.get_sv_cluster_mut(sv_id) {
                cluster.add_loh_event(LohEvent {
                    chromosome: loh_event.chromosome.clone(),
                    start: loh_event.start,
                    end: loh_event.end,
                });
            }
        }
    }

    for double_minute in sample_input.double_minutes.iter() {
        let mut cluster_svs: BTreeMap<ClusterId, Vec<SvId>> = BTreeMap::new();
        for &sv_id in double_minute.iter() {
            if let Some(cluster_id) = cluster_set.get_sv_cluster_id(sv_id) {
                cluster_svs.entry(cluster_id).or_default().push(sv_id);
            }
        }
        for (cluster_id, sv_ids) in cluster_svs {
            if let Some(cluster) = cluster_set.get_mut(cluster_id) {
                cluster.set_double_minute_svs(&sv_ids);
                cluster.add_annotation(DOUBLE_MINUTE_ANNOTATION);
            }
        }
    }
}

/// Run the full analysis for one sample
///
/// Fails if any SV can't be placed on the reference arms, or if copy number segmentation fails
/// while `abort_on_invalid_copy_number` is set.
///
pub fn analyze_sample(
    sample_input: &SampleInput,
    settings: &AnalysisSettings,
    ref_arms: &RefGenomeArms,
) -> SimpleResult<SampleAnalysis> {
    let sample_id = &sample_input.sample_id;
    info!(
        "Analyzing sample '{sample_id}' with {} SVs",
        sample_input.structural_variants.len()
    );

    let mut diagnostics = Diagnostics::default();

    let mut svs = sample_input
        .structural_variants
        .iter()
        .map(|x| StructuralVariant::from_record(x, ref_arms))
        .collect::<SimpleResult<Vec<_>>>()?;

    let ploidy_estimates = estimate_sample_ploidy(&svs, &sample_input.depth_segments, &mut diagnostics);
    for (sv, (_, estimate)) in svs.iter_mut().zip(ploidy_estimates.iter()) {
        sv.apply_ploidy_estimate(estimate);
    }

    let allele_ploidy = sample_input.allele_ploidy.unwrap_or(settings.allele_ploidy);
    let profile_build = build_copy_number_profile(&svs, &allele_ploidy, ref_arms);
    let mut segment_build_errors = Vec::new();
    for error in profile_build.errors {
        if settings.abort_on_invalid_copy_number {
            bail!("Copy number segmentation failed for sample '{sample_id}': {error}");
        }
        diagnostics.push(Diagnostic::SegmentBuildFailure {
            chromosome: error.chromosome().to_string(),
            message: error.to_string(),
        });
        segment_build_errors.push(error.to_string());
    }
    let profile = profile_build.profile;

    let mut cluster_set = build_clusters(&svs, &sample_input.assembly_links, &settings.clustering);
    annotate_clusters(sample_input, &mut cluster_set);
    for cluster in cluster_set.clusters_mut() {
        classify_cluster(cluster, &settings.clustering, &mut diagnostics);
    }

    let sv_clusters = svs
        .iter()
        .map(|sv| {
            let cluster = cluster_set
                .get_sv_cluster_id(sv.id)
                .and_then(|x| cluster_set.get(x))
                .unwrap_or_else(|| panic!("SV {} was not clustered", sv.id));
            (sv.id, cluster)
        })
        .collect::<HashMap<_, _>>();

    let sv_ploidy = svs
        .iter()
        .zip(ploidy_estimates)
        .map(|(sv, (_, ploidy_estimate))| {
            let get_copy_number = |is_start| {
                let breakend = sv.breakend(is_start)?;
                profile.get_breakend_copy_number(&breakend.id()).copied()
            };
            SvPloidyOutput {
                sv_id: sv.id,
                sv_type: sv.sv_type,
                ploidy_estimate,
                ploidy: sv.ploidy,
                ploidy_range: sv.ploidy_range,
                start_copy_number: get_copy_number(true),
                end_copy_number: get_copy_number(false),
                cluster_id: sv_clusters[&sv.id].id(),
                replication_multiple: sv_clusters[&sv.id].replication_multiple(sv.id),
            }
        })
        .collect();

    let copy_number_segments = profile
        .chromosomes
        .iter()
        .map(|(chromosome, segments)| (chromosome.clone(), segments.segments().to_vec()))
        .collect();

    let collapsed_copy_number_segments = profile
        .chromosomes
        .iter()
        .map(|(chromosome, segments)| {
            (
                chromosome.clone(),
                segments.collapse_centromere_boundaries(),
            )
        })
        .collect();

    let clusters = cluster_set
        .clusters()
        .map(ClusterOutput::from)
        .collect::<Vec<_>>();

    debug!(
        "Sample '{sample_id}' analysis produced {} clusters and {} diagnostics",
        clusters.len(),
        diagnostics.data.len()
    );

    Ok(SampleAnalysis {
        sample_id: sample_id.clone(),
        sv_ploidy,
        copy_number_segments,
        collapsed_copy_number_segments,
        segment_build_errors,
        clusters,
        diagnostics: diagnostics.data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_input::{
        AssemblyLink, BreakendRecord, DepthSegmentRecord, LohEventRecord, SvRecord,
    };
    use crate::structural_variant::BreakendId;

    fn breakend_record(chromosome: &str, position: i64, orientation: i8) -> BreakendRecord {
        BreakendRecord {
            chromosome: chromosome.to_string(),
            position,
            orientation,
            adjusted_copy_number_change: 1.0,
            tumor_variant_fragment_count: 20,
            tumor_reference_fragment_count: 20,
        }
    }

    fn sv_record(
        id: SvId,
        sv_type: SvType,
        start: BreakendRecord,
        end: Option<BreakendRecord>,
    ) -> SvRecord {
        SvRecord {
            id,
            sv_type,
            start,
            end,
            ploidy: 1.0,
            calculated_ploidy_min: None,
            calculated_ploidy_max: None,
            is_line_element: false,
        }
    }

    fn depth_segment(chromosome: &str, start: i64, end: i64, copy_number: f64) -> DepthSegmentRecord {
        DepthSegmentRecord {
            chromosome: chromosome.to_string(),
            start,
            end,
            copy_number,
            depth_window_count: 50,
        }
    }

    fn get_test_settings() -> AnalysisSettings {
        AnalysisSettings {
            allele_ploidy: AllelePloidyBaseline {
                other_allele_ploidy: 1.0,
                undisrupted_allele_ploidy: 1.0,
            },
            clustering: ClusteringSettings::default(),
            abort_on_invalid_copy_number: false,
        }
    }

    fn get_test_input() -> SampleInput {
        SampleInput {
            sample_id: "S1".to_string(),
            allele_ploidy: None,
            structural_variants: vec![
                sv_record(
                    1,
                    SvType::Del,
                    breakend_record("1", 10_000, 1),
                    Some(breakend_record("1", 20_000, -1)),
                ),
                sv_record(
                    2,
                    SvType::Bnd,
                    breakend_record("2", 1_000_000, 1),
                    Some(breakend_record("5", 500_000, -1)),
                ),
                sv_record(
                    3,
                    SvType::Bnd,
                    breakend_record("5", 502_000, 1),
                    Some(breakend_record("2", 1_050_000, -1)),
                ),
            ],
            depth_segments: vec![
                depth_segment("1", 1, 9999, 2.0),
                depth_segment("1", 10_000, 19_999, 1.0),
                depth_segment("1", 20_000, 200_000, 2.0),
            ],
            assembly_links: vec![AssemblyLink {
                first: BreakendId {
                    sv_id: 2,
                    is_start: false,
                },
                second: BreakendId {
                    sv_id: 3,
                    is_start: true,
                },
            }],
            loh_events: vec![LohEventRecord {
                chromosome: "1".to_string(),
                start: 10_000,
                end: 19_999,
                start_sv_id: Some(1),
                end_sv_id: Some(1),
            }],
            double_minutes: Vec::new(),
        }
    }

    #[test]
    fn test_analyze_sample() {
        let result =
            analyze_sample(&get_test_input(), &get_test_settings(), &RefGenomeArms::grch37()).unwrap();

        assert_eq!(result.sample_id, "S1");
        assert_eq!(result.sv_ploidy.len(), 3);
        assert!(result.sv_ploidy.iter().all(|x| x.ploidy_estimate.valid));
        assert!(result.segment_build_errors.is_empty());

        // The proximity pass clusters the translocations before the DEL gets a cluster of its own
        assert_eq!(result.clusters.len(), 2);
        let synthetic = &result.clusters[0];
        assert_eq!(synthetic.member_sv_ids, vec![2, 3]);
        assert_eq!(
            synthetic.cluster_reasons,
            vec![ClusterReason::Proximity, ClusterReason::Assembly]
        );
        assert_eq!(synthetic.resolved_type, ResolvedType::Del);
        assert_eq!(synthetic.synthetic_length, Some(50_000));

        for sv_ploidy in result.sv_ploidy.iter() {
            assert!(sv_ploidy.start_copy_number.is_some());
            assert!(sv_ploidy.end_copy_number.is_some());
        }
        assert_eq!(result.sv_ploidy[2].cluster_id, synthetic.id);
        assert_eq!(result.sv_ploidy[2].replication_multiple, 1);

        let del_cluster = &result.clusters[1];
        assert_eq!(del_cluster.member_sv_ids, vec![1]);
        assert_eq!(del_cluster.resolved_type, ResolvedType::Del);
        assert!(del_cluster.is_resolved);
        assert_eq!(del_cluster.loh_events.len(), 1);
        assert_eq!(result.sv_ploidy[0].cluster_id, del_cluster.id);

        for (chromosome, segments) in result.collapsed_copy_number_segments.iter() {
            assert!(segments.len() < result.copy_number_segments[chromosome].len());
        }

        for segments in result.copy_number_segments.values() {
            assert!(segments.windows(2).all(|x| x[0].end + 1 == x[1].start));
            assert!(segments.iter().all(|x| x.copy_number >= 0.0));
        }
    }

    #[test]
    fn test_unknown_chromosome() {
        let mut sample_input = get_test_input();
        sample_input.structural_variants[0].start.chromosome = "MT".to_string();
        let result = analyze_sample(&sample_input, &get_test_settings(), &RefGenomeArms::grch37());
        assert!(result.is_err());
    }

    #[test]
    fn test_segment_build_failure() {
        let mut sample_input = get_test_input();
        sample_input.structural_variants.push(sv_record(
            4,
            SvType::Sgl,
            breakend_record("3", 1000, -1),
            None,
        ));
        let mut loss = sv_record(5, SvType::Sgl, breakend_record("3", 2000, 1), None);
        loss.ploidy = 4.0;
        sample_input.structural_variants.push(loss);
        let mut gain = sv_record(6, SvType::Sgl, breakend_record("3", 3000, -1), None);
        gain.ploidy = 4.0;
        sample_input.structural_variants.push(gain);
        sample_input.double_minutes.push(vec![2, 3]);

        // The baseline and the first gain can't support the loss which precedes the second gain
        let result =
            analyze_sample(&sample_input, &get_test_settings(), &RefGenomeArms::grch37()).unwrap();
        assert_eq!(result.segment_build_errors.len(), 1);
        assert!(!result.copy_number_segments.contains_key("3"));
        assert!(result.copy_number_segments.contains_key("1"));
        assert!(result.diagnostics.iter().any(|x| matches!(
            x,
            Diagnostic::SegmentBuildFailure { chromosome, .. } if chromosome == "3"
        )));

        let dm_cluster = result
            .clusters
            .iter()
            .find(|x| x.member_sv_ids.contains(&2))
            .unwrap();
        assert_eq!(dm_cluster.double_minute_svs, vec![2, 3]);
        assert_eq!(dm_cluster.annotations, vec![DOUBLE_MINUTE_ANNOTATION.to_string()]);

        let mut settings = get_test_settings();
        settings.abort_on_invalid_copy_number = true;
        assert!(analyze_sample(&sample_input, &settings, &RefGenomeArms::grch37()).is_err());
    }
}
