//! Derive the ploidy estimator inputs for each SV from the depth segments bracketing its breakends
//!

use std::collections::HashMap;

use log::debug;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::ploidy_estimator::{
    CopyNumberSideObservation, PloidyEstimate, SvPloidyObservations, estimate_ploidy,
};
use crate::sample_input::DepthSegmentRecord;
use crate::structural_variant::{Breakend, StructuralVariant, SvId, SvType};

/// Depth segments grouped by chromosome and sorted by start position
pub struct DepthSegmentIndex<'a> {
    chrom_segments: HashMap<&'a str, Vec<&'a DepthSegmentRecord>>,
}

impl<'a> DepthSegmentIndex<'a> {
    pub fn new(depth_segments: &'a [DepthSegmentRecord]) -> Self {
        let mut chrom_segments: HashMap<&str, Vec<_>> = HashMap::new();
        for segment in depth_segments.iter() {
            chrom_segments
                .entry(segment.chromosome.as_str())
                .or_default()
                .push(segment);
        }
        for segments in chrom_segments.values_mut() {
            segments.sort_by_key(|x| x.start);
        }
        Self { chrom_segments }
    }

    /// Index of the segment containing `position` in the sorted chromosome segment list
    fn find_index(&self, chromosome: &str, position: i64) -> Option<usize> {
        let segments = self.chrom_segments.get(chromosome)?;
        let index = segments.partition_point(|x| x.start <= position);
        if index == 0 {
            return None;
        }
        let index = index - 1;
        if segments[index].contains(position) {
            Some(index)
        } else {
            None
        }
    }

    fn get(&self, chromosome: &str, index: usize) -> &'a DepthSegmentRecord {
        self.chrom_segments[chromosome][index]
    }
}

/// The depth segments immediately before and after one breakend
#[derive(Clone, Copy)]
struct BracketingSegments<'a> {
    before: &'a DepthSegmentRecord,
    after: &'a DepthSegmentRecord,
    after_index: usize,
}

fn get_bracketing_segments<'a>(
    index: &DepthSegmentIndex<'a>,
    breakend: &Breakend,
) -> Option<BracketingSegments<'a>> {
    let before_index = index.find_index(&breakend.chromosome, breakend.position - 1)?;
    let after_index = index.find_index(&breakend.chromosome, breakend.position)?;
    Some(BracketingSegments {
        before: index.get(&breakend.chromosome, before_index),
        after: index.get(&breakend.chromosome, after_index),
        after_index,
    })
}

fn get_side_observation(
    breakend: &Breakend,
    segments: &BracketingSegments,
) -> CopyNumberSideObservation {
    CopyNumberSideObservation {
        copy_number_change: breakend.adjusted_copy_number_change,
        max_copy_number: segments.before.copy_number.max(segments.after.copy_number),
        depth_window_counts: [
            segments.before.depth_window_count,
            segments.after.depth_window_count,
        ],
    }
}

/// Gather all ploidy evidence for one SV
///
/// For a foldback inversion, where both breakends bound the same short inner segment, the breakend
/// copy number changes are unreliable. If the outer segments have more depth support than the
/// inner one, both sides instead use half the copy number change across the whole region, with the
/// outer segment depth window counts.
///
pub fn get_sv_ploidy_observations(
    sv: &StructuralVariant,
    depth_index: &DepthSegmentIndex,
) -> SvPloidyObservations {
    let start_segments = get_bracketing_segments(depth_index, &sv.start);
    let end_segments = sv
        .end
        .as_ref()
        .and_then(|x| get_bracketing_segments(depth_index, x).map(|s| (x, s)));

    let mut start = start_segments.map(|s| get_side_observation(&sv.start, &s));
    let mut end = end_segments.map(|(x, s)| get_side_observation(x, &s));

    if sv.sv_type == SvType::Inv
        && let (Some(ss), Some((end_breakend, es))) = (start_segments, end_segments)
        && end_breakend.chromosome == sv.start.chromosome
        && depth_index.find_index(&end_breakend.chromosome, end_breakend.position - 1)
            == Some(ss.after_index)
    {
        let inner_dwc = ss.after.depth_window_count;
        if ss.before.depth_window_count > inner_dwc && es.after.depth_window_count > inner_dwc {
            let cn_change = (ss.before.copy_number - es.after.copy_number).abs() * 0.5;
            if let Some(x) = start.as_mut() {
                x.copy_number_change = cn_change;
                x.depth_window_counts[1] = x.depth_window_counts[0];
            }
            if let Some(x) = end.as_mut() {
                x.copy_number_change = cn_change;
                x.depth_window_counts[0] = x.depth_window_counts[1];
            }
        }
    }

    SvPloidyObservations {
        start,
        end,
        tumor_variant_read_count: sv.start.tumor_variant_fragment_count,
        ploidy: sv.ploidy,
    }
}

/// Estimate the ploidy of every SV in a sample
///
/// Invalid estimates are kept in the output so that downstream steps can fall back to the
/// upstream ploidy.
///
pub fn estimate_sample_ploidy(
    svs: &[StructuralVariant],
    depth_segments: &[DepthSegmentRecord],
    diagnostics: &mut Diagnostics,
) -> Vec<(SvId, PloidyEstimate)> {
    let depth_index = DepthSegmentIndex::new(depth_segments);

    svs.iter()
        .map(|sv| {
            let observations = get_sv_ploidy_observations(sv, &depth_index);
            let estimate = estimate_ploidy(&observations, diagnostics);
            if !estimate.valid {
                diagnostics.push(Diagnostic::InvalidPloidyEstimate {
                    sv_id: sv.id,
                    estimate: estimate.estimate,
                    uncertainty: estimate.uncertainty,
                });
            } else {
                debug!(
                    "SV {} ploidy estimate {:.3} uncertainty {:.3}",
                    sv.id, estimate.estimate, estimate.uncertainty
                );
            }
            (sv.id, estimate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_ulps_eq;

    use super::*;
    use crate::structural_variant::test_utils::*;

    fn depth_segment(start: i64, end: i64, copy_number: f64, dwc: u32) -> DepthSegmentRecord {
        DepthSegmentRecord {
            chromosome: "1".to_string(),
            start,
            end,
            copy_number,
            depth_window_count: dwc,
        }
    }

    #[test]
    fn test_side_observations() {
        let segments = vec![
            depth_segment(5000, 100_000, 2.0, 40),
            depth_segment(1, 999, 2.0, 10),
            depth_segment(1000, 4999, 1.0, 5),
        ];
        let index = DepthSegmentIndex::new(&segments);

        let mut sv = create_del(1, "1", 1000, 5000);
        sv.start.adjusted_copy_number_change = 0.9;
        sv.end.as_mut().unwrap().adjusted_copy_number_change = 1.1;

        let obs = get_sv_ploidy_observations(&sv, &index);
        let start = obs.start.unwrap();
        assert_eq!(start.copy_number_change, 0.9);
        assert_eq!(start.max_copy_number, 2.0);
        assert_eq!(start.depth_window_counts, [10, 5]);

        let end = obs.end.unwrap();
        assert_eq!(end.copy_number_change, 1.1);
        assert_eq!(end.depth_window_counts, [5, 40]);
        assert_eq!(obs.tumor_variant_read_count, 10);
    }

    #[test]
    fn test_missing_side() {
        let segments = vec![depth_segment(1, 999, 2.0, 10)];
        let index = DepthSegmentIndex::new(&segments);

        // The start breakend is the first base of the chromosome, so there is no prior segment
        let sv = create_del(1, "1", 1, 500);
        let obs = get_sv_ploidy_observations(&sv, &index);
        assert!(obs.start.is_none());
        assert!(obs.end.is_some());

        let sgl = create_sgl(2, "1", 500, 1);
        let obs = get_sv_ploidy_observations(&sgl, &index);
        assert!(obs.start.is_some());
        assert!(obs.end.is_none());
    }

    #[test]
    fn test_foldback_observations() {
        let segments = vec![
            depth_segment(1, 999, 3.0, 50),
            depth_segment(1000, 1099, 4.0, 2),
            depth_segment(1100, 10_000, 2.0, 60),
        ];
        let index = DepthSegmentIndex::new(&segments);

        let sv = create_inv(1, "1", 1000, 1100, -1);
        let obs = get_sv_ploidy_observations(&sv, &index);

        let start = obs.start.unwrap();
        let end = obs.end.unwrap();
        assert_ulps_eq!(start.copy_number_change, 0.5);
        assert_ulps_eq!(end.copy_number_change, 0.5);
        assert_eq!(start.depth_window_counts, [50, 50]);
        assert_eq!(end.depth_window_counts, [60, 60]);
    }

    #[test]
    fn test_estimate_sample_ploidy() {
        let segments = vec![
            depth_segment(1, 999, 2.0, 100),
            depth_segment(1000, 4999, 1.0, 100),
            depth_segment(5000, 100_000, 2.0, 100),
        ];
        let mut del = create_del(1, "1", 1000, 5000);
        del.start.tumor_variant_fragment_count = 20;

        // No depth segments and no reads give no observations
        let mut sgl = create_sgl(2, "5", 500, 1);
        sgl.start.tumor_variant_fragment_count = 0;

        let mut diagnostics = Diagnostics::default();
        let estimates = estimate_sample_ploidy(&[del, sgl], &segments, &mut diagnostics);

        assert_eq!(estimates.len(), 2);
        assert!(estimates[0].1.valid);
        assert!(!estimates[1].1.valid);
        assert_eq!(
            diagnostics.data,
            vec![Diagnostic::InvalidPloidyEstimate {
                sv_id: 2,
                estimate: 0.0,
                uncertainty: 0.0
            }]
        );
    }
}
