//! Rebuild a copy number profile along each chromosome from SV breakends and their ploidy
//!
//! The profile models one allele unaffected by any SV (the 'other' allele) plus a second allele
//! which carries all SVs on top of an undisrupted baseline ploidy. Walking each chromosome from the
//! P-arm telomere, every breakend changes the copy number by its ploidy, in the direction given by
//! its orientation.
//!

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::copy_number_segment::{
    BreakendCopyNumber, ChromosomeSegments, CopyNumberProfile, CopyNumberSegment, SegmentSupport,
};
use crate::ref_genome_arms::{ChromosomeArm, ChromosomeArmBounds, RefGenomeArms};
use crate::structural_variant::{Breakend, BreakendId, StructuralVariant, SvId, SvType};

/// BAF count assigned to every built segment
const BUILT_SEGMENT_BAF_COUNT: u32 = 1;

/// Depth window count assigned to every built segment
const BUILT_SEGMENT_DEPTH_WINDOW_COUNT: u32 = 100;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct AllelePloidyBaseline {
    pub other_allele_ploidy: f64,
    pub undisrupted_allele_ploidy: f64,
}

impl Default for AllelePloidyBaseline {
    fn default() -> Self {
        Self {
            other_allele_ploidy: 1.0,
            undisrupted_allele_ploidy: 0.0,
        }
    }
}

impl AllelePloidyBaseline {
    /// True if both allele ploidies are finite and non-negative
    pub fn is_valid(&self) -> bool {
        [self.other_allele_ploidy, self.undisrupted_allele_ploidy]
            .iter()
            .all(|x| x.is_finite() && *x >= 0.0)
    }

    fn actual_baf(&self, copy_number: f64) -> f64 {
        if copy_number == 0.0 {
            0.0
        } else {
            (copy_number - self.other_allele_ploidy).max(0.0) / copy_number
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SegmentBuildError {
    #[error(
        "Negative copy number {copy_number} on chromosome '{chromosome}' at breakend position {position} of SV {sv_id}"
    )]
    NegativeCopyNumber {
        chromosome: String,
        position: i64,
        sv_id: SvId,
        copy_number: f64,
    },

    #[error("No arm bounds available for chromosome '{chromosome}'")]
    UnknownChromosome { chromosome: String },
}

impl SegmentBuildError {
    pub fn chromosome(&self) -> &str {
        match self {
            SegmentBuildError::NegativeCopyNumber { chromosome, .. } => chromosome,
            SegmentBuildError::UnknownChromosome { chromosome } => chromosome,
        }
    }
}

/// A breakend with the SV values needed for segmentation
struct SegmentBreakend<'a> {
    breakend: &'a Breakend,
    sv_type: SvType,
    ploidy: f64,
}

impl SegmentBreakend<'_> {
    fn id(&self) -> BreakendId {
        self.breakend.id()
    }

    fn support(&self) -> SegmentSupport {
        SegmentSupport::Sv(self.sv_type)
    }

    /// Copy number change moving rightward across the breakend
    fn copy_number_change(&self) -> f64 {
        -self.ploidy * self.breakend.orientation as f64
    }
}

struct ChromosomeSegmentBuilder<'a> {
    chromosome: &'a str,
    baseline: &'a AllelePloidyBaseline,
    segments: ChromosomeSegments,
}

impl ChromosomeSegmentBuilder<'_> {
    fn push(
        &mut self,
        start: i64,
        end: i64,
        copy_number: f64,
        (start_support, end_support): (SegmentSupport, SegmentSupport),
        start_breakend: Option<BreakendId>,
    ) {
        self.segments.push(CopyNumberSegment {
            chromosome: self.chromosome.to_string(),
            start,
            end,
            copy_number,
            start_support,
            end_support,
            baf_count: BUILT_SEGMENT_BAF_COUNT,
            actual_baf: self.baseline.actual_baf(copy_number),
            depth_window_count: BUILT_SEGMENT_DEPTH_WINDOW_COUNT,
            start_breakend,
        });
    }

    fn check_copy_number(
        &self,
        breakend: &SegmentBreakend,
        copy_number: f64,
    ) -> Result<(), SegmentBuildError> {
        if copy_number < 0.0 {
            return Err(SegmentBuildError::NegativeCopyNumber {
                chromosome: self.chromosome.to_string(),
                position: breakend.breakend.position,
                sv_id: breakend.breakend.sv_id,
                copy_number,
            });
        }
        Ok(())
    }
}

/// Build the copy number segments of one chromosome
///
/// # Arguments
/// * `breakends` - All breakends on the chromosome, sorted by position. Must not be empty.
///
/// Returns the segments and the copy number at each breakend.
///
fn build_chromosome_segments(
    chromosome: &str,
    breakends: &[SegmentBreakend],
    bounds: &ChromosomeArmBounds,
    baseline: &AllelePloidyBaseline,
) -> Result<(ChromosomeSegments, Vec<(BreakendId, BreakendCopyNumber)>), SegmentBuildError> {
    assert!(!breakends.is_empty());

    let centromere = bounds.centromere;
    let mut builder = ChromosomeSegmentBuilder {
        chromosome,
        baseline,
        segments: ChromosomeSegments::default(),
    };
    let mut breakend_copy_numbers = Vec::new();

    // Net SV ploidy out to the P-arm telomere gives the starting copy number
    let net_sv_ploidy = breakends
        .iter()
        .map(|x| x.ploidy * x.breakend.orientation as f64)
        .sum::<f64>()
        .max(0.0);
    let mut copy_number =
        baseline.other_allele_ploidy + baseline.undisrupted_allele_ploidy + net_sv_ploidy;

    let first = &breakends[0];
    let first_change = first.copy_number_change();
    let starts_with_dup = first.sv_type == SvType::Dup
        && breakends
            .get(1)
            .is_some_and(|x| x.breakend.sv_id == first.breakend.sv_id);
    if starts_with_dup {
        // A leading DUP is not treated as a copy number drop at the first breakend
        copy_number += first_change;
    } else {
        copy_number += (-first_change).max(0.0);
    }
    builder.check_copy_number(first, copy_number)?;

    if first.breakend.arm == ChromosomeArm::Q {
        builder.push(
            1,
            centromere - 1,
            copy_number,
            (SegmentSupport::Telomere, SegmentSupport::Centromere),
            None,
        );
        builder.push(
            centromere,
            first.breakend.position - 1,
            copy_number,
            (SegmentSupport::Centromere, first.support()),
            None,
        );
    } else {
        builder.push(
            1,
            first.breakend.position - 1,
            copy_number,
            (SegmentSupport::Telomere, first.support()),
            None,
        );
    }

    for (index, breakend) in breakends.iter().enumerate() {
        copy_number += breakend.copy_number_change();
        builder.check_copy_number(breakend, copy_number)?;

        let segment_index = builder.segments.len();
        let position = breakend.breakend.position;
        let is_p_arm = breakend.breakend.arm == ChromosomeArm::P;

        match breakends.get(index + 1) {
            Some(next) => {
                if is_p_arm && next.breakend.arm == ChromosomeArm::Q {
                    builder.push(
                        position,
                        centromere - 1,
                        copy_number,
                        (breakend.support(), SegmentSupport::Centromere),
                        Some(breakend.id()),
                    );
                    builder.push(
                        centromere,
                        next.breakend.position - 1,
                        copy_number,
                        (SegmentSupport::Centromere, next.support()),
                        None,
                    );
                } else {
                    builder.push(
                        position,
                        next.breakend.position - 1,
                        copy_number,
                        (breakend.support(), next.support()),
                        Some(breakend.id()),
                    );
                }
            }
            None => {
                if is_p_arm {
                    builder.push(
                        position,
                        centromere - 1,
                        copy_number,
                        (breakend.support(), SegmentSupport::Centromere),
                        Some(breakend.id()),
                    );
                    builder.push(
                        centromere,
                        bounds.length,
                        copy_number,
                        (SegmentSupport::Centromere, SegmentSupport::Telomere),
                        None,
                    );
                } else {
                    builder.push(
                        position,
                        bounds.length,
                        copy_number,
                        (breakend.support(), SegmentSupport::Telomere),
                        Some(breakend.id()),
                    );
                }
            }
        }

        let breakend_copy_number = if breakend.breakend.orientation == 1 {
            copy_number + breakend.ploidy
        } else {
            copy_number
        };
        breakend_copy_numbers.push((
            breakend.id(),
            BreakendCopyNumber {
                copy_number: breakend_copy_number,
                ploidy: breakend.ploidy,
                segment_index,
            },
        ));
    }

    debug_assert!(builder.segments.is_contiguous());
    Ok((builder.segments, breakend_copy_numbers))
}

/// Result of building the copy number profile for all chromosomes
#[derive(Debug, Default)]
pub struct CopyNumberProfileBuild {
    pub profile: CopyNumberProfile,

    /// Chromosomes which could not be built, these are absent from the profile
    pub errors: Vec<SegmentBuildError>,
}

/// Build a copy number profile from all SV breakends, using each SV's current working ploidy
///
/// A failure on one chromosome leaves that chromosome out of the profile without affecting any
/// other. Each call returns a complete new profile.
///
pub fn build_copy_number_profile(
    svs: &[StructuralVariant],
    baseline: &AllelePloidyBaseline,
    ref_arms: &RefGenomeArms,
) -> CopyNumberProfileBuild {
    let mut chrom_breakends: BTreeMap<&str, Vec<SegmentBreakend>> = BTreeMap::new();
    for sv in svs.iter() {
        for breakend in sv.breakends() {
            chrom_breakends
                .entry(breakend.chromosome.as_str())
                .or_default()
                .push(SegmentBreakend {
                    breakend,
                    sv_type: sv.sv_type,
                    ploidy: sv.ploidy,
                });
        }
    }

    let mut result = CopyNumberProfileBuild::default();
    for (chromosome, mut breakends) in chrom_breakends {
        breakends.sort_by_key(|x| (x.breakend.position, x.breakend.sv_id, !x.breakend.is_start));

        let Some(bounds) = ref_arms.get(chromosome) else {
            result.errors.push(SegmentBuildError::UnknownChromosome {
                chromosome: chromosome.to_string(),
            });
            continue;
        };

        match build_chromosome_segments(chromosome, &breakends, bounds, baseline) {
            Ok((segments, breakend_copy_numbers)) => {
                debug!(
                    "Built {} copy number segments for chromosome '{chromosome}'",
                    segments.len()
                );
                result
                    .profile
                    .chromosomes
                    .insert(chromosome.to_string(), segments);
                result
                    .profile
                    .breakend_copy_numbers
                    .extend(breakend_copy_numbers);
            }
            Err(e) => {
                result.errors.push(e);
            }
        }
    }
    result
}
