use std::fmt;

use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

use crate::ploidy_estimator::PloidyEstimate;
use crate::ref_genome_arms::{ChromosomeArm, RefGenomeArms};
use crate::sample_input::{BreakendRecord, SvRecord};

pub type SvId = u32;

/// Copy number change below which a breakend is considered weakly supported by the depth data
pub const LOW_CN_CHANGE_SUPPORT: f64 = 0.5;

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SvType {
    Del,
    Dup,
    Inv,
    Bnd,
    Ins,
    Sgl,
}

/// Identifies one side of an SV
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BreakendId {
    pub sv_id: SvId,
    pub is_start: bool,
}

/// One end of a structural variant
///
/// Orientation follows the usual breakend convention: +1 means the sequence to the left of the
/// breakend is retained, so copy number drops by the SV ploidy moving rightward across it.
///
#[derive(Clone, PartialEq)]
pub struct Breakend {
    pub sv_id: SvId,
    pub is_start: bool,
    pub chromosome: String,
    pub position: i64,
    pub orientation: i8,
    pub arm: ChromosomeArm,

    /// Copy number change across the breakend as fitted by the upstream segmentation
    pub adjusted_copy_number_change: f64,

    pub tumor_variant_fragment_count: u32,
    pub tumor_reference_fragment_count: u32,
}

impl Breakend {
    pub fn id(&self) -> BreakendId {
        BreakendId {
            sv_id: self.sv_id,
            is_start: self.is_start,
        }
    }

    fn from_record(
        sv_id: SvId,
        is_start: bool,
        record: &BreakendRecord,
        ref_arms: &RefGenomeArms,
    ) -> SimpleResult<Self> {
        if record.orientation != 1 && record.orientation != -1 {
            bail!(
                "SV {sv_id} has invalid breakend orientation {}",
                record.orientation
            );
        }
        let Some(bounds) = ref_arms.get(&record.chromosome) else {
            bail!(
                "SV {sv_id} breakend chromosome '{}' has no known arm bounds",
                record.chromosome
            );
        };
        if record.position < 1 || record.position > bounds.length {
            bail!(
                "SV {sv_id} breakend position {}:{} is outside of the chromosome",
                record.chromosome,
                record.position
            );
        }
        Ok(Self {
            sv_id,
            is_start,
            chromosome: record.chromosome.clone(),
            position: record.position,
            orientation: record.orientation,
            arm: bounds.arm(record.position),
            adjusted_copy_number_change: record.adjusted_copy_number_change,
            tumor_variant_fragment_count: record.tumor_variant_fragment_count,
            tumor_reference_fragment_count: record.tumor_reference_fragment_count,
        })
    }
}

impl fmt::Debug for Breakend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Breakend: sv={} {}:{}:{} arm={}",
            self.sv_id,
            if self.is_start { "start" } else { "end" },
            self.chromosome,
            self.position,
            self.arm
        )
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PloidyRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug)]
pub struct StructuralVariant {
    pub id: SvId,
    pub sv_type: SvType,
    pub start: Breakend,

    /// Absent for single breakend variants
    pub end: Option<Breakend>,

    /// Working ploidy, initially the upstream fit and replaced by the fused estimate when valid
    pub ploidy: f64,

    /// Calculated ploidy range, if available
    pub ploidy_range: Option<PloidyRange>,

    /// Set if upstream annotation places either breakend in a LINE element
    pub is_line_element: bool,
}

impl StructuralVariant {
    pub fn from_record(record: &SvRecord, ref_arms: &RefGenomeArms) -> SimpleResult<Self> {
        let start = Breakend::from_record(record.id, true, &record.start, ref_arms)?;
        let end = match &record.end {
            Some(x) => Some(Breakend::from_record(record.id, false, x, ref_arms)?),
            None => None,
        };

        match (record.sv_type, &end) {
            (SvType::Sgl, Some(_)) => {
                bail!("SV {} is a single breakend variant with two breakends", record.id)
            }
            (SvType::Sgl, None) => {}
            (_, None) => bail!("SV {} of type {} has no end breakend", record.id, record.sv_type),
            _ => {}
        }

        let ploidy_range = match (record.calculated_ploidy_min, record.calculated_ploidy_max) {
            (Some(min), Some(max)) => Some(PloidyRange { min, max }),
            _ => None,
        };

        Ok(Self {
            id: record.id,
            sv_type: record.sv_type,
            start,
            end,
            ploidy: record.ploidy,
            ploidy_range,
            is_line_element: record.is_line_element,
        })
    }

    pub fn is_sgl(&self) -> bool {
        self.end.is_none()
    }

    pub fn breakend(&self, is_start: bool) -> Option<&Breakend> {
        if is_start {
            Some(&self.start)
        } else {
            self.end.as_ref()
        }
    }

    pub fn breakends(&self) -> impl Iterator<Item = &Breakend> {
        std::iter::once(&self.start).chain(self.end.iter())
    }

    /// Ploidy rounded to the nearest integer
    pub fn implied_ploidy(&self) -> i32 {
        self.ploidy.round() as i32
    }

    /// Distance between the two breakends, None unless both are on the same chromosome
    pub fn length(&self) -> Option<i64> {
        let end = self.end.as_ref()?;
        if end.chromosome != self.start.chromosome {
            return None;
        }
        Some((end.position - self.start.position).abs())
    }

    /// True if no breakend of the variant shows a meaningful copy number change
    pub fn has_low_cn_change_support(&self) -> bool {
        if self.sv_type == SvType::Ins {
            return false;
        }
        self.breakends()
            .all(|x| x.adjusted_copy_number_change < LOW_CN_CHANGE_SUPPORT)
    }

    /// Sum of the arm-weighted orientations over all breakends
    ///
    /// Any SV which could be traversed from telomere to telomere through the centromere contributes 0
    ///
    pub fn consistency(&self) -> i32 {
        self.breakends()
            .map(|x| x.arm.consistency_sign() * x.orientation as i32)
            .sum()
    }

    /// Replace the working ploidy with a valid fused estimate
    ///
    /// An upstream calculated ploidy range takes priority over the one implied by the estimate
    ///
    pub fn apply_ploidy_estimate(&mut self, estimate: &PloidyEstimate) {
        if !estimate.valid {
            return;
        }
        self.ploidy = estimate.estimate;
        if self.ploidy_range.is_none() {
            self.ploidy_range = Some(PloidyRange {
                min: estimate.estimate - estimate.uncertainty,
                max: estimate.estimate + estimate.uncertainty,
            });
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;

    pub fn breakend(
        sv_id: SvId,
        is_start: bool,
        chromosome: &str,
        position: i64,
        orientation: i8,
        arm: ChromosomeArm,
    ) -> Breakend {
        Breakend {
            sv_id,
            is_start,
            chromosome: chromosome.to_string(),
            position,
            orientation,
            arm,
            adjusted_copy_number_change: 1.0,
            tumor_variant_fragment_count: 10,
            tumor_reference_fragment_count: 10,
        }
    }

    /// Create an SV with both breakends on the P arm of one chromosome
    pub fn create_sv(
        id: SvId,
        sv_type: SvType,
        chromosome: &str,
        (start_pos, start_orient): (i64, i8),
        (end_pos, end_orient): (i64, i8),
        ploidy: f64,
    ) -> StructuralVariant {
        StructuralVariant {
            id,
            sv_type,
            start: breakend(id, true, chromosome, start_pos, start_orient, ChromosomeArm::P),
            end: Some(breakend(id, false, chromosome, end_pos, end_orient, ChromosomeArm::P)),
            ploidy,
            ploidy_range: None,
            is_line_element: false,
        }
    }

    pub fn create_del(id: SvId, chromosome: &str, start: i64, end: i64) -> StructuralVariant {
        create_sv(id, SvType::Del, chromosome, (start, 1), (end, -1), 1.0)
    }

    pub fn create_dup(id: SvId, chromosome: &str, start: i64, end: i64) -> StructuralVariant {
        create_sv(id, SvType::Dup, chromosome, (start, -1), (end, 1), 1.0)
    }

    pub fn create_inv(
        id: SvId,
        chromosome: &str,
        start: i64,
        end: i64,
        orientation: i8,
    ) -> StructuralVariant {
        create_sv(
            id,
            SvType::Inv,
            chromosome,
            (start, orientation),
            (end, orientation),
            1.0,
        )
    }

    pub fn create_bnd(
        id: SvId,
        (chrom1, pos1, orient1): (&str, i64, i8),
        (chrom2, pos2, orient2): (&str, i64, i8),
    ) -> StructuralVariant {
        StructuralVariant {
            id,
            sv_type: SvType::Bnd,
            start: breakend(id, true, chrom1, pos1, orient1, ChromosomeArm::P),
            end: Some(breakend(id, false, chrom2, pos2, orient2, ChromosomeArm::P)),
            ploidy: 1.0,
            ploidy_range: None,
            is_line_element: false,
        }
    }

    pub fn create_sgl(id: SvId, chromosome: &str, position: i64, orientation: i8) -> StructuralVariant {
        StructuralVariant {
            id,
            sv_type: SvType::Sgl,
            start: breakend(id, true, chromosome, position, orientation, ChromosomeArm::P),
            end: None,
            ploidy: 1.0,
            ploidy_range: None,
            is_line_element: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    #[test]
    fn test_consistency() {
        assert_eq!(create_del(1, "1", 100, 200).consistency(), 0);
        assert_eq!(create_dup(1, "1", 100, 200).consistency(), 0);
        assert_eq!(
            create_sv(1, SvType::Ins, "1", (100, 1), (101, -1), 1.0).consistency(),
            0
        );
        assert_eq!(create_inv(1, "1", 100, 200, 1).consistency(), 2);
        assert_eq!(create_bnd(1, ("1", 100, 1), ("2", 100, -1)).consistency(), 0);
        assert_eq!(create_sgl(1, "1", 100, 1).consistency(), 1);

        // Orientation sign flips on the Q arm
        let mut inv = create_inv(1, "1", 100, 200, 1);
        inv.start.arm = ChromosomeArm::Q;
        inv.end.as_mut().unwrap().arm = ChromosomeArm::Q;
        assert_eq!(inv.consistency(), -2);
    }

    #[test]
    fn test_low_cn_change_support() {
        let mut sv = create_del(1, "1", 100, 200);
        assert!(!sv.has_low_cn_change_support());

        sv.start.adjusted_copy_number_change = 0.2;
        assert!(!sv.has_low_cn_change_support());

        sv.end.as_mut().unwrap().adjusted_copy_number_change = 0.3;
        assert!(sv.has_low_cn_change_support());

        sv.sv_type = SvType::Ins;
        assert!(!sv.has_low_cn_change_support());
    }

    #[test]
    fn test_apply_ploidy_estimate() {
        let mut sv = create_del(1, "1", 100, 200);
        sv.apply_ploidy_estimate(&PloidyEstimate::invalid());
        assert_eq!(sv.ploidy, 1.0);
        assert!(sv.ploidy_range.is_none());

        sv.apply_ploidy_estimate(&PloidyEstimate {
            estimate: 2.2,
            uncertainty: 0.5,
            valid: true,
        });
        assert_eq!(sv.implied_ploidy(), 2);
        let range = sv.ploidy_range.unwrap();
        approx::assert_ulps_eq!(range.min, 1.7, max_ulps = 4);
        approx::assert_ulps_eq!(range.max, 2.7, max_ulps = 4);
    }

    #[test]
    fn test_sv_type_strings() {
        use std::str::FromStr;
        assert_eq!(SvType::Dup.to_string(), "DUP");
        assert_eq!(SvType::from_str("BND").unwrap(), SvType::Bnd);
    }
}
