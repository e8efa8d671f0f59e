//! Per-sample input records supplied by the upstream calling and segmentation stages
//!

use std::collections::HashSet;
use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, try_with};

use crate::copy_number_segment_builder::AllelePloidyBaseline;
use crate::structural_variant::{BreakendId, SvId, SvType};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BreakendRecord {
    pub chromosome: String,
    pub position: i64,
    pub orientation: i8,

    #[serde(default)]
    pub adjusted_copy_number_change: f64,

    #[serde(default)]
    pub tumor_variant_fragment_count: u32,

    #[serde(default)]
    pub tumor_reference_fragment_count: u32,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SvRecord {
    pub id: SvId,
    pub sv_type: SvType,
    pub start: BreakendRecord,

    /// Absent for single breakend variants
    pub end: Option<BreakendRecord>,

    pub ploidy: f64,

    #[serde(default)]
    pub calculated_ploidy_min: Option<f64>,

    #[serde(default)]
    pub calculated_ploidy_max: Option<f64>,

    #[serde(default)]
    pub is_line_element: bool,
}

/// Copy number segment from the depth segmentation, prior to any SV-derived segmentation
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DepthSegmentRecord {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,

    /// Average tumor copy number over the segment
    pub copy_number: f64,

    pub depth_window_count: u32,
}

impl DepthSegmentRecord {
    pub fn contains(&self, position: i64) -> bool {
        position >= self.start && position <= self.end
    }
}

/// A pair of breakends joined by a local assembly
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct AssemblyLink {
    pub first: BreakendId,
    pub second: BreakendId,
}

/// Loss of heterozygosity region reported by the upstream segmentation
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LohEventRecord {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,

    /// SVs bounding the region, if any
    #[serde(default)]
    pub start_sv_id: Option<SvId>,

    #[serde(default)]
    pub end_sv_id: Option<SvId>,
}

impl LohEventRecord {
    pub fn sv_ids(&self) -> impl Iterator<Item = SvId> {
        self.start_sv_id.into_iter().chain(self.end_sv_id)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SampleInput {
    pub sample_id: String,

    /// Overrides the command-line allele ploidy baseline for this sample
    #[serde(default)]
    pub allele_ploidy: Option<AllelePloidyBaseline>,

    pub structural_variants: Vec<SvRecord>,

    #[serde(default)]
    pub depth_segments: Vec<DepthSegmentRecord>,

    #[serde(default)]
    pub assembly_links: Vec<AssemblyLink>,

    #[serde(default)]
    pub loh_events: Vec<LohEventRecord>,

    /// Groups of SVs identified upstream as forming a double minute
    #[serde(default)]
    pub double_minutes: Vec<Vec<SvId>>,
}

impl SampleInput {
    /// Check record relationships which can't be expressed by deserialization alone
    fn validate(&self) -> SimpleResult<()> {
        if let Some(allele_ploidy) = self.allele_ploidy
            && !allele_ploidy.is_valid()
        {
            bail!(
                "Allele ploidy override must be finite and not negative in sample '{}'",
                self.sample_id
            );
        }

        let mut sv_ids = HashSet::new();
        for sv in self.structural_variants.iter() {
            if !sv_ids.insert(sv.id) {
                bail!("Duplicate SV id {} in sample '{}'", sv.id, self.sample_id);
            }
        }

        for link in self.assembly_links.iter() {
            for breakend in [&link.first, &link.second] {
                if !sv_ids.contains(&breakend.sv_id) {
                    bail!(
                        "Assembly link references unknown SV id {} in sample '{}'",
                        breakend.sv_id,
                        self.sample_id
                    );
                }
            }
            if link.first.sv_id == link.second.sv_id {
                bail!(
                    "Assembly link joins SV {} to itself in sample '{}'",
                    link.first.sv_id,
                    self.sample_id
                );
            }
        }

        let referenced_sv_ids = self
            .loh_events
            .iter()
            .flat_map(|x| x.sv_ids())
            .chain(self.double_minutes.iter().flatten().copied());
        for sv_id in referenced_sv_ids {
            if !sv_ids.contains(&sv_id) {
                bail!(
                    "LOH event or double minute references unknown SV id {sv_id} in sample '{}'",
                    self.sample_id
                );
            }
        }

        for segment in self.depth_segments.iter() {
            if segment.start > segment.end {
                bail!(
                    "Depth segment {}:{}-{} has start after end in sample '{}'",
                    segment.chromosome,
                    segment.start,
                    segment.end,
                    self.sample_id
                );
            }
        }
        Ok(())
    }
}

pub fn read_sample_input(filename: &Utf8Path) -> SimpleResult<SampleInput> {
    use std::io::BufReader;

    info!("Reading sample input from file: '{filename}'");

    let file = try_with!(
        File::open(filename),
        "Unable to open sample input json file: '{filename}'"
    );

    let reader = BufReader::new(file);
    let sample_input: SampleInput = try_with!(
        serde_json::from_reader(reader),
        "Unable to parse sample input from json file: '{filename}'"
    );

    sample_input.validate()?;
    Ok(sample_input)
}
