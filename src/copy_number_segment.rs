//! Copy number segments implied by SV breakends, stored per chromosome
//!

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::structural_variant::{BreakendId, SvType};

/// What bounds one end of a copy number segment
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentSupport {
    Sv(SvType),
    Telomere,
    Centromere,
}

impl fmt::Display for SegmentSupport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SegmentSupport::Sv(x) => write!(f, "{x}"),
            SegmentSupport::Telomere => write!(f, "TELOMERE"),
            SegmentSupport::Centromere => write!(f, "CENTROMERE"),
        }
    }
}

impl Serialize for SegmentSupport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CopyNumberSegment {
    pub chromosome: String,

    /// 1-based start position
    pub start: i64,

    /// 1-based inclusive end position
    pub end: i64,

    pub copy_number: f64,
    pub start_support: SegmentSupport,
    pub end_support: SegmentSupport,
    pub baf_count: u32,
    pub actual_baf: f64,
    pub depth_window_count: u32,

    /// The breakend at the start of this segment, if it starts at a breakend
    pub start_breakend: Option<BreakendId>,
}

/// Ordered, contiguous copy number segments covering one chromosome
#[derive(Clone, Debug, Default)]
pub struct ChromosomeSegments {
    segments: Vec<CopyNumberSegment>,
}

impl ChromosomeSegments {
    /// Append a segment, which must start immediately after the current last segment
    pub fn push(&mut self, segment: CopyNumberSegment) {
        if let Some(last) = self.segments.last() {
            assert_eq!(
                last.end + 1,
                segment.start,
                "Non-contiguous copy number segment on chromosome '{}'",
                segment.chromosome
            );
        }
        assert!(segment.copy_number >= 0.0);
        self.segments.push(segment);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CopyNumberSegment> {
        self.segments.get(index)
    }

    pub fn segments(&self) -> &[CopyNumberSegment] {
        &self.segments
    }

    pub fn is_contiguous(&self) -> bool {
        self.segments
            .windows(2)
            .all(|x| x[0].end + 1 == x[1].start)
    }

    /// Index of the segment containing `position`
    ///
    /// Zero-length segments, which occur where breakends share a position, are never returned.
    ///
    pub fn find_index(&self, position: i64) -> Option<usize> {
        let index = self.segments.partition_point(|x| x.start <= position);
        if index == 0 {
            return None;
        }
        let index = index - 1;
        if self.segments[index].end >= position {
            Some(index)
        } else {
            None
        }
    }

    /// Merge adjacent segments joined only by a centromere boundary when they share the same copy
    /// number
    ///
    pub fn collapse_centromere_boundaries(&self) -> Vec<CopyNumberSegment> {
        let mut collapsed: Vec<CopyNumberSegment> = Vec::new();
        for segment in self.segments.iter() {
            if let Some(last) = collapsed.last_mut()
                && last.end_support == SegmentSupport::Centromere
                && segment.start_support == SegmentSupport::Centromere
                && last.copy_number == segment.copy_number
            {
                last.end = segment.end;
                last.end_support = segment.end_support;
                continue;
            }
            collapsed.push(segment.clone());
        }
        collapsed
    }
}

/// Copy number at one breakend after SV-implied segmentation
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BreakendCopyNumber {
    /// Copy number on the retained side of the breakend
    pub copy_number: f64,

    pub ploidy: f64,

    /// Index of the segment starting at this breakend
    pub segment_index: usize,
}

/// SV-implied copy number segments for all chromosomes with at least one breakend
#[derive(Clone, Debug, Default)]
pub struct CopyNumberProfile {
    pub chromosomes: BTreeMap<String, ChromosomeSegments>,
    pub breakend_copy_numbers: BTreeMap<BreakendId, BreakendCopyNumber>,
}

impl CopyNumberProfile {
    pub fn get_breakend_copy_number(&self, breakend: &BreakendId) -> Option<&BreakendCopyNumber> {
        self.breakend_copy_numbers.get(breakend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(
        start: i64,
        end: i64,
        copy_number: f64,
        start_support: SegmentSupport,
        end_support: SegmentSupport,
    ) -> CopyNumberSegment {
        CopyNumberSegment {
            chromosome: "1".to_string(),
            start,
            end,
            copy_number,
            start_support,
            end_support,
            baf_count: 1,
            actual_baf: 0.0,
            depth_window_count: 100,
            start_breakend: None,
        }
    }

    #[test]
    fn test_find_index() {
        let mut segments = ChromosomeSegments::default();
        segments.push(segment(1, 99, 2.0, SegmentSupport::Telomere, SegmentSupport::Sv(SvType::Del)));
        segments.push(segment(100, 99, 1.0, SegmentSupport::Sv(SvType::Del), SegmentSupport::Sv(SvType::Del)));
        segments.push(segment(100, 500, 1.0, SegmentSupport::Sv(SvType::Del), SegmentSupport::Telomere));

        assert!(segments.is_contiguous());
        assert_eq!(segments.find_index(0), None);
        assert_eq!(segments.find_index(1), Some(0));
        assert_eq!(segments.find_index(100), Some(2));
        assert_eq!(segments.find_index(500), Some(2));
        assert_eq!(segments.find_index(501), None);
    }

    #[test]
    #[should_panic]
    fn test_non_contiguous_push() {
        let mut segments = ChromosomeSegments::default();
        segments.push(segment(1, 99, 2.0, SegmentSupport::Telomere, SegmentSupport::Telomere));
        segments.push(segment(101, 200, 2.0, SegmentSupport::Telomere, SegmentSupport::Telomere));
    }

    #[test]
    fn test_collapse_centromere_boundaries() {
        let mut segments = ChromosomeSegments::default();
        segments.push(segment(1, 49, 2.0, SegmentSupport::Telomere, SegmentSupport::Centromere));
        segments.push(segment(50, 79, 2.0, SegmentSupport::Centromere, SegmentSupport::Sv(SvType::Bnd)));
        segments.push(segment(80, 89, 3.0, SegmentSupport::Sv(SvType::Bnd), SegmentSupport::Sv(SvType::Bnd)));
        segments.push(segment(90, 100, 2.0, SegmentSupport::Sv(SvType::Bnd), SegmentSupport::Telomere));

        let collapsed = segments.collapse_centromere_boundaries();
        assert_eq!(collapsed.len(), 3);
        assert_eq!((collapsed[0].start, collapsed[0].end), (1, 79));
        assert_eq!(collapsed[0].start_support, SegmentSupport::Telomere);
        assert_eq!(collapsed[0].end_support, SegmentSupport::Sv(SvType::Bnd));

        // Different copy numbers across the centromere are kept apart
        let mut segments = ChromosomeSegments::default();
        segments.push(segment(1, 49, 2.0, SegmentSupport::Telomere, SegmentSupport::Centromere));
        segments.push(segment(50, 100, 1.0, SegmentSupport::Centromere, SegmentSupport::Telomere));
        assert_eq!(segments.collapse_centromere_boundaries().len(), 2);
    }

    #[test]
    fn test_support_display() {
        assert_eq!(SegmentSupport::Sv(SvType::Inv).to_string(), "INV");
        assert_eq!(SegmentSupport::Centromere.to_string(), "CENTROMERE");
        assert_eq!(
            serde_json::to_string(&SegmentSupport::Telomere).unwrap(),
            "\"TELOMERE\""
        );
    }
}
