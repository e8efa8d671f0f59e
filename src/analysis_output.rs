//! Write per-sample analysis results
//!

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use unwrap::unwrap;

use crate::copy_number_segment::CopyNumberSegment;
use crate::globals::PROGRAM_NAME;
use crate::sample_analysis::SampleAnalysis;

fn get_sample_filename(output_dir: &Utf8Path, sample_id: &str, suffix: &str) -> Utf8PathBuf {
    output_dir.join(format!("{sample_id}.{PROGRAM_NAME}.{suffix}"))
}

/// Write the full analysis of one sample in json format
pub fn write_sample_analysis(output_dir: &Utf8Path, analysis: &SampleAnalysis) {
    let filename = get_sample_filename(output_dir, &analysis.sample_id, "json");

    info!("Writing sample analysis to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create sample analysis json file: '{filename}'"
    );
    let f = BufWriter::new(f);

    serde_json::to_writer_pretty(f, analysis).unwrap();
}

fn write_segment<W: Write>(f: &mut W, s: &CopyNumberSegment) -> std::io::Result<()> {
    // Zero-length segments only mark a breakend position
    if s.end < s.start {
        return Ok(());
    }
    writeln!(
        f,
        "{}\t{}\t{}\t{:.3}\t{}\t{}",
        s.chromosome,
        s.start - 1,
        s.end,
        s.copy_number,
        s.start_support,
        s.end_support
    )
}

/// Write out a bedgraph-like track of the SV-implied copy number segments of one sample
pub fn write_copy_number_segment_file(output_dir: &Utf8Path, analysis: &SampleAnalysis) {
    let filename = get_sample_filename(output_dir, &analysis.sample_id, "copynum.bedgraph");

    info!("Writing copy number segment track to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create copy number segment track file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    for s in analysis.collapsed_copy_number_segments.values().flatten() {
        unwrap!(
            write_segment(&mut f, s),
            "Unable to write copy number segment track file: '{filename}'"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy_number_segment::SegmentSupport;
    use crate::structural_variant::SvType;

    fn segment(start: i64, end: i64) -> CopyNumberSegment {
        CopyNumberSegment {
            chromosome: "1".to_string(),
            start,
            end,
            copy_number: 2.5,
            start_support: SegmentSupport::Telomere,
            end_support: SegmentSupport::Sv(SvType::Del),
            baf_count: 1,
            actual_baf: 0.6,
            depth_window_count: 100,
            start_breakend: None,
        }
    }

    #[test]
    fn test_write_segment() {
        let mut buffer = Vec::new();
        write_segment(&mut buffer, &segment(1, 999)).unwrap();
        write_segment(&mut buffer, &segment(1000, 999)).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "1\t0\t999\t2.500\tTELOMERE\tDEL\n"
        );
    }

    #[test]
    fn test_sample_filename() {
        let filename = get_sample_filename(Utf8Path::new("out"), "S1", "json");
        assert_eq!(filename, Utf8PathBuf::from("out/S1.svploidy.json"));
    }
}
