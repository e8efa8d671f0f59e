use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use crate::cluster::{ClusteringSettings, DEFAULT_CHAINING_SV_LIMIT};
use crate::copy_number_segment_builder::AllelePloidyBaseline;
use crate::sample_analysis::AnalysisSettings;

pub const SETTINGS_FILENAME: &str = "analyze.settings.json";

#[derive(Args, Deserialize, Serialize)]
pub struct AnalyzeSettings {
    /// Sample input file in json format (required). Can be specified multiple times to analyze
    /// multiple samples.
    ///
    #[arg(long = "input", value_name = "FILE", required = true)]
    pub input_filenames: Vec<Utf8PathBuf>,

    /// Directory for all analysis output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_output"))]
    pub output_dir: Utf8PathBuf,

    /// Ploidy of the allele unaffected by any SV, used as the segmentation baseline for samples
    /// without their own allele ploidy values
    ///
    #[arg(long, default_value_t = 1.0)]
    pub other_allele_ploidy: f64,

    /// Ploidy of the SV-bearing allele which is not disrupted by any SV
    #[arg(long, default_value_t = 0.0)]
    pub undisrupted_allele_ploidy: f64,

    /// Max distance between breakends of different SVs for them to be clustered together
    #[arg(long, value_name = "BASES", default_value_t = 5000)]
    pub proximity_distance: i64,

    /// Upper bound on the total SV replication count within one cluster, 0 selects the default
    /// bound
    ///
    #[arg(long, default_value_t = DEFAULT_CHAINING_SV_LIMIT)]
    pub chaining_sv_limit: u32,

    /// Min length for a DEL or DUP to be treated as long
    #[arg(long, value_name = "BASES", default_value_t = 100_000)]
    pub long_del_dup_length: i64,

    /// Fail a sample if copy number segmentation produces an invalid copy number on any
    /// chromosome, instead of leaving that chromosome out of the sample's copy number segments
    ///
    #[arg(long)]
    pub abort_on_invalid_copy_number: bool,
}

impl AnalyzeSettings {
    pub fn get_analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            allele_ploidy: AllelePloidyBaseline {
                other_allele_ploidy: self.other_allele_ploidy,
                undisrupted_allele_ploidy: self.undisrupted_allele_ploidy,
            },
            clustering: ClusteringSettings {
                proximity_distance: self.proximity_distance,
                chaining_sv_limit: self.chaining_sv_limit,
                long_del_dup_length: self.long_del_dup_length,
            },
            abort_on_invalid_copy_number: self.abort_on_invalid_copy_number,
        }
    }
}

/// Check a required input filename
///
/// Assumes no logger has been configured yet
///
fn check_required_filename(filename: &Utf8Path, label: &str) -> SimpleResult<()> {
    if filename.as_str().is_empty() {
        bail!("Must specify {label} file");
    }
    if !filename.exists() {
        bail!("Can't find specified {label} file: '{filename}'");
    }
    if !filename.is_file() {
        bail!("Specified {label} file path does not appear to be a file: '{filename}'");
    }
    Ok(())
}

pub fn validate_and_fix_analyze_settings(settings: AnalyzeSettings) -> SimpleResult<AnalyzeSettings> {
    for filename in settings.input_filenames.iter() {
        check_required_filename(filename, "sample input")?;
    }

    for (i, filename) in settings.input_filenames.iter().enumerate() {
        if settings.input_filenames[..i].contains(filename) {
            bail!("Sample input file specified more than once: '{filename}'");
        }
    }

    let allele_ploidy = AllelePloidyBaseline {
        other_allele_ploidy: settings.other_allele_ploidy,
        undisrupted_allele_ploidy: settings.undisrupted_allele_ploidy,
    };
    if !allele_ploidy.is_valid() {
        bail!("Allele ploidy arguments must be finite and not negative");
    }

    if settings.proximity_distance < 0 {
        bail!("--proximity-distance argument must not be negative");
    }

    if settings.long_del_dup_length <= 0 {
        bail!("--long-del-dup-length argument must be greater than 0");
    }

    Ok(settings)
}

/// Write analyze settings out in json format
pub fn write_analyze_settings(settings: &AnalyzeSettings) {
    use log::info;

    let filename = settings.output_dir.join(SETTINGS_FILENAME);

    info!("Writing analyze settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create analyze settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_settings() -> AnalyzeSettings {
        AnalyzeSettings {
            input_filenames: Vec::new(),
            output_dir: Utf8PathBuf::from("out"),
            other_allele_ploidy: 1.0,
            undisrupted_allele_ploidy: 0.0,
            proximity_distance: 5000,
            chaining_sv_limit: DEFAULT_CHAINING_SV_LIMIT,
            long_del_dup_length: 100_000,
            abort_on_invalid_copy_number: false,
        }
    }

    #[test]
    fn test_validate_analyze_settings() {
        assert!(validate_and_fix_analyze_settings(get_test_settings()).is_ok());

        let mut settings = get_test_settings();
        settings.other_allele_ploidy = -1.0;
        assert!(validate_and_fix_analyze_settings(settings).is_err());

        let mut settings = get_test_settings();
        settings.other_allele_ploidy = f64::NAN;
        assert!(validate_and_fix_analyze_settings(settings).is_err());

        let mut settings = get_test_settings();
        settings.undisrupted_allele_ploidy = f64::INFINITY;
        assert!(validate_and_fix_analyze_settings(settings).is_err());

        let mut settings = get_test_settings();
        settings.long_del_dup_length = 0;
        assert!(validate_and_fix_analyze_settings(settings).is_err());

        let mut settings = get_test_settings();
        settings.input_filenames.push(Utf8PathBuf::from("missing_sample_input.json"));
        assert!(validate_and_fix_analyze_settings(settings).is_err());
    }

    #[test]
    fn test_get_analysis_settings() {
        let analysis_settings = get_test_settings().get_analysis_settings();
        assert_eq!(analysis_settings.clustering.proximity_distance, 5000);
        assert_eq!(analysis_settings.allele_ploidy.undisrupted_allele_ploidy, 0.0);
        assert!(!analysis_settings.abort_on_invalid_copy_number);
    }
}
