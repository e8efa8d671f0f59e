//! Top-level analyze run over all input samples
//!

use std::collections::HashSet;
use std::sync::mpsc::channel;

use camino::Utf8Path;
use hhmmss::Hhmmss;
use log::{error, info};
use simple_error::{SimpleResult, bail};

use crate::analysis_output::{write_copy_number_segment_file, write_sample_analysis};
use crate::cli::{AnalyzeSettings, SharedSettings, write_analyze_settings};
use crate::ref_genome_arms::RefGenomeArms;
use crate::run_stats::{RunStats, SampleRunStats, write_run_stats};
use crate::sample_analysis::{AnalysisSettings, SampleAnalysis, analyze_sample};
use crate::sample_input::read_sample_input;

struct SampleResult {
    sample_index: usize,
    result: SimpleResult<(SampleAnalysis, f64)>,
}

fn read_and_analyze_sample(
    input_filename: &Utf8Path,
    settings: &AnalysisSettings,
    ref_arms: &RefGenomeArms,
) -> SimpleResult<(SampleAnalysis, f64)> {
    let start = std::time::Instant::now();
    let sample_input = read_sample_input(input_filename)?;
    let analysis = analyze_sample(&sample_input, settings, ref_arms)?;

    info!(
        "Finished analyzing sample '{}' in {}",
        analysis.sample_id,
        start.elapsed().hhmmssxxx()
    );
    Ok((analysis, start.elapsed().as_secs_f64()))
}

/// Analyze all samples in parallel, returning results in input order
fn analyze_all_samples(
    shared_settings: &SharedSettings,
    settings: &AnalyzeSettings,
    ref_arms: &RefGenomeArms,
) -> Vec<SampleResult> {
    info!(
        "Analyzing {} samples",
        settings.input_filenames.len()
    );

    let analysis_settings = settings.get_analysis_settings();
    let analysis_settings = &analysis_settings;

    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shared_settings.thread_count)
        .build()
        .unwrap();

    let (tx, rx) = channel();

    worker_pool.scope(move |scope| {
        for (sample_index, input_filename) in settings.input_filenames.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = read_and_analyze_sample(input_filename, analysis_settings, ref_arms);
                tx.send(SampleResult {
                    sample_index,
                    result,
                })
                .unwrap();
            });
        }
    });

    let mut sample_results = rx.into_iter().collect::<Vec<_>>();
    sample_results.sort_by_key(|x| x.sample_index);
    sample_results
}

pub fn run_analyze(shared_settings: &SharedSettings, settings: &AnalyzeSettings) -> SimpleResult<()> {
    let start = std::time::Instant::now();

    write_analyze_settings(settings);

    let ref_arms = RefGenomeArms::grch37();
    let sample_results = analyze_all_samples(shared_settings, settings, &ref_arms);

    let mut sample_ids = HashSet::new();
    let mut all_sample_stats = Vec::new();
    let mut failed_sample_count = 0;
    for sample_result in sample_results {
        let input_filename = &settings.input_filenames[sample_result.sample_index];
        let (analysis, analysis_time_secs) = match sample_result.result {
            Ok(x) => x,
            Err(err) => {
                error!("Failed to analyze sample input file '{input_filename}': {err}");
                failed_sample_count += 1;
                continue;
            }
        };

        if !sample_ids.insert(analysis.sample_id.clone()) {
            bail!(
                "Sample id '{}' from input file '{input_filename}' is repeated in another input file",
                analysis.sample_id
            );
        }

        write_sample_analysis(&settings.output_dir, &analysis);
        write_copy_number_segment_file(&settings.output_dir, &analysis);
        all_sample_stats.push(SampleRunStats::new(&analysis, analysis_time_secs));
    }

    let run_stats = RunStats::new(all_sample_stats, start.elapsed().as_secs_f64());
    write_run_stats(&settings.output_dir, &run_stats);

    if failed_sample_count > 0 {
        bail!(
            "Analysis failed for {failed_sample_count} of {} samples",
            settings.input_filenames.len()
        );
    }
    Ok(())
}
