mod analysis_output;
mod analyze;
mod cli;
mod cluster;
mod copy_number_segment;
mod copy_number_segment_builder;
mod diagnostics;
mod globals;
mod logger;
mod os_utils;
mod ploidy_estimator;
mod prob_utils;
mod ref_genome_arms;
mod run_stats;
mod sample_analysis;
mod sample_input;
mod sample_ploidy;
mod structural_variant;

use std::{error, process};

use hhmmss::Hhmmss;
use log::info;

use crate::analyze::run_analyze;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_output_dir_and_logger;

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    let start = std::time::Instant::now();

    run_analyze(&settings.shared, &settings.analyze)?;

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the output directory for the log file:
    setup_output_dir_and_logger(
        settings.get_output_dir(),
        settings.shared.clobber,
        settings.shared.debug,
    );

    if let Err(err) = run(&settings) {
        log::error!("{err}");
        process::exit(2);
    }
}
