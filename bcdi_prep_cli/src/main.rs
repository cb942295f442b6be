//! # bcdi_prep_cli
//!
//! Part of the bcdi_prep crate family.
//!
//! This is the command line application to preprocess BCDI data.
//!
//! ## Install
//!
//! Use `cargo install --path ./bcdi_prep_cli` from the top level repository
//!
//! ## Use
//!
//! Make a template configuration file
//!
//! ```bash
//! bcdi_prep_cli new -p config.yml
//! ```
//!
//! Edit it, then process the scans
//!
//! ```bash
//! bcdi_prep_cli -p config.yml
//! ```
//!
//! One progress bar is shown per worker. Detailed logs are written to `bcdi_prep.log`.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use libbcdi_prep::config::Config;
use libbcdi_prep::error::ConfigError;
use libbcdi_prep::process::{create_subsets, process_subset};
use libbcdi_prep::worker_status::WorkerStatus;

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Log to a file as well as to the terminal. Returns a logger writing only to the file,
/// used while the progress bars own the terminal.
fn init_logger() -> Result<Arc<spdlog::Logger>, spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./bcdi_prep.log"))
            .formatter(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            ))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sinks(spdlog::default_logger().sinks().iter().cloned())
            .sink(file_sink.clone())
            .build()?,
    );
    let file_logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(file_logger)
}

fn main() {
    // Create a cli
    let matches = Command::new("bcdi_prep_cli")
        .about("Preprocess BCDI detector frames for phase retrieval")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    let file_logger = match init_logger() {
        Ok(logger) => Some(logger),
        Err(e) => {
            eprintln!("Could not create the log file: {e}");
            None
        }
    };

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            spdlog::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => spdlog::info!("Done."),
            Err(e) => spdlog::error!("Could not write the template config: {e}"),
        }
        return;
    }

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Root folder: {}", config.root_folder.to_string_lossy());
    spdlog::info!("Scans: {:?}", config.scans);
    spdlog::info!("Detector: {} ROI: {:?}", config.detector.name, config.detector.roi);
    spdlog::info!("Center FFT: {:?}", config.center_fft);
    spdlog::info!("Number of workers: {}", config.n_threads);

    // Terminal output would tear the bars, log to the file until they are done
    let terminal_logger = spdlog::default_logger();
    if let Some(logger) = file_logger {
        spdlog::set_default_logger(logger);
    }

    // Setup the progress bars and spawn a worker per non-empty subset
    let pb_manager = MultiProgress::new();
    let style = ProgressStyle::with_template("[worker {prefix}] {bar:40.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut bars = HashMap::new();
    let mut handles = Vec::new();
    for (worker_id, subset) in create_subsets(&config).into_iter().enumerate() {
        if subset.is_empty() {
            continue;
        }
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(style.clone());
        bar.set_prefix(worker_id.to_string());
        bars.insert(worker_id, bar);

        let worker_config = config.clone();
        let worker_tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            process_subset(worker_config, worker_tx, worker_id, subset)
        }));
    }
    // Workers hold the remaining senders, the loop ends when all of them are done
    drop(tx);

    for status in rx.iter() {
        if let Some(bar) = bars.get(&status.worker_id) {
            bar.set_position((status.progress * 100.0) as u64);
            bar.set_message(format!("scan {} - {}", status.scan_number, status.stage));
        }
    }
    for bar in bars.values() {
        bar.finish();
    }
    spdlog::set_default_logger(terminal_logger);

    for handle in handles {
        match handle.join() {
            Ok(result) => match result {
                Ok(_) => spdlog::info!("Successfully preprocessed data!"),
                Err(e) => spdlog::error!("Preprocessing failed with error: {e}"),
            },
            Err(_) => spdlog::error!("Failed to join preprocessing task!"),
        }
    }

    spdlog::info!("Done.");
}
