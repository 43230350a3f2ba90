// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use colorful::Colorful;
use indicatif::{ProgressBar, ProgressStyle};
use std::process;

use stegcheckr::cli::{self, Args};
use stegcheckr::core::Orchestrator;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden || len < 2 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.to_config().context("invalid configuration")?;
    let orchestrator = Orchestrator::new(config).context("failed to start the detection engine")?;

    let files = cli::collect_files(&args.paths, args.recursive);
    if files.is_empty() {
        eprintln!("{}", "No media files found!".red());
        return Ok(cli::EXIT_ERROR);
    }
    if !args.json {
        println!("Found {} file(s)\n", files.len());
    }

    let bar = progress_bar(files.len(), args.json || args.verbose > 0);
    let outcomes = orchestrator.analyze_batch_with(&files, |outcome| {
        bar.set_message(
            outcome
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        bar.inc(1);
    });
    bar.finish_and_clear();

    let mut reports = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(report) => reports.push(report),
            Err(e) => errors.push((outcome.path, e.to_string())),
        }
    }

    if args.json {
        println!("{}", cli::format_json(&reports, &errors).context("failed to serialize reports")?);
    } else {
        for report in &reports {
            println!("{}", cli::format_report(report, args.verbose > 0));
        }
        for (path, error) in &errors {
            println!("{}", cli::format_error(path, error));
        }
        if reports.len() + errors.len() > 1 {
            print!("{}", cli::format_summary(&reports, errors.len()));
        }
    }

    Ok(cli::exit_code(&reports, errors.len()))
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            process::exit(cli::EXIT_ERROR);
        }
    }
}
