#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # gradeo
//!
//! Grades a folder of student lab scripts against a grader script.
//!
//! ```text
//! gradeo --grader graders/hw001_cs100_h01.rhai --labs labs/ --csv scores.csv
//! ```
//!
//! Email credentials are read from `GRADEO_SMTP_USERNAME`,
//! `GRADEO_SMTP_PASSWORD` and `GRADEO_EMAIL_DOMAIN` (a `.env` file works
//! too). `GRADEO_SMTP_RELAY` overrides the default relay.

use std::path::PathBuf;

use anyhow::Result;
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use gradeo::{
    config::{DEFAULT_EMAIL_PREFERENCES, DEFAULT_LABS_DIR, EmailOptions, RunOptions},
    sinks::{DispatchPolicy, similarity::DEFAULT_THRESHOLD},
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Debug, Clone)]
struct Cli {
    /// Grader script
    grader:        PathBuf,
    /// Labs directory
    labs:          PathBuf,
    /// Short reports only
    short_print:   bool,
    /// Overview table
    summary:       bool,
    /// Score table
    csv:           Option<PathBuf>,
    /// Finished-labs directory
    move_to:       Option<PathBuf>,
    /// Run the similarity scan
    similarity:    bool,
    /// Similarity threshold
    threshold:     f32,
    /// Send email
    enable_email:  bool,
    /// Email preferences file
    email_pref:    PathBuf,
    /// Default email policy
    email_default: DispatchPolicy,
    /// Debug logging
    verbose:       bool,
}

impl Cli {
    /// Turns parsed arguments into run options.
    fn run_options(&self) -> RunOptions {
        RunOptions {
            grader:               self.grader.clone(),
            labs:                 self.labs.clone(),
            short_print:          self.short_print,
            overview:             self.summary,
            csv:                  self.csv.clone(),
            move_to:              self.move_to.clone(),
            similarity_threshold: self.similarity.then_some(self.threshold),
            email:                self.enable_email.then(|| {
                EmailOptions::builder()
                    .default_policy(self.email_default)
                    .preferences(self.email_pref.clone())
                    .build()
            }),
        }
    }
}

/// Parse the command line arguments
fn options() -> Cli {
    let grader = long("grader")
        .help("Grader script, named hw<NNN>_<course>_<section>.rhai")
        .argument::<PathBuf>("FILE");
    let labs = long("labs")
        .help("Directory of submissions")
        .argument::<PathBuf>("DIR")
        .fallback(PathBuf::from(DEFAULT_LABS_DIR))
        .debug_fallback();
    let short_print = long("short-print")
        .help("Print one line per submission")
        .switch();
    let summary = long("summary")
        .help("Print an overview table after the reports")
        .switch();
    let csv = long("csv")
        .help("Score table to create or update")
        .argument::<PathBuf>("FILE")
        .optional();
    let move_to = long("move-to")
        .help("Move graded files into this directory, if it exists")
        .argument::<PathBuf>("DIR")
        .optional();
    let similarity = long("similarity")
        .help("Flag pairs of submissions that look alike")
        .switch();
    let threshold = long("threshold")
        .help("Similarity ratio at which a pair is flagged")
        .argument::<f32>("RATIO")
        .guard(|t| (0.0..=1.0).contains(t), "threshold must be between 0 and 1")
        .fallback(DEFAULT_THRESHOLD)
        .display_fallback();
    let enable_email = long("enable-email")
        .help("Email reports to submitters")
        .switch();
    let email_pref = long("email-pref")
        .help("Per-submitter email preferences")
        .argument::<PathBuf>("FILE")
        .fallback(PathBuf::from(DEFAULT_EMAIL_PREFERENCES))
        .debug_fallback();
    let email_default = long("email-default")
        .help("NEVER, ALWAYS or INCORRECT, for submitters without a preference")
        .argument::<DispatchPolicy>("POLICY")
        .fallback(DispatchPolicy::Never)
        .display_fallback();
    let verbose = short('v')
        .long("verbose")
        .help("Show debug output, including what submissions print")
        .switch();

    construct!(Cli {
        grader,
        labs,
        short_print,
        summary,
        csv,
        move_to,
        similarity,
        threshold,
        enable_email,
        email_pref,
        email_default,
        verbose,
    })
    .to_options()
    .descr("Lab grader for scripted assignments")
    .run()
}

fn main() -> Result<()> {
    dotenv().ok();
    let cli = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(fmt)
        .with(LevelFilter::from_level(level))
        .init();

    let (run, summary) = gradeo::run(&cli.run_options())?;

    if !run.unscored.is_empty() {
        eprintln!("{}", "Grade these by hand:".yellow().bold());
        for unscored in &run.unscored {
            eprintln!("  {}: {}", unscored.submitter_id, unscored.error);
        }
    }

    for failure in &summary.failed {
        eprintln!("{} {}: {}", "sink failed".red().bold(), failure.sink, failure.error);
    }

    eprintln!(
        "{} graded, {} skipped, {} to grade by hand",
        run.reports.len().to_string().green(),
        run.skipped.len(),
        run.unscored.len()
    );

    Ok(())
}
