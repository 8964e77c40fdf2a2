//! # gradeo
//!
//! A scriptable lab grader. A grader script declares an answer key, tests for
//! the functions students must write, and a scoring formula; every student
//! script in a labs directory is loaded, scored, and handed to a set of
//! result sinks (console, score table, email, relocation, similarity scan).

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Run configuration
pub mod config;
/// Grader scripts
pub mod grader;
/// Submitter identity from file names
pub mod identity;
/// Script loading
pub mod loader;
/// Score results and their rendering
pub mod report;
/// The scoring engine
pub mod scoring;
/// Result sinks and the dispatcher
pub mod sinks;
/// Student submissions
pub mod submission;

use std::path::Path;

use anyhow::{Context, Result};
use config::{EmailOptions, RunOptions};
use grader::GraderDefinition;
use loader::Loader;
use report::ScoreReport;
use scoring::ScoringError;
use sinks::{
    ConsoleSink, CsvSink, DispatchSummary, Dispatcher, EmailSettings, EmailSink, Preferences,
    RelocateSink, SimilaritySink, SinkFailure, SmtpMailer,
};
use submission::{Skipped, scan_submissions};
use tracing::{error, info, warn};

/// A submission the grader's scorer could not score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unscored {
    /// Submitter id.
    pub submitter_id: String,
    /// What went wrong.
    pub error:        ScoringError,
}

/// Outcome of grading a labs directory.
#[derive(Debug, Default)]
pub struct GradeRun {
    /// One report per gradable submission, in file name order.
    pub reports:  Vec<ScoreReport>,
    /// Files that were not graded.
    pub skipped:  Vec<Skipped>,
    /// Submissions that loaded but could not be scored; grade these by hand.
    pub unscored: Vec<Unscored>,
}

/// Loads and scores every submission in `dir` for the grader's lab.
pub fn grade_folder(loader: &Loader, definition: &GraderDefinition, dir: &Path) -> Result<GradeRun> {
    info!("Labs loaded from {}", dir.display());
    let scan = scan_submissions(loader, dir, definition.lab_number())
        .with_context(|| format!("Could not scan {}", dir.display()))?;

    for skipped in &scan.skipped {
        warn!("{skipped}");
    }

    let mut run = GradeRun {
        skipped: scan.skipped,
        ..GradeRun::default()
    };

    for submission in &scan.submissions {
        if submission.load_error().is_some() {
            warn!("{} failed to load", submission.path().display());
        }

        match scoring::score(loader.engine(), definition, submission) {
            Ok(result) => run
                .reports
                .push(ScoreReport::for_submission(submission, result)),
            Err(error) => {
                warn!("Can't grade for {}: {error}. Grade by hand.", submission.submitter_id());
                run.unscored.push(Unscored {
                    submitter_id: submission.submitter_id().to_string(),
                    error,
                });
            }
        }
    }

    Ok(run)
}

/// Builds the sinks `options` ask for, in dispatch order: console, score
/// table, similarity scan, email, relocation.
///
/// A sink that cannot be set up is left out and reported in the returned
/// summary; the others are still built.
pub fn build_dispatcher(
    options: &RunOptions,
    definition: &GraderDefinition,
) -> (Dispatcher, DispatchSummary) {
    let mut dispatcher = Dispatcher::default();
    let mut setup = DispatchSummary::default();

    dispatcher.push(ConsoleSink::stdout(options.short_print, options.overview));

    if options.csv.is_some() {
        dispatcher.push(CsvSink::new(options.csv.clone(), definition.lab_number()));
    }

    if let Some(threshold) = options.similarity_threshold {
        dispatcher.push(SimilaritySink::new(threshold));
    }

    if let Some(email) = &options.email {
        match email_sink(email, definition) {
            Ok(sink) => dispatcher.push(sink),
            Err(e) => {
                error!("Email disabled for this run: {e:#}");
                setup.failed.push(SinkFailure {
                    sink:  "email".to_string(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    if options.move_to.is_some() {
        dispatcher.push(RelocateSink::new(options.move_to.clone()));
    }

    (dispatcher, setup)
}

/// Connects to the relay and reads preferences for the email sink.
fn email_sink(
    email: &EmailOptions,
    definition: &GraderDefinition,
) -> Result<EmailSink<SmtpMailer>> {
    let smtp = email.smtp_settings()?;
    let settings = EmailSettings::builder()
        .course(definition.course())
        .section(definition.section())
        .sender(smtp.username())
        .domain(smtp.domain())
        .default_policy(email.default_policy)
        .preferences(Preferences::load(&email.preferences)?)
        .build();
    let mailer = SmtpMailer::connect(&smtp)?;
    info!("Email enabled, default policy is {}", email.default_policy);
    Ok(EmailSink::new(settings, mailer))
}

/// Grades a labs directory and distributes the results.
///
/// Only a bad grader (or an unreadable labs directory) stops the run; every
/// other failure is contained to the submission or sink it belongs to.
pub fn run(options: &RunOptions) -> Result<(GradeRun, DispatchSummary)> {
    let loader = Loader::new();
    let definition = GraderDefinition::load(&loader, &options.grader)
        .with_context(|| format!("Error loading grader {}", options.grader.display()))?;
    info!(
        "Grader loaded: course {}-{} and lab number {:03}",
        definition.course(),
        definition.section(),
        definition.lab_number()
    );

    let run = grade_folder(&loader, &definition, &options.labs)?;
    let (mut dispatcher, mut summary) = build_dispatcher(options, &definition);

    let dispatched = dispatcher.dispatch(&run.reports);
    let teardown = dispatcher.shutdown();
    summary.succeeded.extend(dispatched.succeeded);
    summary.failed.extend(dispatched.failed);
    summary.failed.extend(teardown.failed);

    Ok((run, summary))
}
