#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Student submissions and the labs directory scan.

use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use glob::{Pattern, glob};
use tracing::debug;

use crate::{
    identity::{IdentityError, resolve_path},
    loader::{Implementation, LoadOutcome, Loader, SCRIPT_EXTENSION},
};

/// Case-insensitive prefix of declared multiple choice answers.
pub const QUESTION_PREFIX: &str = "question_";

/// One student's loaded (or failed) lab.
#[derive(Debug)]
pub struct Submission {
    /// Submitter id parsed from the file name.
    submitter_id:     String,
    /// Lab number parsed from the file name.
    lab_number:       u32,
    /// Where the submission was read from.
    path:             PathBuf,
    /// Loaded unit or load failure.
    outcome:          LoadOutcome,
    /// `QUESTION_<n>` answers, derived on first use.
    declared_answers: OnceLock<BTreeMap<u32, String>>,
}

impl Submission {
    /// Wraps an already loaded submission.
    pub fn new(
        submitter_id: impl Into<String>,
        lab_number: u32,
        path: impl Into<PathBuf>,
        outcome: LoadOutcome,
    ) -> Self {
        Self {
            submitter_id: submitter_id.into(),
            lab_number,
            path: path.into(),
            outcome,
            declared_answers: OnceLock::new(),
        }
    }

    /// Checks that `path` is a submission for lab `expected_lab` and loads it.
    /// Files that fail the check are never evaluated.
    pub fn load_for_lab(
        loader: &Loader,
        path: &Path,
        expected_lab: u32,
    ) -> Result<Self, SkipReason> {
        if path.extension().and_then(|ext| ext.to_str()) != Some(SCRIPT_EXTENSION) {
            return Err(SkipReason::NotASubmission);
        }

        let identity = resolve_path(path)?;
        let lab_number = identity.lab_number.ok_or(SkipReason::NonNumericLab)?;
        if lab_number != expected_lab {
            return Err(SkipReason::LabMismatch {
                found:    lab_number,
                expected: expected_lab,
            });
        }

        Ok(Self::new(identity.submitter_id, lab_number, path, loader.load(path)))
    }

    /// Submitter id.
    pub fn submitter_id(&self) -> &str {
        &self.submitter_id
    }

    /// Lab number the file claims to be for.
    pub fn lab_number(&self) -> u32 {
        self.lab_number
    }

    /// Path of the submitted file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load outcome.
    pub fn outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    /// Load failure text, if the submission did not load.
    pub fn load_error(&self) -> Option<&str> {
        self.outcome.error()
    }

    /// Declared multiple choice answers, lower-cased. Empty when loading
    /// failed.
    pub fn declared_answers(&self) -> &BTreeMap<u32, String> {
        self.declared_answers.get_or_init(|| {
            self.outcome
                .unit()
                .map(|unit| unit.numbered_strings(QUESTION_PREFIX))
                .unwrap_or_default()
        })
    }

    /// A function the submission itself declares.
    pub fn implementation(&self, name: &str) -> Option<Implementation> {
        self.outcome.unit()?.implementation(name)
    }
}

/// Why a file in the labs directory was not graded.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not a script file.
    #[error("bad file in labs directory")]
    NotASubmission,
    /// The file name does not identify a submitter.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// The lab digits are not numeric.
    #[error("lab number in the file name is not numeric")]
    NonNumericLab,
    /// Submitted for a different lab than the grader targets.
    #[error("submission for lab {found} but the grader is for lab {expected}")]
    LabMismatch {
        /// Lab number in the file name.
        found:    u32,
        /// Lab number of the grader.
        expected: u32,
    },
}

/// A file that was left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// Offending file.
    pub path:   PathBuf,
    /// Why it was skipped.
    pub reason: SkipReason,
}

impl Display for Skipped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "skipping {}: {}", self.path.display(), self.reason)
    }
}

/// Result of scanning a labs directory.
#[derive(Debug, Default)]
pub struct Scan {
    /// Submissions for the grader's lab, in file name order.
    pub submissions: Vec<Submission>,
    /// Files that were not graded.
    pub skipped:     Vec<Skipped>,
}

/// Loads every submission for `lab_number` directly inside `dir`.
pub fn scan_submissions(loader: &Loader, dir: &Path, lab_number: u32) -> Result<Scan> {
    let root = dir
        .to_str()
        .context("Could not convert labs directory to string")?;
    let pattern = format!("{}/*", Pattern::escape(root.trim_end_matches('/')));

    let mut scan = Scan::default();
    for path in glob(&pattern)
        .context("Could not create glob")?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
    {
        match Submission::load_for_lab(loader, &path, lab_number) {
            Ok(submission) => {
                debug!("loaded {}", path.display());
                scan.submissions.push(submission);
            }
            Err(reason) => scan.skipped.push(Skipped { path, reason }),
        }
    }

    Ok(scan)
}
