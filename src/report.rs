#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use typed_builder::TypedBuilder;

use crate::submission::Submission;

/// Closing line of a load error report.
const LOAD_ERROR_NOTICE: &str = "Error will impact grade";

/// Extra width given to every bar, so even the longest line gets a border.
const BAR_MARGIN: usize = 4;

/// Computed outcome for one submission.
///
/// Either `load_error` is set and everything else is empty, or the submission
/// loaded and `final_score` was computed from whichever outcome maps the
/// grader defines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreResult {
    /// Output of the grader's scorer, `None` when nothing was scored.
    final_score:              Option<f64>,
    /// Correctness per question, `None` when the grader has no answer key.
    multiple_choice_outcomes: Option<BTreeMap<u32, bool>>,
    /// Correctness per required function, `None` when the grader has no tests.
    function_outcomes:        Option<BTreeMap<String, bool>>,
    /// Load failure text.
    load_error:               Option<String>,
}

impl ScoreResult {
    /// A submission that failed to load.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            load_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A submission that loaded, graded by a grader with nothing to grade.
    pub fn ungradable() -> Self {
        Self::default()
    }

    /// A scored submission.
    pub fn graded(
        final_score: f64,
        multiple_choice_outcomes: Option<BTreeMap<u32, bool>>,
        function_outcomes: Option<BTreeMap<String, bool>>,
    ) -> Self {
        Self {
            final_score: Some(final_score),
            multiple_choice_outcomes,
            function_outcomes,
            load_error: None,
        }
    }

    /// Final score, if one was computed.
    pub fn final_score(&self) -> Option<f64> {
        self.final_score
    }

    /// Per-question outcomes.
    pub fn multiple_choice_outcomes(&self) -> Option<&BTreeMap<u32, bool>> {
        self.multiple_choice_outcomes.as_ref()
    }

    /// Per-function outcomes.
    pub fn function_outcomes(&self) -> Option<&BTreeMap<String, bool>> {
        self.function_outcomes.as_ref()
    }

    /// Load failure text.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Names of functions that are missing or failed their test.
    pub fn incorrect_functions(&self) -> Vec<&str> {
        self.function_outcomes
            .iter()
            .flatten()
            .filter(|(_, correct)| !**correct)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Numbers of questions answered incorrectly or not at all.
    pub fn incorrect_questions(&self) -> Vec<u32> {
        self.multiple_choice_outcomes
            .iter()
            .flatten()
            .filter(|(_, correct)| !**correct)
            .map(|(number, _)| *number)
            .collect()
    }

    /// True when the submission loaded, was scored, and got everything right.
    pub fn is_fully_correct(&self) -> bool {
        self.load_error.is_none()
            && self.final_score.is_some()
            && self.incorrect_functions().is_empty()
            && self.incorrect_questions().is_empty()
    }
}

/// A [`ScoreResult`] together with who and what it is for. This is what
/// result sinks receive.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct ScoreReport {
    /// Submitter id.
    #[builder(setter(into))]
    submitter_id: String,
    /// Lab number.
    lab_number:   u32,
    /// Path of the submitted file.
    #[builder(setter(into))]
    source_path:  PathBuf,
    /// Scoring outcome.
    #[builder(default)]
    result:       ScoreResult,
}

impl ScoreReport {
    /// Builds the report for a scored submission.
    pub fn for_submission(submission: &Submission, result: ScoreResult) -> Self {
        Self {
            submitter_id: submission.submitter_id().to_string(),
            lab_number: submission.lab_number(),
            source_path: submission.path().to_path_buf(),
            result,
        }
    }

    /// Submitter id.
    pub fn submitter_id(&self) -> &str {
        &self.submitter_id
    }

    /// Lab number.
    pub fn lab_number(&self) -> u32 {
        self.lab_number
    }

    /// Path of the submitted file.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Scoring outcome.
    pub fn result(&self) -> &ScoreResult {
        &self.result
    }

    /// Renders the report, see [`render`].
    pub fn render(&self, short_form: bool) -> String {
        render(self, short_form)
    }
}

/// Formats a score without trailing zeros: `75`, `62.5`, `33.33`.
pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        return format!("{score:.0}");
    }
    let formatted = format!("{score:.2}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Centres `message` between two runs of `-`, aiming for `width` characters
/// in total.
pub fn format_bar(message: &str, width: usize) -> String {
    let pad = "-".repeat(width.saturating_sub(message.chars().count()) / 2);
    format!("{pad}{message}{pad}")
}

/// Width of the longest line across `blocks`.
fn longest_line<'a>(blocks: impl IntoIterator<Item = &'a str>) -> usize {
    blocks
        .into_iter()
        .flat_map(str::lines)
        .map(|line| line.chars().count())
        .max()
        .unwrap_or_default()
}

/// Renders a report for the console or an email body.
///
/// * Load failures render as a bordered block around the error text.
/// * Short form, or a fully correct submission, renders one summary line.
/// * Anything else renders a bordered block listing what was wrong.
pub fn render(report: &ScoreReport, short_form: bool) -> String {
    let result = report.result();

    if let Some(error) = result.load_error() {
        return render_load_error(report.submitter_id(), error);
    }

    if short_form || result.is_fully_correct() {
        return match result.final_score() {
            Some(score) => format!("{} received a {}", report.submitter_id(), format_score(score)),
            None => format!("{} received no grade (no grade calculated)", report.submitter_id()),
        };
    }

    render_incorrect(report.submitter_id(), result)
}

/// Bordered block for a submission that failed to load.
fn render_load_error(submitter_id: &str, error: &str) -> String {
    let title = format!("{submitter_id} lab threw");
    let width = longest_line([title.as_str(), error, LOAD_ERROR_NOTICE]) + BAR_MARGIN;

    format!(
        "{}\n\n{}\n\n{}",
        format_bar(&title, width),
        error,
        format_bar(LOAD_ERROR_NOTICE, width)
    )
}

/// Bordered block listing incorrect functions and questions.
fn render_incorrect(submitter_id: &str, result: &ScoreResult) -> String {
    let mut body = String::new();

    let functions = result.incorrect_functions();
    if !functions.is_empty() {
        body.push_str(&format!("There were {} incorrect functions:\n", functions.len()));
        body.push_str(&functions.iter().map(|f| format!("\t- {f}")).join("\n"));
        body.push('\n');
    }

    let questions = result.incorrect_questions();
    if !questions.is_empty() {
        body.push_str(&format!(
            "There were {} incorrect multiple choice answers:\n",
            questions.len()
        ));
        body.push_str(&questions.iter().map(|q| format!("\t- Question {q}")).join("\n"));
        body.push('\n');
    }

    let footer = match result.final_score() {
        Some(score) => format!("Score is {}", format_score(score)),
        None => "No grade calculated".to_string(),
    };
    let width = longest_line([submitter_id, body.as_str(), footer.as_str()]) + BAR_MARGIN;

    format!(
        "{}\n\n{}\n{}\n",
        format_bar(submitter_id, width),
        body,
        format_bar(&footer, width)
    )
}
