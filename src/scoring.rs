#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::BTreeMap;

use rhai::{Array, Dynamic, Engine, ImmutableString, Map};
use tracing::debug;

use crate::{
    grader::GraderDefinition,
    loader::LoadOutcome,
    report::ScoreResult,
    submission::Submission,
};

/// The grader's own scorer could not produce a score.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    /// The scorer raised an error.
    #[error("scorer failed for {submitter}: {error}")]
    ScorerFailed {
        /// Submitter being scored.
        submitter: String,
        /// Error text.
        error:     String,
    },
    /// The scorer returned something other than a number.
    #[error("scorer returned `{value}` for {submitter}, which is not a number")]
    NonNumericScore {
        /// Submitter being scored.
        submitter: String,
        /// What the scorer returned.
        value:     String,
    },
}

/// Scores `submission` against `definition`.
///
/// Submissions that failed to load are reported as such without running the
/// scorer. A test predicate that errors only fails its own function.
pub fn score(
    engine: &Engine,
    definition: &GraderDefinition,
    submission: &Submission,
) -> Result<ScoreResult, ScoringError> {
    if let LoadOutcome::Failed(error) = submission.outcome() {
        return Ok(ScoreResult::failed(error.clone()));
    }

    if definition.answer_key().is_empty() && definition.test_predicates().is_empty() {
        return Ok(ScoreResult::ungradable());
    }

    let multiple_choice = (!definition.answer_key().is_empty())
        .then(|| grade_multiple_choice(definition, submission));
    let functions = (!definition.test_predicates().is_empty())
        .then(|| grade_functions(engine, definition, submission));

    let multiple_choice_fraction = multiple_choice.as_ref().map_or(0.0, fraction);
    let written_fraction = functions.as_ref().map_or(0.0, fraction);

    let raw = definition
        .run_scorer(engine, multiple_choice_fraction, written_fraction)
        .map_err(|e| ScoringError::ScorerFailed {
            submitter: submission.submitter_id().to_string(),
            error:     e.to_string(),
        })?;
    let final_score = as_number(&raw).ok_or_else(|| ScoringError::NonNumericScore {
        submitter: submission.submitter_id().to_string(),
        value:     raw.to_string(),
    })?;

    Ok(ScoreResult::graded(final_score, multiple_choice, functions))
}

/// Compares declared answers against the key.
fn grade_multiple_choice(
    definition: &GraderDefinition,
    submission: &Submission,
) -> BTreeMap<u32, bool> {
    let declared = submission.declared_answers();
    definition
        .answer_key()
        .iter()
        .map(|(question, expected)| (*question, declared.get(question) == Some(expected)))
        .collect()
}

/// Runs every test predicate against the submission's own functions.
fn grade_functions(
    engine: &Engine,
    definition: &GraderDefinition,
    submission: &Submission,
) -> BTreeMap<String, bool> {
    definition
        .test_predicates()
        .iter()
        .map(|(function, predicate)| {
            let passed = match submission.implementation(function) {
                None => {
                    debug!("{} does not define `{function}`", submission.submitter_id());
                    false
                }
                Some(implementation) => {
                    match definition.run_predicate(engine, predicate, implementation) {
                        Ok(value) => is_truthy(&value),
                        Err(e) => {
                            debug!("`{predicate}` failed for {}: {e}", submission.submitter_id());
                            false
                        }
                    }
                }
            };
            (function.clone(), passed)
        })
        .collect()
}

/// Share of `true` outcomes, `0.0` for an empty map.
fn fraction<K>(outcomes: &BTreeMap<K, bool>) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let correct = outcomes.values().filter(|correct| **correct).count();
    correct as f64 / outcomes.len() as f64
}

/// Reads an integer, float or decimal as `f64`.
fn as_number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
        .or_else(|| {
            value
                .as_decimal()
                .ok()
                .and_then(|d| d.to_string().parse().ok())
        })
}

/// Whether a predicate's return value counts as a pass.
fn is_truthy(value: &Dynamic) -> bool {
    if let Ok(b) = value.as_bool() {
        return b;
    }
    if let Some(n) = as_number(value) {
        return n != 0.0;
    }
    if value.is_unit() {
        return false;
    }
    if let Some(s) = value.clone().try_cast::<ImmutableString>() {
        return !s.is_empty();
    }
    if let Some(a) = value.clone().try_cast::<Array>() {
        return !a.is_empty();
    }
    if let Some(m) = value.clone().try_cast::<Map>() {
        return !m.is_empty();
    }
    true
}
