#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grader scripts: answer keys, function tests and the scoring formula.
//!
//! A grader is named `hw<NNN>_<course>_<section>.rhai` and declares:
//!
//! * `ANSWERS_<n>` variables holding the expected multiple choice answers,
//! * `<function>_test(implementation)` functions, each testing the student
//!   function `<function>`,
//! * exactly one `scorer(multiple_choice, written)` function combining the two
//!   fractions of correct answers into a final score.

use std::{collections::BTreeMap, path::Path};

use rhai::{Dynamic, Engine, EvalAltResult};

use crate::loader::{Implementation, LoadOutcome, Loader, Unit};

/// Case-insensitive prefix of answer key variables.
pub const ANSWER_PREFIX: &str = "answers_";

/// Case-insensitive suffix of test predicate functions.
pub const TEST_SUFFIX: &str = "_test";

/// Name of the scoring formula every grader must declare.
pub const SCORER: &str = "scorer";

/// A grader that cannot be used.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The file name does not follow `hw<NNN>_<course>_<section>.<ext>`.
    #[error("grader file name `{0}` is not of the form hw<NNN>_<course>_<section>.<ext>")]
    MalformedName(String),
    /// The lab token in the file name is not numeric.
    #[error("grader lab number cannot be parsed from `{file}`: `{token}` is not a number")]
    NonNumericLab {
        /// File name of the grader.
        file:  String,
        /// The offending token.
        token: String,
    },
    /// The grader script itself failed to load.
    #[error("error loading grader {path}:\n{error}")]
    LoadFailed {
        /// Path of the grader.
        path:  String,
        /// Load failure text.
        error: String,
    },
    /// No `scorer(multiple_choice, written)` function.
    #[error("grader {0} does not declare `fn scorer(multiple_choice, written)`")]
    MissingScorer(String),
}

/// Course, section and lab a grader applies to, parsed from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraderIdentity {
    /// Lab number being graded.
    pub lab_number: u32,
    /// Course token, empty for `hw<NNN>_<section>.<ext>` names.
    pub course:     String,
    /// Section token.
    pub section:    String,
}

/// Parses `hw<NNN>_<course>_<section>.<ext>`.
pub fn resolve_grader(file_name: &str) -> Result<GraderIdentity, DefinitionError> {
    let malformed = || DefinitionError::MalformedName(file_name.to_string());

    let first = file_name.find('_').ok_or_else(malformed)?;
    let last = file_name.rfind('_').ok_or_else(malformed)?;
    let period = file_name
        .rfind('.')
        .filter(|&period| period > last)
        .ok_or_else(malformed)?;

    let token = file_name.get(2..first).unwrap_or_default();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DefinitionError::NonNumericLab {
            file:  file_name.to_string(),
            token: token.to_string(),
        });
    }
    let lab_number = token.parse().map_err(|_| DefinitionError::NonNumericLab {
        file:  file_name.to_string(),
        token: token.to_string(),
    })?;

    let course = if last > first {
        &file_name[first + 1..last]
    } else {
        ""
    };

    Ok(GraderIdentity {
        lab_number,
        course: course.to_string(),
        section: file_name[last + 1..period].to_string(),
    })
}

/// Returns the required student function a test predicate named `name`
/// checks, if `name` is a test predicate at all.
fn required_function(name: &str) -> Option<&str> {
    let lowered = name.to_ascii_lowercase();
    if !lowered.ends_with(TEST_SUFFIX) {
        return None;
    }
    let end = lowered.find(TEST_SUFFIX)?;
    (end > 0).then(|| &name[..end])
}

/// Parsed grading rules for one lab.
#[derive(Debug, Clone)]
pub struct GraderDefinition {
    /// Which course, section and lab this grader targets.
    identity:        GraderIdentity,
    /// The grader script.
    unit:            Unit,
    /// Question number to expected (lower-cased) answer.
    answer_key:      BTreeMap<u32, String>,
    /// Required student function name to the grader function testing it.
    test_predicates: BTreeMap<String, String>,
}

impl GraderDefinition {
    /// Loads and parses the grader at `path`.
    pub fn load(loader: &Loader, path: &Path) -> Result<Self, DefinitionError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DefinitionError::MalformedName(path.display().to_string()))?;
        let identity = resolve_grader(file_name)?;

        match loader.load(path) {
            LoadOutcome::Loaded(unit) => Self::from_unit(identity, unit),
            LoadOutcome::Failed(error) => Err(DefinitionError::LoadFailed {
                path: path.display().to_string(),
                error,
            }),
        }
    }

    /// Extracts the grading rules from an already loaded script.
    pub fn from_unit(identity: GraderIdentity, unit: Unit) -> Result<Self, DefinitionError> {
        if !unit.defines(SCORER, 2) {
            return Err(DefinitionError::MissingScorer(unit.path().display().to_string()));
        }

        let answer_key = unit.numbered_strings(ANSWER_PREFIX);
        let test_predicates = unit
            .functions()
            .filter(|f| f.arity == 1)
            .filter_map(|f| {
                let required = required_function(&f.name)?.to_string();
                Some((required, f.name))
            })
            .collect();

        Ok(Self {
            identity,
            unit,
            answer_key,
            test_predicates,
        })
    }

    /// Lab number this grader targets.
    pub fn lab_number(&self) -> u32 {
        self.identity.lab_number
    }

    /// Course token from the grader's file name.
    pub fn course(&self) -> &str {
        &self.identity.course
    }

    /// Section token from the grader's file name.
    pub fn section(&self) -> &str {
        &self.identity.section
    }

    /// Expected multiple choice answers.
    pub fn answer_key(&self) -> &BTreeMap<u32, String> {
        &self.answer_key
    }

    /// Required student functions mapped to the predicates testing them.
    pub fn test_predicates(&self) -> &BTreeMap<String, String> {
        &self.test_predicates
    }

    /// Runs the predicate `predicate` against a student implementation.
    pub fn run_predicate(
        &self,
        engine: &Engine,
        predicate: &str,
        implementation: Implementation,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        self.unit
            .call(engine, predicate, (Dynamic::from(implementation),))
    }

    /// Runs the scoring formula.
    pub fn run_scorer(
        &self,
        engine: &Engine,
        multiple_choice: f64,
        written: f64,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        self.unit.call(engine, SCORER, (multiple_choice, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grader_names_carry_course_and_section() {
        let identity = resolve_grader("hw011_cs100_h01.rhai").expect("parses");
        assert_eq!(identity, GraderIdentity {
            lab_number: 11,
            course:     "cs100".into(),
            section:    "h01".into(),
        });

        let identity = resolve_grader("hw001_h01.rhai").expect("parses");
        assert_eq!(identity.course, "");
        assert_eq!(identity.section, "h01");
    }

    #[test]
    fn grader_names_need_numeric_labs() {
        assert!(matches!(
            resolve_grader("hwx01_cs100_h01.rhai"),
            Err(DefinitionError::NonNumericLab { .. })
        ));
        assert!(matches!(
            resolve_grader("hw001cs100h01.rhai"),
            Err(DefinitionError::MalformedName(_))
        ));
        assert!(matches!(
            resolve_grader("hw001_cs100_h01"),
            Err(DefinitionError::MalformedName(_))
        ));
    }

    #[test]
    fn test_predicate_names_map_to_required_functions() {
        assert_eq!(required_function("add_two_test"), Some("add_two"));
        assert_eq!(required_function("Add_Two_TEST"), Some("Add_Two"));
        assert_eq!(required_function("_test"), None);
        assert_eq!(required_function("scorer"), None);
        assert_eq!(required_function("test_add_two"), None);
    }
}
