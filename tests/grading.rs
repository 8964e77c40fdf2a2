use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use gradeo::{
    grade_folder,
    grader::{DefinitionError, GraderDefinition},
    identity::IdentityError,
    loader::Loader,
    scoring::ScoringError,
    submission::SkipReason,
};
use uuid::Uuid;

fn fixture(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(path)
}

fn temp_labs(files: &[(&str, &str)]) -> PathBuf {
    let root = std::env::temp_dir().join(format!("gradeo-labs-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp labs");
    for (name, contents) in files {
        fs::write(root.join(name), contents).expect("write submission");
    }
    root
}

fn copy_fixture_labs() -> PathBuf {
    let root = temp_labs(&[]);
    for entry in fs::read_dir(fixture("labs")).expect("read fixture labs") {
        let entry = entry.expect("fixture entry");
        fs::copy(entry.path(), root.join(entry.file_name())).expect("copy fixture");
    }
    root
}

fn grader(loader: &Loader, name: &str) -> GraderDefinition {
    GraderDefinition::load(loader, &fixture(&format!("graders/{name}"))).expect("grader loads")
}

#[test]
fn grades_a_labs_folder_end_to_end() {
    let labs = copy_fixture_labs();
    let loader = Loader::new();
    let definition = grader(&loader, "hw001_cs100_h01.rhai");
    assert_eq!(definition.lab_number(), 1);
    assert_eq!(definition.course(), "cs100");
    assert_eq!(definition.section(), "h01");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");

    let ids: Vec<&str> = run.reports.iter().map(|r| r.submitter_id()).collect();
    assert_eq!(ids, vec!["ab123", "jk369", "zz999"]);
    assert!(run.unscored.is_empty());

    let perfect = run.reports[0].result();
    assert_eq!(perfect.final_score(), Some(100.0));
    assert!(perfect.is_fully_correct());
    assert_eq!(run.reports[0].render(false), "ab123 received a 100");

    let partial = run.reports[1].result();
    assert_eq!(partial.final_score(), Some(75.0));
    assert_eq!(
        partial.multiple_choice_outcomes(),
        Some(&BTreeMap::from([(1, true), (2, false)]))
    );
    assert_eq!(
        partial.function_outcomes(),
        Some(&BTreeMap::from([("add_two".to_string(), true)]))
    );
    let long = run.reports[1].render(false);
    assert!(long.contains("There were 1 incorrect multiple choice answers:"), "{long}");
    assert!(long.contains("\t- Question 2"), "{long}");
    assert!(long.contains("Score is 75"), "{long}");
    assert_eq!(run.reports[1].render(true), "jk369 received a 75");

    let broken = run.reports[2].result();
    assert!(broken.load_error().expect("load error").contains("Syntax error"));
    assert_eq!(broken.final_score(), None);
    assert!(run.reports[2].render(false).contains("zz999 lab threw"));

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn files_that_are_not_submissions_for_this_lab_are_skipped() {
    let labs = copy_fixture_labs();
    let loader = Loader::new();
    let definition = grader(&loader, "hw001_cs100_h01.rhai");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");

    let skipped: Vec<(String, &SkipReason)> = run
        .skipped
        .iter()
        .map(|s| {
            let name = s.path.file_name().expect("file name").to_string_lossy();
            (name.into_owned(), &s.reason)
        })
        .collect();
    assert_eq!(skipped.len(), 3);
    assert_eq!(skipped[0].0, "hw001.rhai");
    assert!(matches!(skipped[0].1, SkipReason::Identity(_)));
    assert_eq!(skipped[1].0, "hw002_jk369.rhai");
    assert_eq!(
        skipped[1].1,
        &SkipReason::LabMismatch {
            found:    2,
            expected: 1,
        }
    );
    assert_eq!(skipped[2].0, "notes.txt");
    assert_eq!(skipped[2].1, &SkipReason::NotASubmission);

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn grading_twice_gives_the_same_results() {
    let labs = copy_fixture_labs();
    let loader = Loader::new();
    let definition = grader(&loader, "hw001_cs100_h01.rhai");

    let first = grade_folder(&loader, &definition, &labs).expect("grades");
    let second = grade_folder(&loader, &definition, &labs).expect("grades again");
    assert_eq!(first.reports, second.reports);

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn a_raising_predicate_only_fails_its_own_function() {
    let labs = temp_labs(&[("hw003_jk369.rhai", "fn f(x) { x }\nfn g(x) { x }\n")]);
    let loader = Loader::new();
    let definition = grader(&loader, "hw003_cs100_h01.rhai");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");
    let result = run.reports[0].result();

    assert_eq!(
        result.function_outcomes(),
        Some(&BTreeMap::from([("f".to_string(), true), ("g".to_string(), false)]))
    );
    assert_eq!(result.multiple_choice_outcomes(), None);
    assert_eq!(result.final_score(), Some(50.0));

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn grader_helpers_never_count_as_student_work() {
    let labs = temp_labs(&[
        ("hw004_copied.rhai", "fn add_two(x) { x + 2 }\n"),
        ("hw004_empty.rhai", "let QUESTION_1 = \"a\";\n"),
        ("hw004_wrong.rhai", "fn add_two(x) { x + 3 }\n"),
    ]);
    let loader = Loader::new();
    let definition = grader(&loader, "hw004_cs100_h01.rhai");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");
    let scores: Vec<(&str, Option<f64>)> = run
        .reports
        .iter()
        .map(|r| (r.submitter_id(), r.result().final_score()))
        .collect();

    assert_eq!(scores, vec![
        ("copied", Some(100.0)),
        ("empty", Some(0.0)),
        ("wrong", Some(0.0)),
    ]);

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn a_failing_scorer_leaves_the_submission_for_hand_grading() {
    let labs = temp_labs(&[
        ("hw005_partial.rhai", "let QUESTION_1 = \"b\";\n"),
        ("hw005_right.rhai", "let QUESTION_1 = \"A\";\n"),
    ]);
    let loader = Loader::new();
    let definition = grader(&loader, "hw005_cs100_h01.rhai");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");

    assert_eq!(run.reports.len(), 1);
    assert_eq!(run.reports[0].submitter_id(), "right");
    assert_eq!(run.reports[0].result().final_score(), Some(100.0));

    assert_eq!(run.unscored.len(), 1);
    assert_eq!(run.unscored[0].submitter_id, "partial");
    assert!(matches!(run.unscored[0].error, ScoringError::ScorerFailed { .. }));

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn graders_without_a_scorer_are_rejected() {
    let loader = Loader::new();
    let error = GraderDefinition::load(&loader, &fixture("graders/hw001_cs100_h02.rhai"))
        .expect_err("no scorer");
    assert!(matches!(error, DefinitionError::MissingScorer(_)));
}

#[test]
fn grader_names_must_identify_a_lab() {
    let dir = temp_labs(&[
        ("grader.rhai", "fn scorer(a, b) { 0 }\n"),
        ("hwabc_cs100_h01.rhai", "fn scorer(a, b) { 0 }\n"),
        ("hw001_cs100_h01.rhai", "fn scorer(a, b) { \n"),
    ]);
    let loader = Loader::new();

    assert!(matches!(
        GraderDefinition::load(&loader, &dir.join("grader.rhai")),
        Err(DefinitionError::MalformedName(_))
    ));
    assert!(matches!(
        GraderDefinition::load(&loader, &dir.join("hwabc_cs100_h01.rhai")),
        Err(DefinitionError::NonNumericLab { .. })
    ));
    assert!(matches!(
        GraderDefinition::load(&loader, &dir.join("hw001_cs100_h01.rhai")),
        Err(DefinitionError::LoadFailed { .. })
    ));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn an_empty_labs_folder_grades_nothing() {
    let labs = temp_labs(&[]);
    let loader = Loader::new();
    let definition = grader(&loader, "hw001_cs100_h01.rhai");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");
    assert!(run.reports.is_empty());
    assert!(run.skipped.is_empty());

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn a_grader_with_nothing_to_check_calculates_no_grade() {
    let labs = temp_labs(&[("hw006_jk369.rhai", "let QUESTION_1 = \"a\";\nfn f(x) { x }\n")]);
    let loader = Loader::new();
    let definition = grader(&loader, "hw006_cs100_h01.rhai");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");
    let result = run.reports[0].result();

    assert_eq!(result.final_score(), None);
    assert_eq!(result.multiple_choice_outcomes(), None);
    assert_eq!(result.function_outcomes(), None);
    assert!(run.reports[0].render(false).contains("No grade calculated"));

    let _ = fs::remove_dir_all(labs);
}

#[test]
fn unusable_file_names_are_skipped_without_being_loaded() {
    let labs = temp_labs(&[
        ("hwxyz_jk369.rhai", "let QUESTION_1 = \"a\";\n"),
        ("hw001_a,b.rhai", "let QUESTION_1 = \"a\";\n"),
        ("hw001_ok.rhai", "let QUESTION_1 = \"a\";\n"),
    ]);
    let loader = Loader::new();
    let definition = grader(&loader, "hw001_cs100_h01.rhai");

    let run = grade_folder(&loader, &definition, &labs).expect("grades");

    let ids: Vec<&str> = run.reports.iter().map(|r| r.submitter_id()).collect();
    assert_eq!(ids, vec!["ok"]);

    let reasons: Vec<(String, &SkipReason)> = run
        .skipped
        .iter()
        .map(|s| {
            let name = s.path.file_name().expect("file name").to_string_lossy();
            (name.into_owned(), &s.reason)
        })
        .collect();
    assert_eq!(reasons.len(), 2);
    assert_eq!(reasons[0].0, "hw001_a,b.rhai");
    assert!(matches!(
        reasons[0].1,
        SkipReason::Identity(IdentityError::InvalidSubmitter(_))
    ));
    assert_eq!(reasons[1].0, "hwxyz_jk369.rhai");
    assert_eq!(reasons[1].1, &SkipReason::NonNumericLab);

    let _ = fs::remove_dir_all(labs);
}
