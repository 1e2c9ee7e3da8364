use crmeval_core::{
    read_report_json, write_report_json, CriterionVerdict, EvalError, EvaluationReport,
    TestResult,
};

fn scored(id: &str, category: &str, score: f64) -> TestResult {
    TestResult {
        test_id: id.to_string(),
        category: category.to_string(),
        query: "Які курси доступні для початківців?".to_string(),
        score,
        success: score >= 0.7,
        criterion_verdicts: vec![CriterionVerdict::pass("contains_course_info")],
        elapsed_seconds: 1.25,
        tools_used: vec!["list_courses".to_string()],
        error: None,
        raw_response: "Для початківців є курс Python Basics.".to_string(),
    }
}

fn report() -> EvaluationReport {
    EvaluationReport::build(
        "course_assistant",
        "d1g3st",
        vec![scored("TC001", "course_search", 1.0), scored("TC002", "course_search", 0.5)],
    )
    .expect("report")
}

#[test]
fn written_report_reads_back_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = report();

    let path = write_report_json(dir.path(), &report).expect("write");
    assert!(path.starts_with(dir.path()));
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some(report.file_name().as_str())
    );

    let loaded = read_report_json(&path).expect("read");
    assert_eq!(loaded, report);
}

#[test]
fn report_dir_is_created_on_demand() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("evaluation").join("reports");
    write_report_json(&nested, &report()).expect("write");
    assert_eq!(std::fs::read_dir(&nested).expect("dir").count(), 1);
}

#[test]
fn existing_report_is_never_overwritten() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = report();
    let first = write_report_json(dir.path(), &report).expect("first write");
    let before = std::fs::read_to_string(&first).expect("read");

    let err = write_report_json(dir.path(), &report).expect_err("second write");
    assert!(matches!(err, EvalError::Persistence { .. }));
    assert_eq!(std::fs::read_to_string(&first).expect("read"), before);
    assert_eq!(report.total_tests, 2, "report still usable after failure");
}

#[test]
fn distinct_runs_get_distinct_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = write_report_json(dir.path(), &report()).expect("a");
    let b = write_report_json(dir.path(), &report()).expect("b");
    assert_ne!(a, b);
}

#[test]
fn empty_run_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let built = EvaluationReport::build("course_assistant", "d1g3st", Vec::new());
    assert!(matches!(built, Err(EvalError::EmptyRegistry)));
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
}

#[test]
fn persisted_rates_are_fractions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_report_json(dir.path(), &report()).expect("write");
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json");

    assert_eq!(raw["average_score"], 0.75);
    assert_eq!(raw["pass_rate"], 0.5);
    assert_eq!(raw["category_breakdown"]["course_search"]["pass_rate"], 0.5);
    assert_eq!(raw["results"][0]["criterion_verdicts"][0]["verdict"], "PASS");
}
