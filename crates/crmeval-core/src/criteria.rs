//! Criterion kinds and the name → handler registry.
//!
//! Every criterion kind is a pure function of its expectation value and the
//! invocation result. Adding a kind is registering a new handler; the
//! evaluator never branches on criterion names beyond the lookup.
//!
//! Behavioral patterns ("is the answer polite", "does it ask for details")
//! are keyword heuristics with no formal definition. Their keyword sets are
//! deployment data loaded into a [`PatternSet`], not code.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::error::{EvalError, Result};
use crate::domain::{CriterionVerdict, Expectation, InvocationResult, Verdict};

/// Names of the built-in criterion kinds.
pub mod kinds {
    /// Every expected tool appears in the trace.
    pub const TOOL_USED: &str = "tool_used";
    /// The trace is empty.
    pub const NO_TOOL_USED: &str = "no_tool_used";
    /// The response contains at least one keyword.
    pub const CONTAINS_KEYWORDS: &str = "contains_keywords";
    /// The response has at least N characters.
    pub const RESPONSE_LENGTH_MIN: &str = "response_length_min";

    pub const BUILTIN: [&str; 4] = [TOOL_USED, NO_TOOL_USED, CONTAINS_KEYWORDS, RESPONSE_LENGTH_MIN];
}

/// Outcome of one handler call, before the criterion name is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub passed: bool,
    pub detail: Option<String>,
}

impl Check {
    pub fn pass() -> Self {
        Self {
            passed: true,
            detail: None,
        }
    }

    pub fn pass_with(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: Some(detail.into()),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: Some(detail.into()),
        }
    }

    /// Attach the criterion name.
    pub fn into_verdict(self, name: impl Into<String>) -> CriterionVerdict {
        CriterionVerdict {
            name: name.into(),
            verdict: if self.passed {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
            detail: self.detail,
        }
    }
}

/// A criterion handler.
pub type CriterionFn = Arc<dyn Fn(&Expectation, &InvocationResult) -> Check + Send + Sync>;

/// Character count used by length checks. Whitespace-only text counts as 0.
pub fn response_length(text: &str) -> usize {
    if text.trim().is_empty() {
        0
    } else {
        text.chars().count()
    }
}

fn invalid(kind: &str, expectation: &Expectation) -> Check {
    Check::fail(format!("invalid expectation {expectation} for {kind}"))
}

fn format_tools(tools: &[String]) -> String {
    format!("[{}]", tools.join(", "))
}

fn check_tool_used(expectation: &Expectation, inv: &InvocationResult) -> Check {
    match expectation {
        Expectation::List(expected) => {
            let missing: Vec<&str> = expected
                .iter()
                .filter(|t| !inv.tools_used.contains(*t))
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                Check::pass_with(format!("tools: {}", format_tools(&inv.tools_used)))
            } else {
                Check::fail(format!(
                    "expected tool {} not called (tools: {})",
                    missing.join(", "),
                    format_tools(&inv.tools_used)
                ))
            }
        }
        Expectation::Flag(true) => {
            if inv.tools_used.is_empty() {
                Check::fail("no tools called")
            } else {
                Check::pass_with(format!("tools: {}", format_tools(&inv.tools_used)))
            }
        }
        Expectation::Flag(false) => check_no_tool_used(&Expectation::Flag(true), inv),
        other => invalid(kinds::TOOL_USED, other),
    }
}

fn check_no_tool_used(expectation: &Expectation, inv: &InvocationResult) -> Check {
    match expectation {
        Expectation::Flag(true) => {
            if inv.tools_used.is_empty() {
                Check::pass()
            } else {
                Check::fail(format!(
                    "unexpected tools: {}",
                    format_tools(&inv.tools_used)
                ))
            }
        }
        Expectation::Flag(false) => check_tool_used(&Expectation::Flag(true), inv),
        other => invalid(kinds::NO_TOOL_USED, other),
    }
}

fn check_contains_keywords(expectation: &Expectation, inv: &InvocationResult) -> Check {
    let Expectation::List(keywords) = expectation else {
        return invalid(kinds::CONTAINS_KEYWORDS, expectation);
    };
    if keywords.is_empty() {
        return Check::fail("no keywords configured");
    }
    let haystack = inv.response_text.to_lowercase();
    match keywords
        .iter()
        .find(|k| haystack.contains(&k.to_lowercase()))
    {
        Some(hit) => Check::pass_with(format!("matched \"{hit}\"")),
        None => Check::fail(format!(
            "response contains none of [{}]",
            keywords.join(", ")
        )),
    }
}

fn check_response_length_min(expectation: &Expectation, inv: &InvocationResult) -> Check {
    let Expectation::Minimum(minimum) = expectation else {
        return invalid(kinds::RESPONSE_LENGTH_MIN, expectation);
    };
    let length = response_length(&inv.response_text) as u64;
    if length >= *minimum {
        Check::pass_with(format!("length: {length}"))
    } else {
        Check::fail(format!("response length {length} < minimum {minimum}"))
    }
}

/// Heuristic markers for one behavioral pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BehaviorPattern {
    /// Matched case-insensitively as substrings.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Matched literally (e.g. `"?"`).
    #[serde(default)]
    pub punctuation: Vec<String>,
}

impl BehaviorPattern {
    /// First marker found in `text`, if any.
    pub fn find_marker<'a>(&'a self, text: &str) -> Option<&'a str> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| lower.contains(&k.to_lowercase()))
            .or_else(|| self.punctuation.iter().find(|p| text.contains(p.as_str())))
            .map(String::as_str)
    }

    fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.punctuation.is_empty()
    }

    fn check(&self, name: &str, expectation: &Expectation, inv: &InvocationResult) -> Check {
        let marker = self.find_marker(&inv.response_text);
        match (expectation, marker) {
            (Expectation::Flag(true), Some(m)) => Check::pass_with(format!("matched \"{m}\"")),
            (Expectation::Flag(true), None) => {
                Check::fail(format!("no marker of {name} in response"))
            }
            (Expectation::Flag(false), None) => Check::pass(),
            (Expectation::Flag(false), Some(m)) => {
                Check::fail(format!("unexpected marker of {name}: \"{m}\""))
            }
            (other, _) => invalid(name, other),
        }
    }
}

/// Named behavioral patterns, loaded per deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PatternSet(BTreeMap<String, BehaviorPattern>);

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, pattern: BehaviorPattern) -> Self {
        self.0.insert(name.into(), pattern);
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| EvalError::Configuration(format!("invalid pattern set: {e}")))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EvalError::Configuration(format!("cannot read pattern set {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn get(&self, name: &str) -> Option<&BehaviorPattern> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BehaviorPattern)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Registry mapping criterion names to handlers.
#[derive(Clone)]
pub struct CriterionRegistry {
    handlers: HashMap<String, CriterionFn>,
}

impl std::fmt::Debug for CriterionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriterionRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl Default for CriterionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CriterionRegistry {
    /// A registry with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The built-in kinds only.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(kinds::TOOL_USED, check_tool_used);
        registry.register(kinds::NO_TOOL_USED, check_no_tool_used);
        registry.register(kinds::CONTAINS_KEYWORDS, check_contains_keywords);
        registry.register(kinds::RESPONSE_LENGTH_MIN, check_response_length_min);
        registry
    }

    /// Built-in kinds plus one handler per behavioral pattern.
    ///
    /// Fails if a pattern shadows a built-in kind or has no markers.
    pub fn with_patterns(patterns: &PatternSet) -> Result<Self> {
        let mut registry = Self::builtin();
        for (name, pattern) in patterns.iter() {
            if kinds::BUILTIN.contains(&name.as_str()) {
                return Err(EvalError::Configuration(format!(
                    "pattern `{name}` shadows a built-in criterion"
                )));
            }
            if pattern.is_empty() {
                return Err(EvalError::Configuration(format!(
                    "pattern `{name}` has no keywords or punctuation"
                )));
            }
            registry.register_pattern(name.clone(), pattern.clone());
        }
        Ok(registry)
    }

    /// Register a handler, returning the one it replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> Option<CriterionFn>
    where
        F: Fn(&Expectation, &InvocationResult) -> Check + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler))
    }

    /// Register a behavioral pattern under its own name.
    pub fn register_pattern(&mut self, name: impl Into<String>, pattern: BehaviorPattern) {
        let name = name.into();
        let label = name.clone();
        self.register(name, move |expectation, inv| {
            pattern.check(&label, expectation, inv)
        });
    }

    pub fn get(&self, name: &str) -> Option<&CriterionFn> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(text: &str, tools: &[&str]) -> InvocationResult {
        InvocationResult::completed(text, tools.iter().map(|t| t.to_string()).collect(), 0.5)
    }

    fn run(registry: &CriterionRegistry, name: &str, exp: Expectation, inv: &InvocationResult) -> Check {
        let handler = registry.get(name).expect("registered");
        (**handler)(&exp, inv)
    }

    #[test]
    fn test_tool_used_subset_ignores_extras() {
        let reg = CriterionRegistry::builtin();
        let inv = reply("ok", &["get_course_price", "get_course_details", "get_course_price"]);
        let check = run(&reg, kinds::TOOL_USED, Expectation::list(["get_course_price"]), &inv);
        assert!(check.passed);
    }

    #[test]
    fn test_tool_used_reports_missing_tool() {
        let reg = CriterionRegistry::builtin();
        let inv = reply("ok", &["get_course_details"]);
        let check = run(&reg, kinds::TOOL_USED, Expectation::list(["get_course_price"]), &inv);
        assert!(!check.passed);
        let detail = check.detail.expect("detail");
        assert!(detail.contains("expected tool get_course_price not called"), "{detail}");
    }

    #[test]
    fn test_tool_used_empty_expected_set_always_passes() {
        let reg = CriterionRegistry::builtin();
        let empty = Expectation::List(vec![]);
        assert!(run(&reg, kinds::TOOL_USED, empty.clone(), &reply("", &[])).passed);
        assert!(run(&reg, kinds::TOOL_USED, empty, &reply("", &["anything"])).passed);
    }

    #[test]
    fn test_no_tool_used() {
        let reg = CriterionRegistry::builtin();
        assert!(run(&reg, kinds::NO_TOOL_USED, Expectation::Flag(true), &reply("hi", &[])).passed);
        let check = run(
            &reg,
            kinds::NO_TOOL_USED,
            Expectation::Flag(true),
            &reply("hi", &["search_courses"]),
        );
        assert!(!check.passed);
        assert_eq!(check.detail.as_deref(), Some("unexpected tools: [search_courses]"));
    }

    #[test]
    fn test_contains_keywords_is_case_insensitive() {
        let reg = CriterionRegistry::builtin();
        let inv = reply("Ціна КУРСУ: 5000 грн", &[]);
        let check = run(&reg, kinds::CONTAINS_KEYWORDS, Expectation::list(["курсу"]), &inv);
        assert!(check.passed);
        let check = run(&reg, kinds::CONTAINS_KEYWORDS, Expectation::list(["python"]), &inv);
        assert!(!check.passed);
    }

    #[test]
    fn test_response_length_counts_chars_not_bytes() {
        let reg = CriterionRegistry::builtin();
        // 10 Cyrillic characters, 20 bytes
        let inv = reply("абвгдежзик", &[]);
        assert!(run(&reg, kinds::RESPONSE_LENGTH_MIN, Expectation::Minimum(10), &inv).passed);
        assert!(!run(&reg, kinds::RESPONSE_LENGTH_MIN, Expectation::Minimum(11), &inv).passed);
    }

    #[test]
    fn test_whitespace_only_response_has_length_zero() {
        assert_eq!(response_length("   \n\t "), 0);
        let reg = CriterionRegistry::builtin();
        let check = run(
            &reg,
            kinds::RESPONSE_LENGTH_MIN,
            Expectation::Minimum(1),
            &reply("      ", &[]),
        );
        assert!(!check.passed);
        assert_eq!(check.detail.as_deref(), Some("response length 0 < minimum 1"));
    }

    #[test]
    fn test_wrong_expectation_shape_fails_without_panic() {
        let reg = CriterionRegistry::builtin();
        let check = run(&reg, kinds::RESPONSE_LENGTH_MIN, Expectation::Flag(true), &reply("x", &[]));
        assert!(!check.passed);
        assert!(check.detail.expect("detail").contains("invalid expectation"));
    }

    #[test]
    fn test_pattern_keyword_and_punctuation() {
        let patterns = PatternSet::new().with(
            "asks_for_details",
            BehaviorPattern {
                keywords: vec!["вкажіть".to_string()],
                punctuation: vec!["?".to_string()],
            },
        );
        let reg = CriterionRegistry::with_patterns(&patterns).expect("registry");
        let flag = Expectation::Flag(true);
        assert!(run(&reg, "asks_for_details", flag.clone(), &reply("Яке ваше ім'я?", &[])).passed);
        assert!(run(&reg, "asks_for_details", flag.clone(), &reply("Вкажіть email", &[])).passed);
        assert!(!run(&reg, "asks_for_details", flag, &reply("Добре.", &[])).passed);
        assert!(run(&reg, "asks_for_details", Expectation::Flag(false), &reply("Добре.", &[])).passed);
    }

    #[test]
    fn test_pattern_cannot_shadow_builtin() {
        let patterns = PatternSet::new().with(
            kinds::TOOL_USED,
            BehaviorPattern {
                keywords: vec!["x".to_string()],
                punctuation: vec![],
            },
        );
        let err = CriterionRegistry::with_patterns(&patterns).expect_err("must reject");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_pattern_set_from_json() {
        let set = PatternSet::from_json_str(
            r#"{"is_polite": {"keywords": ["дякую", "будь ласка"]}}"#,
        )
        .expect("parse");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("is_polite").expect("pattern").keywords.len(), 2);
        assert!(set.get("is_polite").expect("pattern").punctuation.is_empty());
    }

    #[test]
    fn test_custom_kind_registration() {
        let mut reg = CriterionRegistry::builtin();
        reg.register("mentions_python", |_, inv| {
            if inv.response_text.contains("Python") {
                Check::pass()
            } else {
                Check::fail("no Python")
            }
        });
        assert!(reg.contains("mentions_python"));
        assert!(run(&reg, "mentions_python", Expectation::Flag(true), &reply("Python 3", &[])).passed);
    }
}
