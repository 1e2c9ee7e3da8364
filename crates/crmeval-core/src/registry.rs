//! The fixed, ordered battery of test cases.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::{EvalError, Result};
use crate::domain::{compute_digest, TestCase};

/// On-disk suite definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteFile {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub test_cases: Vec<TestCase>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Validated, immutable sequence of test cases.
///
/// # Invariants
///
/// Ids are unique and non-empty, every case has a non-empty query and at
/// least one success criterion. Iteration order is declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRegistry {
    name: String,
    version: String,
    cases: Vec<TestCase>,
}

impl TestRegistry {
    /// Validate and freeze a list of test cases.
    pub fn new(name: impl Into<String>, cases: Vec<TestCase>) -> Result<Self> {
        Self::with_version(name, default_version(), cases)
    }

    pub fn with_version(
        name: impl Into<String>,
        version: impl Into<String>,
        cases: Vec<TestCase>,
    ) -> Result<Self> {
        validate(&cases)?;
        Ok(Self {
            name: name.into(),
            version: version.into(),
            cases,
        })
    }

    /// Parse a suite from JSON.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let suite: SuiteFile = serde_json::from_str(raw)
            .map_err(|e| EvalError::Configuration(format!("invalid suite definition: {e}")))?;
        Self::with_version(suite.name, suite.version, suite.test_cases)
    }

    /// Read and parse a suite file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EvalError::Configuration(format!("cannot read suite {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// A registry holding only the cases of one category.
    ///
    /// The result may be empty; running it fails with
    /// [`EvalError::EmptyRegistry`].
    pub fn filter_category(&self, category: &str) -> Self {
        Self {
            name: format!("{}[{}]", self.name, category),
            version: self.version.clone(),
            cases: self
                .cases
                .iter()
                .filter(|c| c.category == category)
                .cloned()
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestCase> {
        self.cases.iter()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Distinct categories, sorted.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.cases.iter().map(|c| c.category.as_str()).collect()
    }

    /// SHA-256 fingerprint of the cases in order.
    pub fn digest(&self) -> Result<String> {
        compute_digest(&self.cases)
    }
}

impl<'a> IntoIterator for &'a TestRegistry {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

fn validate(cases: &[TestCase]) -> Result<()> {
    let mut seen = HashSet::new();
    for case in cases {
        if case.id.trim().is_empty() {
            return Err(EvalError::Configuration(
                "test case id must not be empty".to_string(),
            ));
        }
        if !seen.insert(case.id.as_str()) {
            return Err(EvalError::DuplicateTestId {
                id: case.id.clone(),
            });
        }
        if case.query.trim().is_empty() {
            return Err(EvalError::Configuration(format!(
                "test case {} has an empty query",
                case.id
            )));
        }
        if case.success_criteria.is_empty() {
            return Err(EvalError::EmptyCriteria {
                id: case.id.clone(),
            });
        }
    }
    Ok(())
}
