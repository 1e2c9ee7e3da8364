//! Scripted test case definitions.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Expectation value attached to one criterion.
///
/// The same shape means different things for different criterion kinds:
/// a `List` is a keyword set for content checks and a tool-name set for the
/// tool-usage check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Expectation {
    /// Boolean flag or enabling marker.
    Flag(bool),

    /// Minimum integer bound.
    Minimum(u64),

    /// One or more names (keywords or tool names).
    List(Vec<String>),
}

impl Expectation {
    /// Build a `List` expectation from anything iterable of strings.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expectation::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Flag(b) => write!(f, "{b}"),
            Expectation::Minimum(n) => write!(f, "{n}"),
            Expectation::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// One named, independently scorable expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub name: String,
    pub expectation: Expectation,
}

/// Ordered criterion-name → expectation mapping.
///
/// Serialized as a JSON object. Declaration order is preserved and drives
/// the order of verdicts in a [`TestResult`](super::TestResult); a repeated
/// key is rejected during deserialization. Going through `serde_json::Value`
/// keeps the order only because the workspace enables `preserve_order`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessCriteria(Vec<Criterion>);

impl SuccessCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a criterion, replacing the expectation if the name already exists.
    pub fn with(mut self, name: impl Into<String>, expectation: Expectation) -> Self {
        self.insert(name.into(), expectation);
        self
    }

    fn insert(&mut self, name: String, expectation: Expectation) {
        match self.0.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.expectation = expectation,
            None => self.0.push(Criterion { name, expectation }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Expectation> {
        self.0
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.expectation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SuccessCriteria {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for c in &self.0 {
            map.serialize_entry(&c.name, &c.expectation)?;
        }
        map.end()
    }
}

struct SuccessCriteriaVisitor;

impl<'de> Visitor<'de> for SuccessCriteriaVisitor {
    type Value = SuccessCriteria;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of criterion name to expectation value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut criteria = Vec::<Criterion>::new();
        while let Some((name, expectation)) = access.next_entry::<String, Expectation>()? {
            if criteria.iter().any(|c| c.name == name) {
                return Err(de::Error::custom(format!("duplicate criterion `{name}`")));
            }
            criteria.push(Criterion { name, expectation });
        }
        Ok(SuccessCriteria(criteria))
    }
}

impl<'de> Deserialize<'de> for SuccessCriteria {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SuccessCriteriaVisitor)
    }
}

/// Immutable definition of one scripted query and how to score the answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    /// Unique identifier within a registry.
    pub id: String,

    /// Text sent to the agent.
    pub query: String,

    /// Tools the agent is expected to invoke. Order is irrelevant.
    #[serde(default)]
    pub expected_tools: BTreeSet<String>,

    /// Free-text description. Documentation only, never scored.
    #[serde(default)]
    pub expected_behavior: String,

    /// Criteria applied to the agent's answer.
    pub success_criteria: SuccessCriteria,

    /// Grouping tag used for the report breakdown.
    pub category: String,
}

impl TestCase {
    /// Create a test case with no expected tools and no criteria.
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            expected_tools: BTreeSet::new(),
            expected_behavior: String::new(),
            success_criteria: SuccessCriteria::new(),
            category: category.into(),
        }
    }

    /// Add an expected tool.
    pub fn expect_tool(mut self, name: impl Into<String>) -> Self {
        self.expected_tools.insert(name.into());
        self
    }

    /// Set the documentation-only behavior description.
    pub fn behavior(mut self, text: impl Into<String>) -> Self {
        self.expected_behavior = text.into();
        self
    }

    /// Add a success criterion.
    pub fn criterion(mut self, name: impl Into<String>, expectation: Expectation) -> Self {
        self.success_criteria.insert(name.into(), expectation);
        self
    }
}
