use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a job kind (e.g. `mds.parcelas`). The executor side maps it to an
/// implementation; the engine only carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Payload produced by a successful job attempt.
pub type JobOutput = serde_json::Value;

/// JobName + params の“運搬用”データ。
///
/// The engine never looks inside `params`; it only hands the whole reference
/// to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRef {
    name: JobName,
    params: serde_json::Value,
}

impl JobRef {
    pub fn new(name: impl Into<JobName>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// A job reference without parameters.
    pub fn named(name: impl Into<JobName>) -> Self {
        Self::new(name, serde_json::Value::Null)
    }

    pub fn name(&self) -> &JobName {
        &self.name
    }

    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }
}
