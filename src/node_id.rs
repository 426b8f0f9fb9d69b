//! Names of the steps inside a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! Inputs, outputs and stateful steps are named by the user; those names are
//! validated and must be unique within a pipeline. Stateless steps are not
//! named and receive a generated label of the form `"{kind}@{position}"`,
//! which is what error reports and plan explanations show for them.

use crate::error::{FlowError, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static STEP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid step name regex"));

/// Identifier of one step in a pipeline.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct StepId(String);

impl StepId {
    /// Validate a user supplied step name.
    pub(crate) fn named(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(FlowError::InvalidStepName {
                name: name.to_string(),
                reason: "name must not be empty".to_string(),
            });
        }
        if !STEP_NAME.is_match(name) {
            return Err(FlowError::InvalidStepName {
                name: name.to_string(),
                reason: "only ASCII letters, digits, `_` and `-` are allowed".to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    /// Label for an unnamed stateless step at `position` in the pipeline.
    pub(crate) fn generated(kind: &str, position: usize) -> Self {
        Self(format!("{kind}@{position}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
