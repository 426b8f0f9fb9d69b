//! Error taxonomy for building and running dataflows.
//!
//! Every failure surfaces as a [`FlowError`]. [`FlowError::kind`] groups the
//! variants into the categories callers usually branch on:
//!
//! - [`ErrorKind::Configuration`]: the pipeline or runner is malformed. Raised
//!   while building, except for tumbling-window timestamps before `align_to`,
//!   which can only be detected once items flow.
//! - [`ErrorKind::UserFunction`]: a closure passed to a step panicked.
//! - [`ErrorKind::LateData`]: an item reached an already-closed window while
//!   the runner uses [`LateDataPolicy::Fail`](crate::watermark::LateDataPolicy::Fail).
//! - [`ErrorKind::Output`]: the sink rejected an item.
//! - [`ErrorKind::Runtime`]: the engine itself could not proceed.

use crate::window::TimestampMs;
use std::any::Any;
use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    UserFunction,
    LateData,
    Output,
    Runtime,
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("step name `{0}` is used more than once")]
    DuplicateStep(String),

    #[error("invalid step name `{name}`: {reason}")]
    InvalidStepName { name: String, reason: String },

    #[error("invalid window configuration for step `{step}`: {reason}")]
    InvalidWindow { step: String, reason: String },

    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),

    #[error("could not load runner configuration")]
    ConfigLoad(#[source] anyhow::Error),

    #[error("step `{step}`: timestamp {time} falls before window alignment {align_to}")]
    BeforeAlignment {
        step: String,
        time: TimestampMs,
        align_to: TimestampMs,
    },

    #[error("step `{step}`: user function panicked on input {input}: {message}")]
    UserFunction {
        step: String,
        input: String,
        message: String,
    },

    #[error("step `{step}`: late item for key {key} at {time}, watermark is {watermark}")]
    LateData {
        step: String,
        key: String,
        time: TimestampMs,
        watermark: TimestampMs,
    },

    #[error("output `{step}` rejected an item")]
    Output {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("input `{step}` failed")]
    Input {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("step `{step}` received an element that is not a {expected}")]
    TypeMismatch { step: String, expected: &'static str },

    #[error("could not build worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateStep(_)
            | Self::InvalidStepName { .. }
            | Self::InvalidWindow { .. }
            | Self::InvalidConfig(_)
            | Self::ConfigLoad(_)
            | Self::BeforeAlignment { .. } => ErrorKind::Configuration,
            Self::UserFunction { .. } => ErrorKind::UserFunction,
            Self::LateData { .. } => ErrorKind::LateData,
            Self::Output { .. } => ErrorKind::Output,
            Self::Input { .. } | Self::TypeMismatch { .. } | Self::WorkerPool(_) => {
                ErrorKind::Runtime
            }
        }
    }

    /// Name of the step the error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::InvalidWindow { step, .. }
            | Self::BeforeAlignment { step, .. }
            | Self::UserFunction { step, .. }
            | Self::LateData { step, .. }
            | Self::Output { step, .. }
            | Self::Input { step, .. }
            | Self::TypeMismatch { step, .. } => Some(step),
            Self::DuplicateStep(name) | Self::InvalidStepName { name, .. } => Some(name),
            Self::InvalidConfig(_) | Self::ConfigLoad(_) | Self::WorkerPool(_) => None,
        }
    }
}

/// Run a user-supplied function, turning a panic into [`FlowError::UserFunction`].
///
/// `input` is only rendered when the call fails.
pub(crate) fn guard<R>(step: &str, input: &dyn Debug, f: impl FnOnce() -> R) -> Result<R> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| FlowError::UserFunction {
        step: step.to_string(),
        input: format!("{input:?}"),
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
