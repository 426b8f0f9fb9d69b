//! # Ironstream
//!
//! A **keyed, windowed stream processing engine** for Rust. Ironstream runs a
//! declared pipeline of stateless and stateful steps over a sequence of
//! timestamped items and emits per-key and per-window aggregates as soon as
//! they are final.
//!
//! ## Key Features
//!
//! - **Typed builder** - chain steps on a [`Stream<T>`]; closure signatures are checked at compile time
//! - **Stateless steps** - `filter`, `filter_map`, `flat_map`, `map`, `key_by`, `inspect`, `inspect_epoch`
//! - **Stateful steps** - `reduce`, `fold_window`, `reduce_window`, `collect_window`, `stateful_map`
//! - **Tumbling and session windows** - sessions merge when new items bridge them
//! - **Per-key watermarks** - windows close as soon as their key moves past them
//! - **Sequential and parallel execution** - parallel runs partition state by key on Rayon
//! - **Explicit late-data and stop policies** - drop or fail, flush or discard
//!
//! ## Quick Start
//!
//! ```
//! use ironstream::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let clicks = vec![
//!     Timestamped::new(0, ("alice", 1)),
//!     Timestamped::new(400, ("bob", 1)),
//!     Timestamped::new(700, ("alice", 1)),
//!     Timestamped::new(1_200, ("alice", 1)),
//! ];
//!
//! let out = CollectSink::new();
//! let pipeline = Dataflow::new("clicks")
//!     .input("clicks", TimestampedInput::new(clicks))
//!     .map(|(user, n): &(&str, u32)| (user.to_string(), *n))
//!     .fold_window(
//!         "per_second",
//!         ClockConfig::Epoch,
//!         WindowConfig::tumbling(Duration::from_secs(1), 0),
//!         || 0u32,
//!         |count, n| count + n,
//!     )
//!     .output("out", out.clone())?;
//!
//! Runner::default().run(pipeline)?;
//! let mut counts: Vec<_> = out.values().into_iter().map(|(user, (w, c))| (user, w.0, c)).collect();
//! counts.sort();
//! assert_eq!(
//!     counts,
//!     vec![
//!         ("alice".to_string(), 0, 2),
//!         ("alice".to_string(), 1, 1),
//!         ("bob".to_string(), 0, 1),
//!     ]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipelines
//!
//! A [`Dataflow`] takes one input and returns a [`Stream<T>`]. Each step
//! consumes the stream and returns the next one; [`Stream::output`] ends the
//! chain with a sink and returns an immutable [`Pipeline`], which a
//! [`Runner`] executes. Stateful steps need a unique name; stateless steps are
//! labelled `{kind}@{position}` in errors.
//!
//! ### Epochs and clocks
//!
//! Every item carries an epoch, supplied by the input or stamped by its clock.
//! Windowed steps pick their window time through a [`ClockConfig`]: the item's
//! epoch, wall-clock time, or any custom [`Clock`](clock::Clock).
//!
//! ### Completion
//!
//! Each stateful step tracks a watermark per key: the largest window time seen
//! for that key. Tumbling windows close once the watermark reaches their end,
//! sessions once it moves more than the gap past their last item. Remaining
//! windows are flushed at end of stream. See [`watermark`] for the details.
//!
//! ### Errors
//!
//! All failures are a [`FlowError`]; [`FlowError::kind`] groups them into
//! configuration, user-function, late-data, output and runtime errors. A
//! panicking closure aborts the run; whatever was emitted before it still
//! reaches the sink.

pub mod assigner;
pub mod clock;
pub mod config;
pub mod error;
pub mod io;
pub mod metrics;
mod node;
pub mod node_id;
mod operators;
pub mod pipeline;
pub mod planner;
pub mod runner;
pub mod state;
pub mod stream;
pub mod testing;
pub mod watermark;
pub mod window;

pub use clock::{Clock, ClockConfig, SystemClock, TestingClock};
pub use config::RunnerConfig;
pub use error::{ErrorKind, FlowError, Result};
pub use io::{CollectSink, FnSink, JsonLinesInput, JsonLinesOutput, Sink, Source, StdOutput, TimestampedInput};
pub use metrics::MetricsCollector;
pub use node::{StepKind, StepStats};
pub use node_id::StepId;
pub use pipeline::Pipeline;
pub use runner::{ExecMode, RunSummary, Runner, StopHandle, StopPolicy};
pub use stream::{Dataflow, Stream, StreamData, StreamKey};
pub use watermark::LateDataPolicy;
pub use window::{TimestampMs, Timestamped, Window, WindowConfig, WindowId};

/// Everything needed to build and run a pipeline.
pub mod prelude {
    pub use crate::clock::{ClockConfig, TestingClock};
    pub use crate::error::{ErrorKind, FlowError};
    pub use crate::io::{CollectSink, FnSink, Sink, Source, StdOutput, TimestampedInput};
    pub use crate::pipeline::Pipeline;
    pub use crate::runner::{ExecMode, Runner, StopHandle, StopPolicy};
    pub use crate::stream::{Dataflow, Stream};
    pub use crate::testing::TestingInput;
    pub use crate::watermark::LateDataPolicy;
    pub use crate::window::{Timestamped, WindowConfig, WindowId};
}
