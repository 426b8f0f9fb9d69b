//! Input and output contracts.
//!
//! A pipeline pulls from one [`Source`] and pushes to one [`Sink`]. Both are
//! user code and report failures as [`anyhow::Error`]; the runner wraps those
//! into [`FlowError::Input`] and [`FlowError::Output`].
//!
//! Stock connectors:
//! - [`TimestampedInput`]: an iterator of [`Timestamped`] values, epochs supplied by the caller
//! - [`TestingInput`](crate::testing::TestingInput): an iterator of plain values stamped by a clock
//! - [`JsonLinesInput`] / [`JsonLinesOutput`]: newline-delimited JSON files
//! - [`CollectSink`], [`StdOutput`], [`FnSink`]

mod jsonl;
mod outputs;

pub use jsonl::{JsonLinesInput, JsonLinesOutput};
pub use outputs::{CollectSink, FnSink, StdOutput};

use crate::error::{FlowError, Result};
use crate::node::Item;
use crate::node_id::StepId;
use crate::stream::StreamData;
use crate::window::{TimestampMs, Timestamped};
use std::marker::PhantomData;

/// Pull side of a pipeline.
pub trait Source<T>: Send {
    /// Next value with its epoch, or `None` once the input is exhausted.
    ///
    /// # Errors
    /// Any failure reading the input; it aborts the run.
    fn next(&mut self) -> anyhow::Result<Option<Timestamped<T>>>;
}

/// Push side of a pipeline. Values arrive in emission order.
pub trait Sink<T>: Send {
    /// # Errors
    /// Any failure writing the value; it aborts the run.
    fn write(&mut self, epoch: TimestampMs, value: T) -> anyhow::Result<()>;

    /// Called once after the last value of a run that did not fail.
    ///
    /// # Errors
    /// Any failure flushing buffered output.
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Values with externally supplied epochs.
///
/// ```
/// use ironstream::io::{Source, TimestampedInput};
/// use ironstream::window::Timestamped;
///
/// let mut input = TimestampedInput::new(vec![Timestamped::new(10, "a"), Timestamped::new(20, "b")]);
/// assert_eq!(input.next().unwrap().map(|t| t.ts), Some(10));
/// ```
pub struct TimestampedInput<I> {
    iter: I,
}

impl<I> TimestampedInput<I> {
    pub fn new<C>(items: C) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: items.into_iter(),
        }
    }
}

impl<T, I> Source<T> for TimestampedInput<I>
where
    I: Iterator<Item = Timestamped<T>> + Send,
{
    fn next(&mut self) -> anyhow::Result<Option<Timestamped<T>>> {
        Ok(self.iter.next())
    }
}

pub(crate) trait ErasedSource: Send {
    fn next_item(&mut self, step: &StepId) -> Result<Option<Item>>;
}

pub(crate) struct SourceAdapter<T, S> {
    source: S,
    _t: PhantomData<fn() -> T>,
}

impl<T, S> SourceAdapter<T, S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            _t: PhantomData,
        }
    }
}

impl<T: StreamData, S: Source<T>> ErasedSource for SourceAdapter<T, S> {
    fn next_item(&mut self, step: &StepId) -> Result<Option<Item>> {
        let next = self.source.next().map_err(|source| FlowError::Input {
            step: step.to_string(),
            source,
        })?;
        Ok(next.map(|t| Item::new(t.ts, t.value)))
    }
}

pub(crate) trait ErasedSink: Send {
    fn write_item(&mut self, step: &StepId, item: Item) -> Result<()>;
    fn close(&mut self, step: &StepId) -> Result<()>;
}

pub(crate) struct SinkAdapter<T, S> {
    sink: S,
    _t: PhantomData<fn(T)>,
}

impl<T, S> SinkAdapter<T, S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            _t: PhantomData,
        }
    }
}

impl<T: StreamData, S: Sink<T>> ErasedSink for SinkAdapter<T, S> {
    fn write_item(&mut self, step: &StepId, item: Item) -> Result<()> {
        let (epoch, value) = item.take::<T>(step)?;
        self.sink
            .write(epoch, value)
            .map_err(|source| FlowError::Output {
                step: step.to_string(),
                source,
            })
    }

    fn close(&mut self, step: &StepId) -> Result<()> {
        self.sink.close().map_err(|source| FlowError::Output {
            step: step.to_string(),
            source,
        })
    }
}
