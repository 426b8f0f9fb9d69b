use crate::io::Sink;
use crate::window::{TimestampMs, Timestamped};
use anyhow::anyhow;
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

/// Collects every emitted value in memory. Clones share the same buffer, so
/// keep one handle and give the other to the pipeline.
///
/// ```
/// use ironstream::io::{CollectSink, Sink};
///
/// let sink = CollectSink::new();
/// let mut writer = sink.clone();
/// writer.write(5, "x").unwrap();
/// assert_eq!(sink.values(), vec!["x"]);
/// ```
#[derive(Debug)]
pub struct CollectSink<T> {
    inner: Arc<Mutex<Vec<Timestamped<T>>>>,
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> CollectSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values received so far, in arrival order.
    pub fn values(&self) -> Vec<T> {
        self.timestamped().into_iter().map(|t| t.value).collect()
    }

    /// Values with the epoch they were emitted at.
    pub fn timestamped(&self) -> Vec<Timestamped<T>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send> Sink<T> for CollectSink<T> {
    fn write(&mut self, epoch: TimestampMs, value: T) -> anyhow::Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("collect sink lock poisoned"))?
            .push(Timestamped::new(epoch, value));
        Ok(())
    }
}

/// Prints each value on its own line.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdOutput;

impl<T: Display> Sink<T> for StdOutput {
    fn write(&mut self, _epoch: TimestampMs, value: T) -> anyhow::Result<()> {
        println!("{value}");
        Ok(())
    }
}

/// Hands each value to a closure.
pub struct FnSink<F>(pub F);

impl<T, F> Sink<T> for FnSink<F>
where
    F: FnMut(TimestampMs, T) -> anyhow::Result<()> + Send,
{
    fn write(&mut self, epoch: TimestampMs, value: T) -> anyhow::Result<()> {
        (self.0)(epoch, value)
    }
}
