//! Testing utilities for ironstream pipelines.
//!
//! - [`TestingInput`]: feed any iterator into a pipeline, stamping epochs from a clock
//! - [`run_collect`]: finish a stream into memory and run it
//! - assertions comparing pipeline outputs, including
//!   [`assert_key_order_preserved`] for checking parallel runs against
//!   sequential ones
//!
//! # Quick Start
//!
//! ```
//! use ironstream::prelude::*;
//! use ironstream::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let stream = Dataflow::new("double")
//!     .input("inp", TestingInput::new(vec![1, 2, 3]))
//!     .map(|x: &i32| x * 2);
//! let result = run_collect(stream, &Runner::default())?;
//! assert_collections_equal(&result, &[2, 4, 6]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;

pub use assertions::*;

use crate::clock::{Clock, SystemClock};
use crate::io::{CollectSink, Source};
use crate::runner::Runner;
use crate::stream::{Stream, StreamData};
use crate::window::Timestamped;
use std::sync::Arc;

/// Values from an iterator, each stamped with its clock's time when pulled.
///
/// The default clock is [`SystemClock`]; pass a
/// [`TestingClock`](crate::clock::TestingClock) to control epochs.
pub struct TestingInput<I> {
    iter: I,
    clock: Arc<dyn Clock>,
}

impl<I> TestingInput<I> {
    pub fn new<C>(items: C) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: items.into_iter(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl<T, I> Source<T> for TestingInput<I>
where
    I: Iterator<Item = T> + Send,
{
    fn next(&mut self) -> anyhow::Result<Option<Timestamped<T>>> {
        Ok(self
            .iter
            .next()
            .map(|value| Timestamped::new(self.clock.now(), value)))
    }
}

/// Finish `stream` with an in-memory output named `collect`, run it and
/// return the emitted values.
///
/// # Errors
/// Any configuration or run error.
pub fn run_collect<T: StreamData>(stream: Stream<T>, runner: &Runner) -> crate::Result<Vec<T>> {
    let sink = CollectSink::new();
    let pipeline = stream.output("collect", sink.clone())?;
    runner.run(pipeline)?;
    Ok(sink.values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestingClock;

    #[test]
    fn testing_input_stamps_with_its_clock() {
        let clock = TestingClock::new(100);
        let mut input = TestingInput::new(vec!["a", "b"]).with_clock(clock.clone());
        let first = input.next().unwrap().unwrap();
        clock.set(250);
        let second = input.next().unwrap().unwrap();
        assert_eq!((first.ts, first.value), (100, "a"));
        assert_eq!((second.ts, second.value), (250, "b"));
        assert!(input.next().unwrap().is_none());
    }
}
