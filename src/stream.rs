//! Typed construction surface.
//!
//! A [`Dataflow`] starts with one input and yields a [`Stream<T>`]. Every
//! operator consumes the stream and returns a new one, so steps are recorded
//! in declared order and the type of the elements flowing between them is
//! checked by the compiler. [`Stream::output`] ends the chain and hands back
//! an immutable [`Pipeline`].
//!
//! Stateful operators live on `Stream<(K, V)>`: the first tuple field is the
//! key that state is partitioned by. Use [`Stream::map`] or [`Stream::key_by`]
//! to (re)key a stream.
//!
//! Configuration errors (invalid or duplicate step names, invalid window
//! parameters) are recorded as the chain is built and returned by
//! [`Stream::output`]; the first one wins.
//!
//! ```
//! use ironstream::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let out = CollectSink::new();
//! let pipeline = Dataflow::new("evens")
//!     .input("inp", TestingInput::new(0..10))
//!     .filter(|x: &i32| x % 2 == 0)
//!     .key_by(|_| "all")
//!     .stateful_map("running_sum", || 0, |sum: i32, x: &i32| (sum + x, sum + x))
//!     .output("out", out.clone())?;
//!
//! Runner::default().run(pipeline)?;
//! assert_eq!(out.values(), vec![("all", 0), ("all", 2), ("all", 6), ("all", 12), ("all", 20)]);
//! # Ok(())
//! # }
//! ```

use crate::clock::ClockConfig;
use crate::error::FlowError;
use crate::io::{Sink, SinkAdapter, Source, SourceAdapter};
use crate::node::{Node, StatefulLogic, StatelessOp, StepKind};
use crate::node_id::StepId;
use crate::operators::reduce::ReduceLogic;
use crate::operators::stateful_map::StatefulMapLogic;
use crate::operators::stateless::{
    FilterMapOp, FilterOp, FlatMapOp, InspectEpochOp, InspectOp, MapOp,
};
use crate::operators::window::{
    CollectAggregator, FoldAggregator, ReduceAggregator, WindowedLogic,
};
use crate::pipeline::{InputStep, OutputStep, Pipeline};
use crate::window::{TimestampMs, WindowConfig, WindowId};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// Bound for every element type flowing through a pipeline.
pub trait StreamData: 'static + Send + Sync + Clone + Debug {}
impl<T> StreamData for T where T: 'static + Send + Sync + Clone + Debug {}

/// Bound for keys of stateful operators.
pub trait StreamKey: StreamData + Eq + Hash {}
impl<T> StreamKey for T where T: StreamData + Eq + Hash {}

/// Entry point of the builder.
pub struct Dataflow {
    name: String,
}

impl Dataflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Attach the input. Epochs come from the source.
    pub fn input<T, S>(self, name: &str, source: S) -> Stream<T>
    where
        T: StreamData,
        S: Source<T> + 'static,
    {
        let mut flow = FlowBuilder {
            name: self.name,
            input: None,
            steps: Vec::new(),
            names: HashSet::new(),
            error: None,
        };
        if let Some(id) = flow.claim(name) {
            flow.input = Some(InputStep {
                id,
                source: Box::new(SourceAdapter::<T, S>::new(source)),
            });
        }
        Stream::from_flow(flow)
    }
}

struct FlowBuilder {
    name: String,
    input: Option<InputStep>,
    steps: Vec<Node>,
    names: HashSet<String>,
    error: Option<FlowError>,
}

impl FlowBuilder {
    /// Validate and reserve a user step name. Records the first failure.
    fn claim(&mut self, name: &str) -> Option<StepId> {
        let claimed = StepId::named(name).and_then(|id| {
            if self.names.insert(name.to_string()) {
                Ok(id)
            } else {
                Err(FlowError::DuplicateStep(name.to_string()))
            }
        });
        match claimed {
            Ok(id) => Some(id),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn fail(&mut self, e: FlowError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    fn next_position(&self) -> usize {
        self.steps.len() + 1
    }
}

/// A typed handle to the end of a pipeline under construction.
#[must_use = "a stream does nothing until it is finished with `output`"]
pub struct Stream<T> {
    flow: FlowBuilder,
    _t: PhantomData<fn() -> T>,
}

impl<T: StreamData> Stream<T> {
    fn from_flow(flow: FlowBuilder) -> Self {
        Self {
            flow,
            _t: PhantomData,
        }
    }

    fn stateless<O: StreamData>(mut self, kind: StepKind, op: Arc<dyn StatelessOp>) -> Stream<O> {
        let id = StepId::generated(kind.as_str(), self.flow.next_position());
        self.flow.steps.push(Node::Stateless { id, kind, op });
        Stream::from_flow(self.flow)
    }

    /// Keep values for which `predicate` holds.
    pub fn filter<F>(self, predicate: F) -> Stream<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let op = Arc::new(FilterOp::<T, F>(predicate, PhantomData));
        self.stateless(StepKind::Filter, op)
    }

    /// Transform values, dropping those mapped to `None`.
    pub fn filter_map<O, F>(self, f: F) -> Stream<O>
    where
        O: StreamData,
        F: Fn(&T) -> Option<O> + Send + Sync + 'static,
    {
        let op = Arc::new(FilterMapOp::<T, O, F>(f, PhantomData));
        self.stateless(StepKind::FilterMap, op)
    }

    /// Replace each value with every value yielded by `f`.
    pub fn flat_map<O, I, F>(self, f: F) -> Stream<O>
    where
        O: StreamData,
        I: IntoIterator<Item = O> + 'static,
        F: Fn(&T) -> I + Send + Sync + 'static,
    {
        let op = Arc::new(FlatMapOp::<T, O, I, F>(f, PhantomData));
        self.stateless(StepKind::FlatMap, op)
    }

    pub fn map<O, F>(self, f: F) -> Stream<O>
    where
        O: StreamData,
        F: Fn(&T) -> O + Send + Sync + 'static,
    {
        let op = Arc::new(MapOp::<T, O, F>(f, PhantomData));
        self.stateless(StepKind::Map, op)
    }

    /// Pair every value with a key computed from it.
    pub fn key_by<K, F>(self, key_fn: F) -> Stream<(K, T)>
    where
        K: StreamKey,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.map(move |t: &T| (key_fn(t), t.clone()))
    }

    /// Observe values without changing them.
    pub fn inspect<F>(self, f: F) -> Stream<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let op = Arc::new(InspectOp::<T, F>(f, PhantomData));
        self.stateless(StepKind::Inspect, op)
    }

    /// Observe values together with their epoch.
    pub fn inspect_epoch<F>(self, f: F) -> Stream<T>
    where
        F: Fn(TimestampMs, &T) + Send + Sync + 'static,
    {
        let op = Arc::new(InspectEpochOp::<T, F>(f, PhantomData));
        self.stateless(StepKind::InspectEpoch, op)
    }

    /// Finish the chain.
    ///
    /// # Errors
    /// The first configuration error recorded while building, or an invalid
    /// or duplicate output name.
    pub fn output<S>(self, name: &str, sink: S) -> crate::Result<Pipeline>
    where
        S: Sink<T> + 'static,
    {
        let mut flow = self.flow;
        let id = flow.claim(name);
        if let Some(e) = flow.error {
            return Err(e);
        }
        let (Some(input), Some(id)) = (flow.input, id) else {
            return Err(FlowError::InvalidConfig(
                "pipeline has no valid input or output".to_string(),
            ));
        };
        Ok(Pipeline {
            name: flow.name,
            input,
            steps: flow.steps,
            output: OutputStep {
                id,
                sink: Box::new(SinkAdapter::<T, S>::new(sink)),
            },
        })
    }
}

impl<K: StreamKey, V: StreamData> Stream<(K, V)> {
    fn stateful<O: StreamData>(
        mut self,
        name: &str,
        kind: StepKind,
        logic: Arc<dyn StatefulLogic>,
    ) -> Stream<O> {
        if let Some(id) = self.flow.claim(name) {
            self.flow.steps.push(Node::Stateful { id, kind, logic });
        }
        Stream::from_flow(self.flow)
    }

    fn check_window(&mut self, name: &str, window: &WindowConfig) {
        if let Err(reason) = window.validate() {
            self.flow.fail(FlowError::InvalidWindow {
                step: name.to_string(),
                reason,
            });
        }
    }

    /// Reduce the values of each key until `is_complete` accepts the
    /// accumulator, then emit `(key, acc)` and start over for that key.
    ///
    /// The first value of a key is the initial accumulator.
    pub fn reduce<R, C>(self, name: &str, reducer: R, is_complete: C) -> Stream<(K, V)>
    where
        R: Fn(V, &V) -> V + Send + Sync + 'static,
        C: Fn(&V) -> bool + Send + Sync + 'static,
    {
        let logic = Arc::new(ReduceLogic::<K, V, R, C>::new(reducer, is_complete));
        self.stateful(name, StepKind::Reduce, logic)
    }

    /// Fold the values of each `(key, window)` into an accumulator created by
    /// `builder`, emitting `(key, (window_id, acc))` once the window closes.
    pub fn fold_window<A, B, F>(
        mut self,
        name: &str,
        clock: ClockConfig,
        window: WindowConfig,
        builder: B,
        folder: F,
    ) -> Stream<(K, (WindowId, A))>
    where
        A: StreamData,
        B: Fn() -> A + Send + Sync + 'static,
        F: Fn(A, &V) -> A + Send + Sync + 'static,
    {
        self.check_window(name, &window);
        let agg = FoldAggregator { builder, folder };
        let logic = Arc::new(WindowedLogic::<K, V, A, _>::new(clock, window, agg));
        self.stateful(name, StepKind::FoldWindow, logic)
    }

    /// Like [`fold_window`](Self::fold_window), seeded with the first value of each window.
    pub fn reduce_window<R>(
        mut self,
        name: &str,
        clock: ClockConfig,
        window: WindowConfig,
        reducer: R,
    ) -> Stream<(K, (WindowId, V))>
    where
        R: Fn(V, &V) -> V + Send + Sync + 'static,
    {
        self.check_window(name, &window);
        let logic = Arc::new(WindowedLogic::<K, V, V, _>::new(
            clock,
            window,
            ReduceAggregator(reducer),
        ));
        self.stateful(name, StepKind::ReduceWindow, logic)
    }

    /// Gather the values of each window, in window-time order for sessions
    /// and arrival order for tumbling windows.
    pub fn collect_window(
        mut self,
        name: &str,
        clock: ClockConfig,
        window: WindowConfig,
    ) -> Stream<(K, (WindowId, Vec<V>))> {
        self.check_window(name, &window);
        let logic = Arc::new(WindowedLogic::<K, V, Vec<V>, _>::new(
            clock,
            window,
            CollectAggregator,
        ));
        self.stateful(name, StepKind::CollectWindow, logic)
    }

    /// Thread per-key state through `mapper`, emitting `(key, output)` for every value.
    pub fn stateful_map<S, O, B, M>(self, name: &str, builder: B, mapper: M) -> Stream<(K, O)>
    where
        S: Send + 'static,
        O: StreamData,
        B: Fn() -> S + Send + Sync + 'static,
        M: Fn(S, &V) -> (S, O) + Send + Sync + 'static,
    {
        let logic = Arc::new(StatefulMapLogic::<K, V, S, O, B, M>::new(builder, mapper));
        self.stateful(name, StepKind::StatefulMap, logic)
    }
}
