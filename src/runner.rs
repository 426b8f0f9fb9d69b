//! Pipeline driver.
//!
//! [`Runner::run`] pulls items from the input in micro-batches of
//! [`Runner::batch_size`], pushes each batch through the planned stages and
//! writes whatever comes out to the sink before pulling the next batch.
//!
//! Window completion is evaluated once per batch, after every item of the
//! batch reached the stateful step. With the default batch size of one this is
//! the same as closing windows item by item.
//!
//! In [`ExecMode::Parallel`] every stateful step owns `partitions` independent
//! state partitions. Items are routed by a hash of their key, so a key always
//! lands on the same partition and keeps its relative order, while distinct
//! partitions run concurrently on `rayon`. Output order across keys may differ
//! from [`ExecMode::Sequential`]; per-key order never does.

use crate::error::{FlowError, Result};
use crate::metrics::MetricsCollector;
use crate::node::{BuildContext, Item, StatefulLogic, StatefulPartition, StatelessOp, StepStats};
use crate::node_id::StepId;
use crate::pipeline::{InputStep, OutputStep, Pipeline};
use crate::planner::{Stage, build_plan};
use crate::watermark::LateDataPolicy;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, info_span};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    Sequential,
    Parallel {
        /// Worker threads; `None` uses the global rayon pool.
        threads: Option<usize>,
        /// State partitions per stateful step; `None` derives it from the CPU count.
        partitions: Option<usize>,
    },
}

/// What happens to open windows when a run is stopped through a [`StopHandle`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Force-close and emit everything still open, as at end of stream.
    #[default]
    Flush,
    /// Drop everything still open; the count is reported as `pending_discarded`.
    Discard,
}

/// Cooperative cancellation flag, checked between batches. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Runner {
    pub mode: ExecMode,
    /// Items pulled from the input per micro-batch. Must be positive.
    pub batch_size: usize,
    pub late_data: LateDataPolicy,
    pub on_stop: StopPolicy,
    pub stop: Option<StopHandle>,
    /// Receives the counters of every run when set.
    pub metrics: Option<MetricsCollector>,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            mode: ExecMode::Sequential,
            batch_size: 1,
            late_data: LateDataPolicy::default(),
            on_stop: StopPolicy::default(),
            stop: None,
            metrics: None,
        }
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub pipeline: String,
    /// Items pulled from the input.
    pub ingested: u64,
    /// Items written to the sink.
    pub emitted: u64,
    pub batches: u64,
    /// Whether the run ended through a [`StopHandle`] rather than end of stream.
    pub stopped: bool,
    /// Counters of every stateful step, in declared order.
    pub steps: Vec<(String, StepStats)>,
}

impl RunSummary {
    pub fn step(&self, name: &str) -> Option<&StepStats> {
        self.steps.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Counters summed over all stateful steps.
    pub fn total(&self) -> StepStats {
        self.steps.iter().fold(StepStats::default(), |mut acc, (_, s)| {
            acc.merge(s);
            acc
        })
    }
}

impl Runner {
    /// Sequential runner with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parallel runner on the global rayon pool.
    pub fn parallel(partitions: Option<usize>) -> Self {
        Self {
            mode: ExecMode::Parallel {
                threads: None,
                partitions,
            },
            ..Self::default()
        }
    }

    /// Number of state partitions each stateful step gets.
    pub fn partitions(&self) -> usize {
        match self.mode {
            ExecMode::Sequential => 1,
            ExecMode::Parallel {
                partitions: Some(p),
                ..
            } => p,
            ExecMode::Parallel {
                partitions: None, ..
            } => 2 * num_cpus::get().max(2),
        }
    }

    /// # Errors
    /// [`FlowError::InvalidConfig`] for a zero batch size, partition or thread count.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FlowError::InvalidConfig("batch_size must be positive".into()));
        }
        if let ExecMode::Parallel {
            threads, partitions,
        } = self.mode
        {
            if partitions == Some(0) {
                return Err(FlowError::InvalidConfig("partitions must be positive".into()));
            }
            if threads == Some(0) {
                return Err(FlowError::InvalidConfig("threads must be positive".into()));
            }
        }
        Ok(())
    }

    /// Execute `pipeline` until its input is exhausted or the run is stopped.
    ///
    /// Open windows are force-closed and emitted at end of stream. On failure
    /// everything emitted before the failing item has already reached the sink.
    ///
    /// # Errors
    /// The first [`FlowError`] raised by the input, a step or the sink.
    pub fn run(&self, pipeline: Pipeline) -> Result<RunSummary> {
        let span = info_span!("run", pipeline = %pipeline.name);
        let _enter = span.enter();

        self.validate()?;
        let partitions = self.partitions();
        let plan = build_plan(&pipeline);
        let Pipeline {
            name,
            input,
            output,
            ..
        } = pipeline;

        let stages = plan
            .stages
            .into_iter()
            .map(|stage| match stage {
                Stage::Fused(ops) => StageRun::Stateless(ops),
                Stage::Barrier { id, logic, .. } => {
                    let ctx = BuildContext {
                        step: id.clone(),
                        late_data: self.late_data,
                    };
                    let parts = (0..partitions).map(|_| logic.build(&ctx)).collect();
                    StageRun::Stateful { id, logic, parts }
                }
            })
            .collect();

        let pool = match self.mode {
            ExecMode::Parallel {
                threads: Some(t), ..
            } => Some(rayon::ThreadPoolBuilder::new().num_threads(t).build()?),
            _ => None,
        };

        let mut driver = Driver {
            stages,
            parallel: matches!(self.mode, ExecMode::Parallel { .. }),
            input,
            output,
            ingested: 0,
            emitted: 0,
            batches: 0,
        };

        if let Some(m) = &self.metrics {
            m.record_start();
        }
        info!(
            mode = ?self.mode,
            partitions,
            batch_size = self.batch_size,
            "run started"
        );

        let outcome = match &pool {
            Some(pool) => pool.install(|| self.drive(&mut driver)),
            None => self.drive(&mut driver),
        };

        let summary = RunSummary {
            pipeline: name,
            ingested: driver.ingested,
            emitted: driver.emitted,
            batches: driver.batches,
            stopped: matches!(outcome, Ok(true)),
            steps: driver.stats(),
        };
        if let Some(m) = &self.metrics {
            publish(m, &summary);
            m.record_end();
        }

        match outcome {
            Ok(_) => {
                info!(
                    ingested = summary.ingested,
                    emitted = summary.emitted,
                    stopped = summary.stopped,
                    "run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(
                    error = %e,
                    ingested = summary.ingested,
                    emitted = summary.emitted,
                    "run aborted"
                );
                Err(e)
            }
        }
    }

    /// Main loop. Returns whether the run was stopped.
    fn drive(&self, d: &mut Driver) -> Result<bool> {
        let mut stopped = false;
        loop {
            if self.stop.as_ref().is_some_and(StopHandle::is_stopped) {
                stopped = true;
                break;
            }

            let mut batch = Vec::with_capacity(self.batch_size);
            let mut exhausted = false;
            while batch.len() < self.batch_size {
                match d.input.source.next_item(&d.input.id)? {
                    Some(item) => batch.push(item),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                d.ingested += batch.len() as u64;
                d.batches += 1;
                d.step(0, batch)?;
            }
            if exhausted {
                break;
            }
        }

        if stopped && self.on_stop == StopPolicy::Discard {
            info!("stop requested, discarding open windows");
            d.discard();
        } else {
            if stopped {
                info!("stop requested, flushing open windows");
            }
            d.flush()?;
        }
        d.output.sink.close(&d.output.id)?;
        Ok(stopped)
    }
}

fn publish(metrics: &MetricsCollector, summary: &RunSummary) {
    metrics.set_counter("ingested", summary.ingested);
    metrics.set_counter("emitted", summary.emitted);
    metrics.set_counter("batches", summary.batches);
    for (step, stats) in &summary.steps {
        for (counter, value) in stats.counters() {
            metrics.set_counter(&format!("{step}.{counter}"), value);
        }
    }
}

enum StageRun {
    Stateless(Vec<(StepId, Arc<dyn StatelessOp>)>),
    Stateful {
        id: StepId,
        logic: Arc<dyn StatefulLogic>,
        parts: Vec<Box<dyn StatefulPartition>>,
    },
}

impl StageRun {
    /// Run `items` through this stage. Output produced before a failure is
    /// returned alongside the error.
    fn process(&mut self, items: Vec<Item>, parallel: bool) -> (Vec<Item>, Option<FlowError>) {
        match self {
            Self::Stateless(ops) => {
                let ops = &*ops;
                if parallel {
                    let results: Vec<_> = items
                        .into_par_iter()
                        .map(|item| {
                            let mut out = Vec::new();
                            let res = apply_fused(ops, item, &mut out);
                            (out, res)
                        })
                        .collect();
                    let mut out = Vec::with_capacity(results.len());
                    for (produced, res) in results {
                        out.extend(produced);
                        if let Err(e) = res {
                            return (out, Some(e));
                        }
                    }
                    (out, None)
                } else {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        if let Err(e) = apply_fused(ops, item, &mut out) {
                            return (out, Some(e));
                        }
                    }
                    (out, None)
                }
            }
            Self::Stateful { id, logic, parts } => {
                if let [only] = parts.as_mut_slice() {
                    let (out, res) = run_partition(only, items);
                    return (out, res.err());
                }

                let n = parts.len() as u64;
                let mut routed: Vec<Vec<Item>> = parts.iter().map(|_| Vec::new()).collect();
                for item in items {
                    match logic.route(id, &item) {
                        Ok(hash) => routed[(hash % n) as usize].push(item),
                        Err(e) => return (Vec::new(), Some(e)),
                    }
                }

                let results: Vec<_> = if parallel {
                    parts
                        .par_iter_mut()
                        .zip(routed.into_par_iter())
                        .map(|(p, batch)| run_partition(p, batch))
                        .collect()
                } else {
                    parts
                        .iter_mut()
                        .zip(routed)
                        .map(|(p, batch)| run_partition(p, batch))
                        .collect()
                };

                // Partitions hold disjoint keys, so every partition's output is kept.
                let mut out = Vec::new();
                let mut failed = None;
                for (produced, res) in results {
                    out.extend(produced);
                    if let Err(e) = res
                        && failed.is_none()
                    {
                        failed = Some(e);
                    }
                }
                (out, failed)
            }
        }
    }
}

fn apply_fused(ops: &[(StepId, Arc<dyn StatelessOp>)], item: Item, out: &mut Vec<Item>) -> Result<()> {
    let mut current = vec![item];
    for (id, op) in ops {
        let mut next = Vec::with_capacity(current.len());
        for it in current {
            op.apply(id, it, &mut next)?;
        }
        current = next;
    }
    out.extend(current);
    Ok(())
}

fn run_partition(part: &mut Box<dyn StatefulPartition>, items: Vec<Item>) -> (Vec<Item>, Result<()>) {
    let mut out = Vec::new();
    if items.is_empty() {
        return (out, Ok(()));
    }
    let res = items
        .into_iter()
        .try_for_each(|item| part.on_item(item, &mut out))
        .and_then(|()| part.on_batch_end(&mut out));
    (out, res)
}

struct Driver {
    stages: Vec<StageRun>,
    parallel: bool,
    input: InputStep,
    output: OutputStep,
    ingested: u64,
    emitted: u64,
    batches: u64,
}

impl Driver {
    /// Push `items` through the stages starting at `from`.
    fn push(&mut self, from: usize, mut items: Vec<Item>) -> (Vec<Item>, Option<FlowError>) {
        let mut failed = None;
        for stage in self.stages.iter_mut().skip(from) {
            if items.is_empty() {
                break;
            }
            let (out, err) = stage.process(items, self.parallel);
            items = out;
            if failed.is_none() {
                failed = err;
            }
        }
        (items, failed)
    }

    fn deliver(&mut self, items: Vec<Item>) -> Result<()> {
        for item in items {
            self.output.sink.write_item(&self.output.id, item)?;
            self.emitted += 1;
        }
        Ok(())
    }

    /// Push, deliver what came out, then report the first failure.
    fn step(&mut self, from: usize, items: Vec<Item>) -> Result<()> {
        let (out, failed) = self.push(from, items);
        self.deliver(out)?;
        failed.map_or(Ok(()), Err)
    }

    /// End-of-stream flush, upstream stateful steps first so their output can
    /// still be folded downstream.
    fn flush(&mut self) -> Result<()> {
        for i in 0..self.stages.len() {
            let StageRun::Stateful { id, parts, .. } = &mut self.stages[i] else {
                continue;
            };
            let mut out = Vec::new();
            let mut failed = None;
            for part in parts.iter_mut() {
                if let Err(e) = part.on_eof(&mut out)
                    && failed.is_none()
                {
                    failed = Some(e);
                }
            }
            debug!(step = %id, flushed = out.len(), "end of stream flush");

            let (rest, downstream) = self.push(i + 1, out);
            self.deliver(rest)?;
            if let Some(e) = failed.or(downstream) {
                return Err(e);
            }
        }
        Ok(())
    }

    fn discard(&mut self) {
        for stage in &mut self.stages {
            if let StageRun::Stateful { parts, .. } = stage {
                parts.iter_mut().for_each(|p| p.discard());
            }
        }
    }

    fn stats(&self) -> Vec<(String, StepStats)> {
        self.stages
            .iter()
            .filter_map(|stage| match stage {
                StageRun::Stateless(_) => None,
                StageRun::Stateful { id, parts, .. } => {
                    let mut total = StepStats::default();
                    parts.iter().for_each(|p| total.merge(&p.stats()));
                    Some((id.to_string(), total))
                }
            })
            .collect()
    }
}
