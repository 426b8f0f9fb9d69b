//! Windowed aggregation: `fold_window`, `reduce_window` and `collect_window`.
//!
//! All three share one partition implementation and differ only in their
//! [`WindowAggregator`]. For every item the partition:
//!
//! 1. resolves the window time through the step's [`ClockConfig`],
//! 2. rejects the item if it is late for its key (see [`watermark`](crate::watermark)),
//! 3. places it in a window (tumbling bucket, or a session that may absorb
//!    neighbours) and folds it into that window's accumulator,
//! 4. advances the key's watermark.
//!
//! At the end of the micro-batch every key whose watermark moved closes the
//! windows that are now complete, emitting `(key, (window_id, acc))` in
//! `(end, open order)`.
//!
//! Session records keep the values they were built from. When an item arrives
//! with a time earlier than the session's latest item, or when sessions merge,
//! the accumulator is replayed from that log in time order so the result does
//! not depend on arrival order.

use crate::assigner::{SessionAssigner, TumblingAssigner, WindowAssigner};
use crate::clock::ClockConfig;
use crate::error::{FlowError, Result, guard};
use crate::node::{BuildContext, Item, StatefulLogic, StatefulPartition, StepStats};
use crate::node_id::StepId;
use crate::operators::route_hash;
use crate::state::WindowedStateStore;
use crate::stream::{StreamData, StreamKey};
use crate::watermark::{CompletionTracker, LateDataPolicy, WindowStatus};
use crate::window::{TimestampMs, Window, WindowConfig, WindowId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a window accumulator is started and grown.
pub(crate) trait WindowAggregator<V, A>: Send + Sync + 'static {
    fn seed(&self, value: &V) -> A;
    fn fold(&self, acc: A, value: &V) -> A;
}

/// `builder()` then `folder(acc, value)` for every value.
pub(crate) struct FoldAggregator<B, F> {
    pub builder: B,
    pub folder: F,
}

impl<V, A, B, F> WindowAggregator<V, A> for FoldAggregator<B, F>
where
    B: Fn() -> A + Send + Sync + 'static,
    F: Fn(A, &V) -> A + Send + Sync + 'static,
{
    fn seed(&self, value: &V) -> A {
        (self.folder)((self.builder)(), value)
    }

    fn fold(&self, acc: A, value: &V) -> A {
        (self.folder)(acc, value)
    }
}

/// The first value seeds the accumulator.
pub(crate) struct ReduceAggregator<R>(pub R);

impl<V, R> WindowAggregator<V, V> for ReduceAggregator<R>
where
    V: Clone,
    R: Fn(V, &V) -> V + Send + Sync + 'static,
{
    fn seed(&self, value: &V) -> V {
        value.clone()
    }

    fn fold(&self, acc: V, value: &V) -> V {
        (self.0)(acc, value)
    }
}

pub(crate) struct CollectAggregator;

impl<V: Clone> WindowAggregator<V, Vec<V>> for CollectAggregator {
    fn seed(&self, value: &V) -> Vec<V> {
        vec![value.clone()]
    }

    fn fold(&self, mut acc: Vec<V>, value: &V) -> Vec<V> {
        acc.push(value.clone());
        acc
    }
}

pub(crate) struct WindowedLogic<K, V, A, G> {
    clock: ClockConfig,
    window: WindowConfig,
    agg: Arc<G>,
    _t: PhantomData<fn(K, V) -> A>,
}

impl<K, V, A, G> WindowedLogic<K, V, A, G> {
    /// `window` must already be validated.
    pub fn new(clock: ClockConfig, window: WindowConfig, agg: G) -> Self {
        Self {
            clock,
            window,
            agg: Arc::new(agg),
            _t: PhantomData,
        }
    }
}

impl<K, V, A, G> StatefulLogic for WindowedLogic<K, V, A, G>
where
    K: StreamKey,
    V: StreamData,
    A: StreamData,
    G: WindowAggregator<V, A>,
{
    fn route(&self, step: &StepId, item: &Item) -> Result<u64> {
        let (key, _) = item.peek::<(K, V)>(step)?;
        Ok(route_hash(key))
    }

    fn build(&self, ctx: &BuildContext) -> Box<dyn StatefulPartition> {
        Box::new(WindowedPartition::<K, V, A, G> {
            clock: self.clock.clone(),
            assigner: WindowAssigner::from_config(&self.window),
            state: WindowState {
                step: ctx.step.clone(),
                late_data: ctx.late_data,
                agg: Arc::clone(&self.agg),
                store: WindowedStateStore::new(),
                tracker: CompletionTracker::new(),
                stats: StepStats::default(),
                next_seq: 0,
                _t: PhantomData,
            },
            pending: Vec::new(),
            pending_index: HashMap::new(),
            last_epoch: None,
        })
    }
}

struct WindowRecord<V, A> {
    extent: Window,
    status: WindowStatus,
    acc: Option<A>,
    /// Session values with their window times; empty for tumbling windows.
    log: Vec<(TimestampMs, V)>,
    last_time: TimestampMs,
    seq: u64,
}

impl<V, A> WindowRecord<V, A> {
    fn open(extent: Window, seq: u64) -> Self {
        Self {
            extent,
            status: WindowStatus::Open,
            acc: None,
            log: Vec::new(),
            last_time: TimestampMs::MIN,
            seq,
        }
    }
}

struct WindowedPartition<K, V, A, G> {
    clock: ClockConfig,
    assigner: WindowAssigner,
    state: WindowState<K, V, A, G>,
    /// Keys whose watermark moved in this batch, with the epoch of the item that moved it last.
    pending: Vec<(K, TimestampMs)>,
    pending_index: HashMap<K, usize>,
    last_epoch: Option<TimestampMs>,
}

struct WindowState<K, V, A, G> {
    step: StepId,
    late_data: LateDataPolicy,
    agg: Arc<G>,
    store: WindowedStateStore<K, WindowRecord<V, A>>,
    tracker: CompletionTracker<K>,
    stats: StepStats,
    next_seq: u64,
    _t: PhantomData<fn(V) -> A>,
}

impl<K, V, A, G> WindowState<K, V, A, G>
where
    K: StreamKey,
    V: StreamData,
    A: StreamData,
    G: WindowAggregator<V, A>,
{
    /// Drop or fail on a late item, per policy. Returns `Ok(false)` when dropped.
    fn reject_late(&mut self, key: &K, time: TimestampMs) -> Result<bool> {
        let watermark = self.tracker.progress(key).applied;
        match self.late_data {
            LateDataPolicy::Drop => {
                self.stats.late_dropped += 1;
                warn!(step = %self.step, key = ?key, time, watermark, "dropping late item");
                Ok(false)
            }
            LateDataPolicy::Fail => Err(FlowError::LateData {
                step: self.step.to_string(),
                key: format!("{key:?}"),
                time,
                watermark,
            }),
        }
    }

    fn note_opened(&mut self, key: &K, id: WindowId, extent: Window) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.stats.windows_opened += 1;
        debug!(step = %self.step, key = ?key, window = %id, start = extent.start, end = extent.end, "window opened");
        seq
    }

    fn place_tumbling(
        &mut self,
        tumbling: &TumblingAssigner,
        key: &K,
        time: TimestampMs,
        value: V,
    ) -> Result<bool> {
        let Some((id, extent)) = tumbling.assign(time) else {
            return Err(FlowError::BeforeAlignment {
                step: self.step.to_string(),
                time,
                align_to: tumbling.align_to(),
            });
        };
        if tumbling.is_closed(&extent, self.tracker.progress(key).applied) {
            return self.reject_late(key, time);
        }

        let seq = if self.store.contains(key, id) {
            0
        } else {
            self.note_opened(key, id, extent)
        };
        let rec = self
            .store
            .get_or_create(key, id, || WindowRecord::open(extent, seq));
        debug_assert_eq!(rec.status, WindowStatus::Open);
        rec.acc = Some(fold_one(
            self.agg.as_ref(),
            &self.step,
            key,
            rec.acc.take(),
            &value,
        )?);
        rec.last_time = rec.last_time.max(time);
        Ok(true)
    }

    fn place_session(
        &mut self,
        sessions: &mut SessionAssigner,
        key: &K,
        time: TimestampMs,
        value: V,
    ) -> Result<bool> {
        let progress = self.tracker.progress(key);
        let gap = sessions.gap_ms();
        let open: Vec<(WindowId, Window)> = self
            .store
            .windows(key)
            .map(|(id, rec)| (id, rec.extent))
            .collect();
        let attaches = open.iter().any(|(_, w)| w.distance_to(time) <= gap);
        if time <= progress.closed_through
            || (!attaches && time.saturating_add(gap) < progress.applied)
        {
            return self.reject_late(key, time);
        }

        let plan = sessions.plan(open, time);
        let seq = if plan.opened {
            self.note_opened(key, plan.survivor, plan.extent)
        } else {
            0
        };

        let mut absorbed_log = Vec::new();
        for id in &plan.absorbed {
            if let Some(rec) = self.store.remove(key, *id) {
                absorbed_log.extend(rec.log);
            }
            self.stats.sessions_merged += 1;
            debug!(step = %self.step, key = ?key, survivor = %plan.survivor, absorbed = %id, "sessions merged");
        }

        let rec = self
            .store
            .get_or_create(key, plan.survivor, || WindowRecord::open(plan.extent, seq));
        debug_assert_eq!(rec.status, WindowStatus::Open);
        rec.extent = plan.extent;

        if plan.absorbed.is_empty() && time >= rec.last_time {
            rec.acc = Some(fold_one(
                self.agg.as_ref(),
                &self.step,
                key,
                rec.acc.take(),
                &value,
            )?);
            rec.log.push((time, value));
        } else {
            rec.log.extend(absorbed_log);
            rec.log.push((time, value));
            rec.log.sort_by_key(|(t, _)| *t);
            rec.acc = replay(self.agg.as_ref(), &self.step, key, &rec.log)?;
        }
        rec.last_time = rec.last_time.max(time);
        Ok(true)
    }

    /// Close every window of `key` that is complete at `watermark`.
    fn close_ready(
        &mut self,
        assigner: &WindowAssigner,
        key: &K,
        watermark: TimestampMs,
        epoch: TimestampMs,
        out: &mut Vec<Item>,
    ) {
        let mut ready: Vec<(WindowId, Window, u64)> = self
            .store
            .windows(key)
            .filter(|(_, rec)| assigner.is_closed(&rec.extent, watermark))
            .map(|(id, rec)| (id, rec.extent, rec.seq))
            .collect();
        ready.sort_by_key(|(_, extent, seq)| (extent.end, *seq));

        for (id, extent, _) in ready {
            let Some(rec) = self.store.remove(key, id) else {
                continue;
            };
            self.tracker.mark_closed(key, assigner.reach(&extent));
            self.emit(key.clone(), id, rec, epoch, out);
        }
    }

    fn emit(
        &mut self,
        key: K,
        id: WindowId,
        mut rec: WindowRecord<V, A>,
        epoch: TimestampMs,
        out: &mut Vec<Item>,
    ) {
        rec.status = WindowStatus::Closed;
        self.stats.windows_closed += 1;
        debug!(step = %self.step, key = ?key, window = %id, start = rec.extent.start, end = rec.extent.end, "window closed");
        if let Some(acc) = rec.acc {
            out.push(Item::new(epoch, (key, (id, acc))));
        }
    }
}

fn fold_one<V: Debug, A, G: WindowAggregator<V, A>>(
    agg: &G,
    step: &StepId,
    key: &dyn Debug,
    acc: Option<A>,
    value: &V,
) -> Result<A> {
    guard(step.as_str(), &(key, value), || match acc {
        Some(acc) => agg.fold(acc, value),
        None => agg.seed(value),
    })
}

fn replay<V: Debug, A, G: WindowAggregator<V, A>>(
    agg: &G,
    step: &StepId,
    key: &dyn Debug,
    log: &[(TimestampMs, V)],
) -> Result<Option<A>> {
    let mut acc = None;
    for (_, value) in log {
        acc = Some(fold_one(agg, step, key, acc, value)?);
    }
    Ok(acc)
}

impl<K, V, A, G> StatefulPartition for WindowedPartition<K, V, A, G>
where
    K: StreamKey,
    V: StreamData,
    A: StreamData,
    G: WindowAggregator<V, A>,
{
    fn on_item(&mut self, item: Item, _out: &mut Vec<Item>) -> Result<()> {
        let (epoch, (key, value)) = item.take::<(K, V)>(&self.state.step)?;
        self.last_epoch = Some(self.last_epoch.map_or(epoch, |e| e.max(epoch)));
        let time = self.clock.time_for(epoch);

        let placed = match &mut self.assigner {
            WindowAssigner::Tumbling(t) => self.state.place_tumbling(t, &key, time, value)?,
            WindowAssigner::Session(s) => self.state.place_session(s, &key, time, value)?,
        };
        if !placed {
            return Ok(());
        }

        let (_, advanced) = self.state.tracker.observe(&key, time);
        if advanced {
            match self.pending_index.get(&key) {
                Some(&i) => self.pending[i].1 = epoch,
                None => {
                    self.pending_index.insert(key.clone(), self.pending.len());
                    self.pending.push((key, epoch));
                }
            }
        }
        Ok(())
    }

    fn on_batch_end(&mut self, out: &mut Vec<Item>) -> Result<()> {
        self.pending_index.clear();
        for (key, epoch) in std::mem::take(&mut self.pending) {
            let watermark = self.state.tracker.apply(&key);
            self.state
                .close_ready(&self.assigner, &key, watermark, epoch, out);
        }
        Ok(())
    }

    fn on_eof(&mut self, out: &mut Vec<Item>) -> Result<()> {
        let epoch = self.last_epoch.unwrap_or_default();
        let drained = self.state.store.drain();

        // Keys stay in first-touch order; within a key, close in (end, open order).
        let mut ordered = Vec::with_capacity(drained.len());
        let mut key_index = 0usize;
        let mut previous: Option<K> = None;
        for (key, id, rec) in drained {
            if previous.as_ref().is_some_and(|p| *p != key) {
                key_index += 1;
            }
            previous = Some(key.clone());
            ordered.push((key_index, rec.extent.end, rec.seq, key, id, rec));
        }
        ordered.sort_by_key(|(k, end, seq, ..)| (*k, *end, *seq));

        for (_, _, _, key, id, rec) in ordered {
            self.state.emit(key, id, rec, epoch, out);
        }
        Ok(())
    }

    fn discard(&mut self) {
        let pending = self.state.store.drain().len() as u64;
        if pending > 0 {
            debug!(step = %self.state.step, pending, "discarding open windows");
        }
        self.state.stats.pending_discarded += pending;
    }

    fn stats(&self) -> StepStats {
        self.state.stats
    }
}
