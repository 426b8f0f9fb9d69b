//! `reduce`: per-key reduction that emits when a completion predicate holds.
//!
//! The first value of a key seeds the accumulator; later values fold in with
//! the reducer. After every update the predicate decides whether the
//! accumulator is complete, in which case it is emitted and the key starts
//! fresh. Accumulators that never complete are discarded at end of stream.

use crate::error::{Result, guard};
use crate::node::{BuildContext, Item, StatefulLogic, StatefulPartition, StepStats};
use crate::node_id::StepId;
use crate::operators::route_hash;
use crate::state::KeyedStateStore;
use crate::stream::{StreamData, StreamKey};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct ReduceLogic<K, V, R, C> {
    reducer: Arc<R>,
    is_complete: Arc<C>,
    _t: PhantomData<fn(K, V)>,
}

impl<K, V, R, C> ReduceLogic<K, V, R, C> {
    pub fn new(reducer: R, is_complete: C) -> Self {
        Self {
            reducer: Arc::new(reducer),
            is_complete: Arc::new(is_complete),
            _t: PhantomData,
        }
    }
}

impl<K, V, R, C> StatefulLogic for ReduceLogic<K, V, R, C>
where
    K: StreamKey,
    V: StreamData,
    R: Fn(V, &V) -> V + Send + Sync + 'static,
    C: Fn(&V) -> bool + Send + Sync + 'static,
{
    fn route(&self, step: &StepId, item: &Item) -> Result<u64> {
        let (key, _) = item.peek::<(K, V)>(step)?;
        Ok(route_hash(key))
    }

    fn build(&self, ctx: &BuildContext) -> Box<dyn StatefulPartition> {
        Box::new(ReducePartition {
            step: ctx.step.clone(),
            reducer: Arc::clone(&self.reducer),
            is_complete: Arc::clone(&self.is_complete),
            store: KeyedStateStore::<K, V>::new(),
            stats: StepStats::default(),
        })
    }
}

struct ReducePartition<K, V, R, C> {
    step: StepId,
    reducer: Arc<R>,
    is_complete: Arc<C>,
    store: KeyedStateStore<K, V>,
    stats: StepStats,
}

impl<K, V, R, C> StatefulPartition for ReducePartition<K, V, R, C>
where
    K: StreamKey,
    V: StreamData,
    R: Fn(V, &V) -> V + Send + Sync + 'static,
    C: Fn(&V) -> bool + Send + Sync + 'static,
{
    fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<()> {
        let (epoch, (key, value)) = item.take::<(K, V)>(&self.step)?;
        let acc = match self.store.remove(&key) {
            Some(acc) => guard(self.step.as_str(), &(&key, &value), || {
                (self.reducer)(acc, &value)
            })?,
            None => {
                self.stats.windows_opened += 1;
                value
            }
        };
        let complete = guard(self.step.as_str(), &(&key, &acc), || (self.is_complete)(&acc))?;
        if complete {
            self.stats.windows_closed += 1;
            out.push(Item::new(epoch, (key, acc)));
        } else {
            self.store.insert(key, acc);
        }
        Ok(())
    }

    fn on_eof(&mut self, _out: &mut Vec<Item>) -> Result<()> {
        self.discard();
        Ok(())
    }

    fn discard(&mut self) {
        let pending = self.store.drain().len() as u64;
        if pending > 0 {
            debug!(step = %self.step, pending, "discarding incomplete accumulators");
        }
        self.stats.pending_discarded += pending;
    }

    fn stats(&self) -> StepStats {
        self.stats
    }
}
