//! `stateful_map`: per-key running state with one output per input.
//!
//! State is built on the first value of a key and replaced by whatever the
//! mapper returns. It never closes on its own, so nothing is emitted at end of
//! stream.

use crate::error::{Result, guard};
use crate::node::{BuildContext, Item, StatefulLogic, StatefulPartition, StepStats};
use crate::node_id::StepId;
use crate::operators::route_hash;
use crate::state::KeyedStateStore;
use crate::stream::{StreamData, StreamKey};
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) struct StatefulMapLogic<K, V, S, O, B, M> {
    builder: Arc<B>,
    mapper: Arc<M>,
    _t: PhantomData<fn(K, V) -> (S, O)>,
}

impl<K, V, S, O, B, M> StatefulMapLogic<K, V, S, O, B, M> {
    pub fn new(builder: B, mapper: M) -> Self {
        Self {
            builder: Arc::new(builder),
            mapper: Arc::new(mapper),
            _t: PhantomData,
        }
    }
}

impl<K, V, S, O, B, M> StatefulLogic for StatefulMapLogic<K, V, S, O, B, M>
where
    K: StreamKey,
    V: StreamData,
    S: Send + 'static,
    O: StreamData,
    B: Fn() -> S + Send + Sync + 'static,
    M: Fn(S, &V) -> (S, O) + Send + Sync + 'static,
{
    fn route(&self, step: &StepId, item: &Item) -> Result<u64> {
        let (key, _) = item.peek::<(K, V)>(step)?;
        Ok(route_hash(key))
    }

    fn build(&self, ctx: &BuildContext) -> Box<dyn StatefulPartition> {
        Box::new(StatefulMapPartition::<K, V, S, O, B, M> {
            step: ctx.step.clone(),
            builder: Arc::clone(&self.builder),
            mapper: Arc::clone(&self.mapper),
            store: KeyedStateStore::new(),
            stats: StepStats::default(),
            _t: PhantomData,
        })
    }
}

struct StatefulMapPartition<K, V, S, O, B, M> {
    step: StepId,
    builder: Arc<B>,
    mapper: Arc<M>,
    store: KeyedStateStore<K, S>,
    stats: StepStats,
    _t: PhantomData<fn(V) -> O>,
}

impl<K, V, S, O, B, M> StatefulPartition for StatefulMapPartition<K, V, S, O, B, M>
where
    K: StreamKey,
    V: StreamData,
    S: Send + 'static,
    O: StreamData,
    B: Fn() -> S + Send + Sync + 'static,
    M: Fn(S, &V) -> (S, O) + Send + Sync + 'static,
{
    fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<()> {
        let (epoch, (key, value)) = item.take::<(K, V)>(&self.step)?;
        let input = (&key, &value);
        let state = match self.store.remove(&key) {
            Some(state) => state,
            None => {
                self.stats.windows_opened += 1;
                guard(self.step.as_str(), &input, || (self.builder)())?
            }
        };
        let (state, output) = guard(self.step.as_str(), &input, || (self.mapper)(state, &value))?;
        self.store.insert(key.clone(), state);
        out.push(Item::new(epoch, (key, output)));
        Ok(())
    }

    fn on_eof(&mut self, _out: &mut Vec<Item>) -> Result<()> {
        self.store.drain();
        Ok(())
    }

    fn discard(&mut self) {
        self.store.drain();
    }

    fn stats(&self) -> StepStats {
        self.stats
    }
}
