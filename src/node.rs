//! Type-erased building blocks of a pipeline.
//!
//! The typed builder in [`stream`](crate::stream) checks closure signatures at
//! compile time and then erases them into the trait objects defined here, so
//! the runner can drive a heterogeneous chain of steps over one element type:
//! [`Element`], a boxed `dyn Any`.
//!
//! Every step is a [`Node`], a closed set of variants tagged with a
//! [`StepKind`]. Stateless nodes carry a [`StatelessOp`]; stateful nodes carry a
//! [`StatefulLogic`] that knows how to route items by key and how to build the
//! independent [`StatefulPartition`]s that own the key state at run time.

use crate::error::{FlowError, Result};
use crate::node_id::StepId;
use crate::watermark::LateDataPolicy;
use crate::window::TimestampMs;
use serde::Serialize;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

pub(crate) type Element = Box<dyn Any + Send>;

/// One value in flight together with its epoch.
pub(crate) struct Item {
    pub epoch: TimestampMs,
    pub value: Element,
}

impl Item {
    pub fn new<T: Any + Send>(epoch: TimestampMs, value: T) -> Self {
        Self {
            epoch,
            value: Box::new(value),
        }
    }

    /// Unbox the value as `T`.
    pub fn take<T: Any>(self, step: &StepId) -> Result<(TimestampMs, T)> {
        match self.value.downcast::<T>() {
            Ok(v) => Ok((self.epoch, *v)),
            Err(_) => Err(mismatch::<T>(step)),
        }
    }

    pub fn peek<T: Any>(&self, step: &StepId) -> Result<&T> {
        self.value.downcast_ref::<T>().ok_or_else(|| mismatch::<T>(step))
    }
}

fn mismatch<T>(step: &StepId) -> FlowError {
    FlowError::TypeMismatch {
        step: step.to_string(),
        expected: type_name::<T>(),
    }
}

/// Closed set of operator kinds a pipeline can contain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Filter,
    FilterMap,
    FlatMap,
    Map,
    Inspect,
    InspectEpoch,
    Reduce,
    FoldWindow,
    ReduceWindow,
    CollectWindow,
    StatefulMap,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::FilterMap => "filter_map",
            Self::FlatMap => "flat_map",
            Self::Map => "map",
            Self::Inspect => "inspect",
            Self::InspectEpoch => "inspect_epoch",
            Self::Reduce => "reduce",
            Self::FoldWindow => "fold_window",
            Self::ReduceWindow => "reduce_window",
            Self::CollectWindow => "collect_window",
            Self::StatefulMap => "stateful_map",
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            Self::Reduce | Self::FoldWindow | Self::ReduceWindow | Self::CollectWindow | Self::StatefulMap
        )
    }

    pub fn is_windowed(&self) -> bool {
        matches!(self, Self::FoldWindow | Self::ReduceWindow | Self::CollectWindow)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pure item-to-items transformation.
pub(crate) trait StatelessOp: Send + Sync {
    /// Apply to one item, appending zero or more results to `out`.
    fn apply(&self, step: &StepId, item: Item, out: &mut Vec<Item>) -> Result<()>;
}

/// Run-time settings handed to a stateful step when its partitions are built.
#[derive(Clone, Debug)]
pub(crate) struct BuildContext {
    pub step: StepId,
    pub late_data: LateDataPolicy,
}

/// Counters reported by a stateful step.
///
/// For the unwindowed `reduce` a window is the accumulator of one key between
/// creation and completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    pub late_dropped: u64,
    pub windows_opened: u64,
    pub windows_closed: u64,
    pub sessions_merged: u64,
    pub pending_discarded: u64,
}

impl StepStats {
    pub fn merge(&mut self, other: &StepStats) {
        self.late_dropped += other.late_dropped;
        self.windows_opened += other.windows_opened;
        self.windows_closed += other.windows_closed;
        self.sessions_merged += other.sessions_merged;
        self.pending_discarded += other.pending_discarded;
    }

    /// `(counter, value)` pairs, used for metrics export.
    pub fn counters(&self) -> [(&'static str, u64); 5] {
        [
            ("late_dropped", self.late_dropped),
            ("windows_opened", self.windows_opened),
            ("windows_closed", self.windows_closed),
            ("sessions_merged", self.sessions_merged),
            ("pending_discarded", self.pending_discarded),
        ]
    }
}

/// Shared description of a stateful step.
pub(crate) trait StatefulLogic: Send + Sync {
    /// Hash of the item's key. Items with equal keys must hash equally.
    fn route(&self, step: &StepId, item: &Item) -> Result<u64>;

    /// A fresh, empty partition.
    fn build(&self, ctx: &BuildContext) -> Box<dyn StatefulPartition>;
}

/// The state of one stateful step for the subset of keys routed to it.
pub(crate) trait StatefulPartition: Send {
    fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<()>;

    /// Called after every item of a micro-batch went through `on_item`.
    fn on_batch_end(&mut self, _out: &mut Vec<Item>) -> Result<()> {
        Ok(())
    }

    /// Force-close everything still open (end of stream).
    fn on_eof(&mut self, out: &mut Vec<Item>) -> Result<()>;

    /// Drop everything still open without emitting it.
    fn discard(&mut self);

    fn stats(&self) -> StepStats;
}

#[derive(Clone)]
pub(crate) enum Node {
    Stateless {
        id: StepId,
        kind: StepKind,
        op: Arc<dyn StatelessOp>,
    },
    Stateful {
        id: StepId,
        kind: StepKind,
        logic: Arc<dyn StatefulLogic>,
    },
}

impl Node {
    pub fn id(&self) -> &StepId {
        match self {
            Self::Stateless { id, .. } | Self::Stateful { id, .. } => id,
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Self::Stateless { kind, .. } | Self::Stateful { kind, .. } => *kind,
        }
    }
}
