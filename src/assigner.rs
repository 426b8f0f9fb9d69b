//! Window assignment: which window does an item at time `ts` belong to?
//!
//! Tumbling assignment is pure arithmetic over `(length, align_to)`. Session
//! assignment depends on the sessions a key currently has open, so the
//! [`SessionAssigner`] only *plans* the placement: it picks the session that
//! receives the item, computes the grown extent, and lists the sessions that
//! the growth makes mergeable. The windowed operator applies the plan to its
//! state store, which is the arena that owns session records by [`WindowId`].

use crate::window::{TimestampMs, Window, WindowConfig, WindowId, duration_ms};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TumblingAssigner {
    length_ms: i64,
    align_to: TimestampMs,
}

impl TumblingAssigner {
    pub fn new(length_ms: i64, align_to: TimestampMs) -> Self {
        debug_assert!(length_ms > 0);
        Self { length_ms, align_to }
    }

    /// Bucket of `ts`, or `None` when `ts` falls before `align_to`.
    pub fn assign(&self, ts: TimestampMs) -> Option<(WindowId, Window)> {
        if ts < self.align_to {
            return None;
        }
        let index = Window::bucket(ts, self.length_ms, self.align_to);
        Some((WindowId(index), Window::tumble(index, self.length_ms, self.align_to)))
    }

    pub fn align_to(&self) -> TimestampMs {
        self.align_to
    }

    /// `[start, end)` is complete once the watermark reaches `end`.
    #[inline]
    pub fn is_closed(&self, window: &Window, watermark: TimestampMs) -> bool {
        watermark >= window.end
    }
}

/// Outcome of placing one item among a key's open sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPlan {
    /// Session that owns the item after any merges.
    pub survivor: WindowId,
    /// True when the survivor was opened by this item.
    pub opened: bool,
    /// Extent of the survivor after placement and merges.
    pub extent: Window,
    /// Sessions folded into the survivor; their records must be removed.
    pub absorbed: Vec<WindowId>,
}

#[derive(Clone, Debug)]
pub struct SessionAssigner {
    gap_ms: i64,
    next_id: i64,
}

impl SessionAssigner {
    pub fn new(gap_ms: i64) -> Self {
        debug_assert!(gap_ms > 0);
        Self { gap_ms, next_id: 0 }
    }

    pub fn gap_ms(&self) -> i64 {
        self.gap_ms
    }

    /// Decide where an item at `ts` goes, given the key's open sessions.
    ///
    /// The item joins the nearest session whose extent lies within `gap` of
    /// `ts` (the older session wins a tie); otherwise it opens a new session.
    /// Growing the receiving session may bring other sessions within `gap`;
    /// all of those collapse into the oldest participating id.
    pub fn plan<I>(&mut self, open: I, ts: TimestampMs) -> SessionPlan
    where
        I: IntoIterator<Item = (WindowId, Window)>,
    {
        let mut open: Vec<(WindowId, Window)> = open.into_iter().collect();
        open.sort_by_key(|(id, _)| *id);

        let nearest = open
            .iter()
            .filter(|(_, w)| w.distance_to(ts) <= self.gap_ms)
            .min_by_key(|(id, w)| (w.distance_to(ts), *id))
            .copied();

        let (mut survivor, mut extent, opened) = match nearest {
            Some((id, w)) => {
                open.retain(|(other, _)| *other != id);
                let mut grown = w;
                grown.extend_to(ts);
                (id, grown, false)
            }
            None => {
                let id = WindowId(self.next_id);
                self.next_id += 1;
                (id, Window::point(ts), true)
            }
        };

        let mut absorbed = Vec::new();
        loop {
            let Some(pos) = open
                .iter()
                .position(|(_, w)| w.distance(&extent) <= self.gap_ms)
            else {
                break;
            };
            let (id, w) = open.remove(pos);
            extent = extent.union(&w);
            if id < survivor {
                absorbed.push(survivor);
                survivor = id;
            } else {
                absorbed.push(id);
            }
        }

        SessionPlan {
            survivor,
            opened,
            extent,
            absorbed,
        }
    }

    /// A session `[start, end]` is complete once the watermark passes `end + gap`:
    /// no later item can attach to it.
    #[inline]
    pub fn is_closed(&self, extent: &Window, watermark: TimestampMs) -> bool {
        watermark > extent.end.saturating_add(self.gap_ms)
    }

    /// Latest time an item would still reach the closed session `extent`.
    #[inline]
    pub fn reach(&self, extent: &Window) -> TimestampMs {
        extent.end.saturating_add(self.gap_ms)
    }
}

#[derive(Clone, Debug)]
pub enum WindowAssigner {
    Tumbling(TumblingAssigner),
    Session(SessionAssigner),
}

impl WindowAssigner {
    /// Build from an already validated configuration.
    pub fn from_config(config: &WindowConfig) -> Self {
        match *config {
            WindowConfig::Tumbling { length, align_to } => {
                Self::Tumbling(TumblingAssigner::new(duration_ms(length), align_to))
            }
            WindowConfig::Session { gap } => Self::Session(SessionAssigner::new(duration_ms(gap))),
        }
    }

    pub fn is_closed(&self, extent: &Window, watermark: TimestampMs) -> bool {
        match self {
            Self::Tumbling(t) => t.is_closed(extent, watermark),
            Self::Session(s) => s.is_closed(extent, watermark),
        }
    }

    /// Closed-through mark recorded when `extent` closes.
    pub fn reach(&self, extent: &Window) -> TimestampMs {
        match self {
            Self::Tumbling(_) => extent.end,
            Self::Session(s) => s.reach(extent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1_000;

    fn no_sessions() -> Vec<(WindowId, Window)> {
        Vec::new()
    }

    #[test]
    fn tumbling_groups_items_within_one_length() {
        let t0 = 1_672_531_200_000; // 2023-01-01T00:00:00Z
        let a = TumblingAssigner::new(SEC, t0);
        let (w1, _) = a.assign(t0 + 200).unwrap();
        let (w2, _) = a.assign(t0 + 900).unwrap();
        let (w3, ext3) = a.assign(t0 + 1_100).unwrap();
        assert_eq!(w1, w2);
        assert!(w3 > w1);
        assert_eq!(ext3, Window::new(t0 + SEC, t0 + 2 * SEC));
    }

    #[test]
    fn tumbling_rejects_before_alignment() {
        let a = TumblingAssigner::new(SEC, 10_000);
        assert!(a.assign(9_999).is_none());
        assert!(a.assign(10_000).is_some());
    }

    #[test]
    fn tumbling_closes_at_end_boundary() {
        let a = TumblingAssigner::new(SEC, 0);
        let w = Window::new(0, SEC);
        assert!(!a.is_closed(&w, SEC - 1));
        assert!(a.is_closed(&w, SEC));
    }

    #[test]
    fn session_attaches_within_gap_and_opens_beyond() {
        let mut s = SessionAssigner::new(SEC);
        let first = s.plan(no_sessions(), 0);
        assert!(first.opened);

        let second = s.plan(vec![(first.survivor, first.extent)], 500);
        assert_eq!(second.survivor, first.survivor);
        assert!(!second.opened);
        assert_eq!(second.extent, Window::new(0, 500));

        let third = s.plan(vec![(second.survivor, second.extent)], 3 * SEC);
        assert!(third.opened);
        assert_ne!(third.survivor, first.survivor);
    }

    #[test]
    fn session_bridge_merges_into_oldest() {
        let mut s = SessionAssigner::new(SEC);
        let a = s.plan(no_sessions(), 0);
        let b = s.plan(vec![(a.survivor, a.extent)], 1_800);
        assert!(b.opened);

        // 900 is within the gap of both sessions.
        let plan = s.plan(vec![(a.survivor, a.extent), (b.survivor, b.extent)], 900);
        assert_eq!(plan.survivor, a.survivor);
        assert_eq!(plan.absorbed, vec![b.survivor]);
        assert_eq!(plan.extent, Window::new(0, 1_800));
    }

    #[test]
    fn session_closes_after_gap_passes() {
        let s = SessionAssigner::new(SEC);
        let ext = Window::new(0, 500);
        assert!(!s.is_closed(&ext, 1_500));
        assert!(s.is_closed(&ext, 1_501));
    }
}
