use chrono::NaiveDate;
use log::debug;
use crate::layout::{Layout, LayoutNode};

/// Largest difference between the requested and the applied scroll offset that counts as landed.
pub const SCROLL_TOLERANCE: f64 = 2.0;

/// A requested navigation. Stamps only ever grow, so an older target can always be told apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollTarget {
    pub date: NaiveDate,
    pub stamp: u64,
}

/// Collapse-to-latest worker slot for jumps: one jump runs, at most one waits.
///
/// `propose` either starts a jump (returns the date to run) or parks the date, replacing any
/// date parked before it. `finish` hands out the parked date, or goes idle.
#[derive(Debug, Default)]
pub struct JumpController {
    busy: bool,
    pending: Option<NaiveDate>,
    stamp: u64,
}

impl JumpController {
    pub fn propose(&mut self, date: NaiveDate) -> Option<NaiveDate> {
        if self.busy {
            if let Some(replaced) = self.pending.replace(date) {
                debug!("jump to {} superseded by {}", replaced, date);
            }
            return None;
        }
        self.busy = true;
        Some(date)
    }

    pub fn finish(&mut self) -> Option<NaiveDate> {
        let next = self.pending.take();
        if next.is_none() {
            self.busy = false;
        }
        next
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn pending(&self) -> Option<NaiveDate> {
        self.pending
    }

    /// Drops the parked date and goes idle. Used when the filter changes under a running jump.
    /// Targets handed out before the cancel stop being current.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.busy = false;
        self.stamp += 1;
    }

    pub fn next_target(&mut self, date: NaiveDate) -> ScrollTarget {
        self.stamp += 1;
        ScrollTarget { date, stamp: self.stamp }
    }

    pub fn is_current(&self, target: &ScrollTarget) -> bool {
        target.stamp == self.stamp
    }
}

/// Node index a target date should scroll to: the exact header when present, otherwise the
/// closest header (the newer one only when strictly closer), otherwise the first node.
pub fn resolve_scroll_target(nodes: &[LayoutNode], date: NaiveDate) -> Option<usize> {
    if nodes.is_empty() {
        return None;
    }
    let mut older: Option<(usize, NaiveDate)> = None;
    let mut newer: Option<(usize, NaiveDate)> = None;
    for (idx, node) in nodes.iter().enumerate().filter(|(_, n)| n.is_header()) {
        if node.date == date {
            return Some(idx);
        }
        if node.date < date && older.map_or(true, |(_, d)| node.date > d) {
            older = Some((idx, node.date));
        }
        if node.date > date && newer.map_or(true, |(_, d)| node.date < d) {
            newer = Some((idx, node.date));
        }
    }
    let picked = match (older, newer) {
        (Some((older_idx, older_date)), Some((newer_idx, newer_date))) => {
            if (newer_date - date).num_days() < (date - older_date).num_days() {
                newer_idx
            } else {
                older_idx
            }
        }
        (Some((idx, _)), None) | (None, Some((idx, _))) => idx,
        (None, None) => 0,
    };
    Some(picked)
}

/// A programmatic scroll that stays pending until the surface reports it actually landed.
#[derive(Debug, Default)]
pub struct PendingScroll {
    target: Option<ScrollTarget>,
}

impl PendingScroll {
    pub fn request(&mut self, target: ScrollTarget) {
        self.target = Some(target);
    }

    pub fn target(&self) -> Option<ScrollTarget> {
        self.target
    }

    pub fn clear(&mut self) {
        self.target = None;
    }

    /// Offset to apply this frame, if a scroll is pending and the layout can place it.
    pub fn resolve(&self, layout: &Layout) -> Option<f64> {
        let target = self.target?;
        let idx = resolve_scroll_target(layout.nodes(), target.date)?;
        Some(layout.nodes()[idx].top)
    }

    /// Compares what the surface applied against what was asked. A clamped scroll stays pending.
    pub fn confirm(&mut self, requested_top: f64, actual_top: f64) -> bool {
        if (actual_top - requested_top).abs() > SCROLL_TOLERANCE {
            debug!("scroll clamped at {} instead of {}, retrying", actual_top, requested_top);
            return false;
        }
        self.target = None;
        true
    }
}

/// Keeps the first loaded item visually still while older items are prepended above it.
#[derive(Debug, Default)]
pub struct AnchorTracker {
    anchor: Option<(String, f64)>,
}

impl AnchorTracker {
    pub fn capture(&mut self, layout: &Layout, anchor_id: Option<&str>) {
        self.anchor = anchor_id.and_then(|id| layout.top_of_entry(id).map(|top| (id.to_string(), top)));
    }

    pub fn is_armed(&self) -> bool {
        self.anchor.is_some()
    }

    /// Height added above the anchor: its new top minus its old one.
    pub fn take_delta(&mut self, layout: &Layout) -> Option<f64> {
        let (id, old_top) = self.anchor.take()?;
        let new_top = layout.top_of_entry(&id)?;
        debug!("anchor {} moved from {} to {}", id, old_top, new_top);
        Some(new_top - old_top)
    }
}

/// Reports the date of the nearest header at or above the first visible node, once per change.
#[derive(Debug, Default)]
pub struct VisibleDateTracker {
    current: Option<NaiveDate>,
}

impl VisibleDateTracker {
    pub fn observe(&mut self, nodes: &[LayoutNode], first_visible: usize) -> Option<NaiveDate> {
        let start = first_visible.min(nodes.len().checked_sub(1)?);
        let date = nodes[..=start].iter().rev().find(|n| n.is_header()).map(|n| n.date)?;
        if self.current == Some(date) {
            return None;
        }
        self.current = Some(date);
        Some(date)
    }

    /// Sets the date without reporting it, e.g. after a jump already announced it.
    pub fn set(&mut self, date: NaiveDate) {
        self.current = Some(date);
    }

    pub fn current(&self) -> Option<NaiveDate> {
        self.current
    }
}
