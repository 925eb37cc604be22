use crate::layout::LayoutNode;

pub const OVERSCAN: usize = 3;
/// Distance, in viewport heights, at which the edges of the loaded window count as reached.
pub const EDGE_THRESHOLD: f64 = 1.5;

/// Half-open range of node indices. `start == end` when nothing is visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, idx: usize) -> bool {
        idx >= self.start && idx < self.end
    }
}

/// Nodes intersecting `[scroll_top, scroll_top + viewport_height]`, without overscan.
pub fn visible_nodes(nodes: &[LayoutNode], scroll_top: f64, viewport_height: f64) -> VisibleRange {
    let start = nodes.partition_point(|node| node.top + node.height <= scroll_top);
    let bottom = scroll_top + viewport_height;
    let mut end = start;
    while end < nodes.len() && nodes[end].top <= bottom {
        end += 1;
    }
    VisibleRange { start, end }
}

/// Visible nodes widened by `overscan` on both sides and clamped to the node list.
pub fn find_visible_range(nodes: &[LayoutNode], scroll_top: f64, viewport_height: f64, overscan: usize) -> VisibleRange {
    let visible = visible_nodes(nodes, scroll_top, viewport_height);
    if visible.is_empty() {
        return visible;
    }
    VisibleRange {
        start: visible.start.saturating_sub(overscan),
        end: (visible.end + overscan).min(nodes.len()),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeSignals {
    pub start_reached: bool,
    pub end_reached: bool,
}

/// Scroll-threshold signals: near the bottom of the content, or near (but not at) the top.
pub fn edge_signals(scroll_top: f64, viewport_height: f64, content_height: f64) -> EdgeSignals {
    let threshold = viewport_height * EDGE_THRESHOLD;
    EdgeSignals {
        start_reached: scroll_top > 0.0 && scroll_top < threshold,
        end_reached: content_height - scroll_top - viewport_height < threshold,
    }
}
