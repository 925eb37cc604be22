use std::collections::HashMap;
use chrono::NaiveDate;
use crate::entities::{MediaEntry, MediaId};

pub const DATE_HEADER_HEIGHT: f64 = 40.0;
pub const ITEM_GAP: f64 = 4.0;
pub const BOTTOM_PADDING: f64 = 120.0;

const NARROW_BREAKPOINT: f64 = 768.0;

/// Grid width and target row height for a given viewport width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridMetrics {
    pub grid_width: f64,
    pub target_row_height: f64,
}

impl GridMetrics {
    pub fn for_container(container_width: f64) -> Self {
        if container_width < NARROW_BREAKPOINT {
            Self { grid_width: (container_width * 0.9).floor().max(0.0), target_row_height: 120.0 }
        } else {
            Self { grid_width: (container_width * 0.8).floor(), target_row_height: 150.0 }
        }
    }
}

/// Which trailing rows keep their natural height instead of being stretched to the full width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WidowPolicy {
    /// Only the very last row of the whole collection.
    #[default]
    CollectionEnd,
    /// The last row of every date group.
    EveryGroup,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlacedItem {
    pub id: MediaId,
    /// Position of the entry in the slice the layout was computed from.
    pub entry_index: usize,
    pub width: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    DateHeader,
    PhotoRow { items: Vec<PlacedItem>, row_height: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutNode {
    pub date: NaiveDate,
    pub top: f64,
    /// Vertical space owned by the node, including the gap below a row.
    pub height: f64,
    pub kind: NodeKind,
}

impl LayoutNode {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn is_header(&self) -> bool {
        matches!(self.kind, NodeKind::DateHeader)
    }

    pub fn items(&self) -> &[PlacedItem] {
        match &self.kind {
            NodeKind::PhotoRow { items, .. } => items,
            NodeKind::DateHeader => &[],
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Layout {
    nodes: Vec<LayoutNode>,
    total_height: f64,
}

pub fn compute_layout(entries: &[MediaEntry], container_width: f64, target_row_height: f64) -> Layout {
    let mut layout = Layout::default();
    layout.recompute(entries, container_width, target_row_height, WidowPolicy::default());
    layout
}

impl Layout {
    pub fn nodes(&self) -> &[LayoutNode] {
        &self.nodes
    }

    pub fn total_height(&self) -> f64 {
        self.total_height
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rebuilds the node list in place, reusing the existing allocation.
    pub fn recompute(&mut self, entries: &[MediaEntry], container_width: f64, target_row_height: f64, policy: WidowPolicy) {
        self.nodes.clear();
        self.total_height = 0.0;
        if container_width <= 0.0 || target_row_height <= 0.0 || entries.is_empty() {
            return;
        }

        let groups = group_by_first_appearance(entries);
        let last_group = groups.len() - 1;
        let mut top = 0.0;
        for (group_idx, (date, indices)) in groups.into_iter().enumerate() {
            self.nodes.push(LayoutNode { date, top, height: DATE_HEADER_HEIGHT, kind: NodeKind::DateHeader });
            top += DATE_HEADER_HEIGHT;

            let keep_widow = match policy {
                WidowPolicy::CollectionEnd => group_idx == last_group,
                WidowPolicy::EveryGroup => true,
            };
            for row in pack_rows(entries, &indices, container_width, target_row_height, keep_widow) {
                let height = row.row_height + ITEM_GAP;
                self.nodes.push(LayoutNode {
                    date,
                    top,
                    height,
                    kind: NodeKind::PhotoRow { items: row.items, row_height: row.row_height },
                });
                top += height;
            }
        }
        self.total_height = top;
    }

    /// Top of the row holding the entry with the given id.
    pub fn top_of_entry(&self, id: &str) -> Option<f64> {
        self.nodes.iter()
            .find(|node| node.items().iter().any(|item| item.id == id))
            .map(|node| node.top)
    }

    pub fn header_index(&self, date: NaiveDate) -> Option<usize> {
        self.nodes.iter().position(|node| node.is_header() && node.date == date)
    }

    pub fn header_dates(&self) -> impl Iterator<Item = (usize, NaiveDate)> + '_ {
        self.nodes.iter()
            .enumerate()
            .filter(|(_, node)| node.is_header())
            .map(|(idx, node)| (idx, node.date))
    }
}

fn group_by_first_appearance(entries: &[MediaEntry]) -> Vec<(NaiveDate, Vec<usize>)> {
    let mut groups: Vec<(NaiveDate, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<NaiveDate, usize> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        let date = entry.date();
        match positions.get(&date) {
            Some(&pos) => groups[pos].1.push(idx),
            None => {
                positions.insert(date, groups.len());
                groups.push((date, vec![idx]));
            }
        }
    }
    groups
}

struct PackedRow {
    items: Vec<PlacedItem>,
    row_height: f64,
}

/// Greedy justified packing. A row closes as soon as its items at the target height, plus gaps,
/// reach the container width; it is then scaled so that widths plus gaps equal the width exactly.
fn pack_rows(entries: &[MediaEntry], indices: &[usize], width: f64, target: f64, keep_widow: bool) -> Vec<PackedRow> {
    let mut rows = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut ratio_sum = 0.0;
    for &idx in indices {
        current.push(idx);
        ratio_sum += entries[idx].aspect_ratio();
        let gaps = ITEM_GAP * (current.len() - 1) as f64;
        if ratio_sum * target + gaps >= width {
            let row_height = ((width - gaps) / ratio_sum).max(0.0);
            rows.push(place(entries, &current, row_height));
            current.clear();
            ratio_sum = 0.0;
        }
    }
    if !current.is_empty() {
        let row_height = if keep_widow {
            target
        } else {
            let gaps = ITEM_GAP * (current.len() - 1) as f64;
            ((width - gaps) / ratio_sum).max(0.0)
        };
        rows.push(place(entries, &current, row_height));
    }
    rows
}

fn place(entries: &[MediaEntry], indices: &[usize], row_height: f64) -> PackedRow {
    let items = indices.iter()
        .map(|&idx| PlacedItem {
            id: entries[idx].id.clone(),
            entry_index: idx,
            width: entries[idx].aspect_ratio() * row_height,
        })
        .collect();
    PackedRow { items, row_height }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CacheKey {
    window_version: u64,
    width: f64,
    target: f64,
    policy: WidowPolicy,
}

/// Memoizes the layout on the window version and the geometry inputs.
#[derive(Debug, Default)]
pub struct LayoutCache {
    key: Option<CacheKey>,
    layout: Layout,
    recomputes: usize,
}

impl LayoutCache {
    pub fn get(&mut self, window_version: u64, entries: &[MediaEntry], width: f64, target: f64, policy: WidowPolicy) -> &Layout {
        let key = CacheKey { window_version, width, target, policy };
        if self.key != Some(key) {
            self.layout.recompute(entries, width, target, policy);
            self.key = Some(key);
            self.recomputes += 1;
        }
        &self.layout
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    pub fn recomputes(&self) -> usize {
        self.recomputes
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use crate::entities::{MediaKind, MediaSource};

    pub(crate) fn entry(id: usize, w: u32, h: u32, day: &str) -> MediaEntry {
        let taken_at = NaiveDateTime::parse_from_str(&format!("{} 12:00:00", day), "%Y-%m-%d %H:%M:%S").unwrap();
        MediaEntry {
            id: id.to_string(),
            width: w,
            height: h,
            taken_at,
            kind: MediaKind::Image,
            color: String::new(),
            path: format!("{}.jpg", id),
            source: MediaSource::Image { srcset: vec![] },
        }
    }

    pub(crate) fn from_nodes(nodes: Vec<LayoutNode>) -> Layout {
        let total_height = nodes.last().map_or(0.0, |n| n.bottom());
        Layout { nodes, total_height }
    }

    fn random_entries(rng: &mut ChaCha8Rng, count: usize) -> Vec<MediaEntry> {
        let mut day = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        (0..count)
            .map(|id| {
                if rng.gen_bool(0.15) {
                    day = day.pred_opt().unwrap();
                }
                entry(id, rng.gen_range(200..4000), rng.gen_range(200..4000), &day.format("%Y-%m-%d").to_string())
            })
            .collect()
    }

    fn row_span(node: &LayoutNode) -> f64 {
        let items = node.items();
        items.iter().map(|x| x.width).sum::<f64>() + ITEM_GAP * (items.len() - 1) as f64
    }

    #[test]
    fn test_nodes_are_gapless() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let count = rng.gen_range(1..400);
            let entries = random_entries(&mut rng, count);
            let width = rng.gen_range(200.0..2000.0);
            let layout = compute_layout(&entries, width, 150.0);
            let nodes = layout.nodes();
            assert_eq!(nodes[0].top, 0.0);
            for pair in nodes.windows(2) {
                assert_eq!(pair[0].top + pair[0].height, pair[1].top);
            }
            assert_eq!(nodes.last().unwrap().bottom(), layout.total_height());
        }
    }

    #[test]
    fn test_rows_fill_container_except_collection_widow() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..50 {
            let count = rng.gen_range(1..300);
            let entries = random_entries(&mut rng, count);
            let width = rng.gen_range(300.0..1600.0);
            let layout = compute_layout(&entries, width, 120.0);
            let rows = layout.nodes().iter().filter(|n| !n.is_header()).collect::<Vec<_>>();
            for row in &rows[..rows.len() - 1] {
                assert!((row_span(row) - width).abs() <= 1.0, "row spans {} of {}", row_span(row), width);
            }
        }
    }

    #[test]
    fn test_rows_never_mix_dates_and_cover_every_entry() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let entries = random_entries(&mut rng, 500);
        let layout = compute_layout(&entries, 1000.0, 150.0);
        let mut seen = 0;
        for node in layout.nodes().iter().filter(|n| !n.is_header()) {
            for item in node.items() {
                assert_eq!(entries[item.entry_index].date(), node.date);
                assert_eq!(entries[item.entry_index].id, item.id);
                seen += 1;
            }
        }
        assert_eq!(seen, entries.len());
    }

    #[test]
    fn test_small_groups() {
        let entries = vec![
            entry(1, 400, 300, "2024-03-03"),
            entry(2, 400, 300, "2024-03-02"),
            entry(3, 300, 400, "2024-03-02"),
            entry(4, 400, 300, "2024-03-01"),
            entry(5, 400, 400, "2024-03-01"),
            entry(6, 300, 400, "2024-03-01"),
        ];
        let layout = compute_layout(&entries, 1000.0, 150.0);
        let kinds = layout.nodes().iter().map(|n| n.is_header()).collect::<Vec<_>>();
        assert_eq!(kinds, vec![true, false, true, false, true, false]);
        // groups other than the last are stretched to the full width
        assert!((row_span(&layout.nodes()[1]) - 1000.0).abs() < 1e-6);
        assert!((row_span(&layout.nodes()[3]) - 1000.0).abs() < 1e-6);
        // the final row keeps its natural height
        match &layout.nodes()[5].kind {
            NodeKind::PhotoRow { items, row_height } => {
                assert_eq!(*row_height, 150.0);
                assert_eq!(items.len(), 3);
                assert!((items[0].width - 200.0).abs() < 1e-9);
            }
            NodeKind::DateHeader => panic!("expected a row"),
        }
    }

    #[test]
    fn test_uneven_group_splits_into_rows() {
        let entries = (0..7).map(|id| entry(id, 400, 300, "2024-03-01")).collect::<Vec<_>>();
        let layout = compute_layout(&entries, 500.0, 150.0);
        let sizes = layout.nodes().iter().filter(|n| !n.is_header()).map(|n| n.items().len()).collect::<Vec<_>>();
        // 2 * 200 + 4 >= 500 is false, 3 * 200 + 8 >= 500 closes the row
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_groups_follow_first_appearance() {
        let entries = vec![
            entry(1, 100, 100, "2024-03-01"),
            entry(2, 100, 100, "2024-03-05"),
            entry(3, 100, 100, "2024-03-01"),
        ];
        let layout = compute_layout(&entries, 800.0, 100.0);
        let headers = layout.header_dates().map(|(_, d)| d.format("%d").to_string()).collect::<Vec<_>>();
        assert_eq!(headers, vec!["01", "05"]);
        assert_eq!(layout.nodes()[1].items().len(), 2);
    }

    #[test]
    fn test_every_group_widow_policy() {
        let entries = vec![entry(1, 400, 300, "2024-03-02"), entry(2, 400, 300, "2024-03-01")];
        let mut layout = Layout::default();
        layout.recompute(&entries, 1000.0, 150.0, WidowPolicy::EveryGroup);
        assert_eq!(layout.nodes()[1].height, 150.0 + ITEM_GAP);
        assert_eq!(layout.nodes()[3].height, 150.0 + ITEM_GAP);
    }

    #[test]
    fn test_degenerate_inputs() {
        let entries = vec![entry(1, 400, 300, "2024-03-01")];
        assert!(compute_layout(&entries, 0.0, 150.0).is_empty());
        assert!(compute_layout(&[], 1000.0, 150.0).is_empty());
        assert_eq!(compute_layout(&[], 1000.0, 150.0).total_height(), 0.0);
    }

    #[test]
    fn test_grid_metrics() {
        assert_eq!(GridMetrics::for_container(500.0), GridMetrics { grid_width: 450.0, target_row_height: 120.0 });
        assert_eq!(GridMetrics::for_container(1001.0), GridMetrics { grid_width: 800.0, target_row_height: 150.0 });
    }

    #[test]
    fn test_cache_recomputes_only_on_key_change() {
        let entries = vec![entry(1, 400, 300, "2024-03-01")];
        let mut cache = LayoutCache::default();
        cache.get(1, &entries, 800.0, 150.0, WidowPolicy::CollectionEnd);
        cache.get(1, &entries, 800.0, 150.0, WidowPolicy::CollectionEnd);
        assert_eq!(cache.recomputes(), 1);
        cache.get(2, &entries, 800.0, 150.0, WidowPolicy::CollectionEnd);
        cache.get(2, &entries, 640.0, 150.0, WidowPolicy::CollectionEnd);
        assert_eq!(cache.recomputes(), 3);
    }
}
