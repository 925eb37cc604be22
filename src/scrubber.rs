use chrono::NaiveDate;
use itertools::Itertools;
use log::debug;
use crate::date_index::TimelineSummary;
use crate::utils::date_utils::DateExtensions;

pub const TICK_HEIGHT: f64 = 8.0;
pub const PADDING_TOP: f64 = 40.0;
pub const PADDING_BOTTOM: f64 = 40.0;
pub const TAIL_SPACER: f64 = 256.0;
pub const EDGE_ZONE: f64 = 60.0;
pub const MAX_SPEED_POINTER: f64 = 20.0;
pub const MAX_SPEED_TOUCH: f64 = 40.0;
/// Movement below this distance between press and release is a tap.
pub const TAP_SLOP: f64 = 5.0;
const THUMB_BOTTOM_MARGIN: f64 = 10.0;
const BAR_SCALE: f64 = 1000.0;

/// One month on the scrubber track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthTick {
    pub year: i32,
    pub month: u32,
    /// Newest bucket date within the month; where a scrub to this tick lands.
    pub date: NaiveDate,
    pub total: usize,
    pub bar_width: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YearLabel {
    pub year: i32,
    pub first_tick: usize,
    pub count: usize,
}

/// Flattens the summary into month ticks, newest year first and newest month first.
pub fn month_ticks(summary: &TimelineSummary) -> Vec<MonthTick> {
    let total_items = summary.total();
    summary.buckets().iter()
        .into_group_map_by(|x| x.date.year_month())
        .into_iter()
        .sorted_by(|a, b| b.0.cmp(&a.0))
        .filter_map(|((year, month), buckets)| {
            let date = buckets.iter().map(|x| x.date).max()?;
            let total = buckets.iter().map(|x| x.count).sum::<usize>();
            let bar_width = if total_items == 0 {
                0
            } else {
                (total as f64 / total_items as f64 * BAR_SCALE).round() as u32
            };
            Some(MonthTick { year, month, date, total, bar_width })
        })
        .collect()
}

pub fn year_labels(ticks: &[MonthTick]) -> Vec<YearLabel> {
    let mut labels: Vec<YearLabel> = Vec::new();
    for (idx, tick) in ticks.iter().enumerate() {
        match labels.last_mut() {
            Some(label) if label.year == tick.year => label.count += 1,
            _ => labels.push(YearLabel { year: tick.year, first_tick: idx, count: 1 }),
        }
    }
    labels
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

impl PointerKind {
    fn max_speed(&self) -> f64 {
        match self {
            PointerKind::Mouse => MAX_SPEED_POINTER,
            PointerKind::Touch => MAX_SPEED_TOUCH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gesture {
    Tap,
    Drag,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScrubberState {
    Idle,
    Dragging { kind: PointerKind, origin_y: f64, last_y: f64, travelled: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrubberEvent {
    /// Transient proposal while dragging.
    Scrub(NaiveDate),
    /// Final choice on release; the caller persists it in the location.
    Select(NaiveDate),
    Released(Gesture),
}

/// Instruction for the scrubber's own list when it re-centres on the visible date.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListScroll {
    pub top: f64,
    pub smooth: bool,
}

/// Pointer and touch handling for the month track. All coordinates are relative to the top
/// of the track; the caller supplies the track height.
#[derive(Debug)]
pub struct ScrubberModel {
    ticks: Vec<MonthTick>,
    track_height: f64,
    list_scroll: f64,
    thumb_top: Option<f64>,
    state: ScrubberState,
    velocity: f64,
    last_scrubbed: Option<NaiveDate>,
    synced_once: bool,
}

impl ScrubberModel {
    pub fn new(summary: &TimelineSummary, track_height: f64) -> Self {
        Self {
            ticks: month_ticks(summary),
            track_height,
            list_scroll: 0.0,
            thumb_top: None,
            state: ScrubberState::Idle,
            velocity: 0.0,
            last_scrubbed: None,
            synced_once: false,
        }
    }

    /// Replaces the ticks after the summary changed; the list scroll is kept within range.
    pub fn set_summary(&mut self, summary: &TimelineSummary) {
        self.ticks = month_ticks(summary);
        self.list_scroll = self.list_scroll.min(self.max_scroll());
    }

    pub fn set_track_height(&mut self, track_height: f64) {
        self.track_height = track_height;
        self.list_scroll = self.list_scroll.min(self.max_scroll());
    }

    pub fn ticks(&self) -> &[MonthTick] {
        &self.ticks
    }

    pub fn state(&self) -> ScrubberState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, ScrubberState::Dragging { .. })
    }

    pub fn thumb_top(&self) -> Option<f64> {
        self.thumb_top
    }

    pub fn list_scroll(&self) -> f64 {
        self.list_scroll
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn content_height(&self) -> f64 {
        PADDING_TOP + self.ticks.len() as f64 * TICK_HEIGHT + TAIL_SPACER + PADDING_BOTTOM
    }

    pub fn max_scroll(&self) -> f64 {
        (self.content_height() - self.track_height).max(0.0)
    }

    pub fn pointer_down(&mut self, y: f64, kind: PointerKind) -> Vec<ScrubberEvent> {
        if self.ticks.is_empty() {
            return vec![];
        }
        self.state = ScrubberState::Dragging { kind, origin_y: y, last_y: y, travelled: 0.0 };
        self.last_scrubbed = None;
        self.interact(y)
    }

    pub fn pointer_move(&mut self, y: f64) -> Vec<ScrubberEvent> {
        match &mut self.state {
            ScrubberState::Dragging { last_y, travelled, .. } => {
                *travelled += (y - *last_y).abs();
                *last_y = y;
            }
            ScrubberState::Idle => return vec![],
        }
        self.interact(y)
    }

    pub fn pointer_up(&mut self) -> Vec<ScrubberEvent> {
        let ScrubberState::Dragging { origin_y, last_y, travelled, .. } = self.state else {
            return vec![];
        };
        self.state = ScrubberState::Idle;
        self.velocity = 0.0;
        let mut events = vec![];
        if let Some(date) = self.last_scrubbed.take() {
            events.push(ScrubberEvent::Select(date));
        }
        let gesture = if travelled.max((last_y - origin_y).abs()) < TAP_SLOP {
            Gesture::Tap
        } else {
            Gesture::Drag
        };
        events.push(ScrubberEvent::Released(gesture));
        events
    }

    /// Applies auto-scroll velocity and re-reads the last pointer position.
    pub fn animation_frame(&mut self) -> Vec<ScrubberEvent> {
        let ScrubberState::Dragging { last_y, .. } = self.state else {
            return vec![];
        };
        if self.velocity == 0.0 {
            return vec![];
        }
        self.list_scroll = (self.list_scroll + self.velocity).clamp(0.0, self.max_scroll());
        self.process_pointer(last_y).into_iter().collect()
    }

    fn interact(&mut self, y: f64) -> Vec<ScrubberEvent> {
        let min_top = PADDING_TOP + TICK_HEIGHT / 2.0;
        let max_top = (self.track_height - THUMB_BOTTOM_MARGIN).max(min_top);
        self.thumb_top = Some(y.clamp(min_top, max_top));
        self.velocity = self.edge_velocity(y);
        self.process_pointer(y).into_iter().collect()
    }

    fn edge_velocity(&self, y: f64) -> f64 {
        let max_speed = match self.state {
            ScrubberState::Dragging { kind, .. } => kind.max_speed(),
            ScrubberState::Idle => return 0.0,
        };
        if y < EDGE_ZONE {
            -(1.0 - y.max(0.0) / EDGE_ZONE) * max_speed
        } else if y > self.track_height - EDGE_ZONE {
            (1.0 - (self.track_height - y).max(0.0) / EDGE_ZONE) * max_speed
        } else {
            0.0
        }
    }

    pub fn tick_index_at(&self, y: f64) -> Option<usize> {
        if self.ticks.is_empty() {
            return None;
        }
        let raw = ((y + self.list_scroll - PADDING_TOP) / TICK_HEIGHT).floor();
        Some(raw.clamp(0.0, (self.ticks.len() - 1) as f64) as usize)
    }

    fn process_pointer(&mut self, y: f64) -> Option<ScrubberEvent> {
        let date = self.ticks[self.tick_index_at(y)?].date;
        if self.last_scrubbed == Some(date) {
            return None;
        }
        debug!("scrub proposes {}", date);
        self.last_scrubbed = Some(date);
        Some(ScrubberEvent::Scrub(date))
    }

    /// Follows the visible date while idle, re-centring the list when its tick leaves the
    /// middle band of the track.
    pub fn sync_to_date(&mut self, date: NaiveDate) -> Option<ListScroll> {
        if self.is_dragging() {
            return None;
        }
        let idx = self.ticks.iter().position(|x| (x.year, x.month) == date.year_month())?;
        let center = PADDING_TOP + idx as f64 * TICK_HEIGHT + TICK_HEIGHT / 2.0;
        let visual = center - self.list_scroll;
        let band = (self.track_height * 0.3)..=(self.track_height * 0.7);
        if band.contains(&visual) {
            self.thumb_top = Some(visual);
            self.synced_once = true;
            return None;
        }
        let top = (center - self.track_height / 2.0).clamp(0.0, self.max_scroll());
        let smooth = self.synced_once;
        self.synced_once = true;
        self.list_scroll = top;
        self.thumb_top = Some(center - top);
        Some(ListScroll { top, smooth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TimelineBucket;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn summary(items: &[(&str, usize)]) -> TimelineSummary {
        TimelineSummary::new(items.iter().map(|(d, c)| TimelineBucket { date: day(d), count: *c }).collect())
    }

    /// One bucket on the 15th of each month, going back from December 2024.
    fn monthly(months: usize) -> TimelineSummary {
        let mut date = day("2024-12-15");
        let mut items = vec![];
        for _ in 0..months {
            items.push(TimelineBucket { date, count: 10 });
            date = date.checked_sub_months(chrono::Months::new(1)).unwrap();
        }
        TimelineSummary::new(items)
    }

    #[test]
    fn test_month_ticks() {
        let s = summary(&[("2024-03-20", 6), ("2024-03-02", 2), ("2024-01-05", 2), ("2023-12-31", 10)]);
        let ticks = month_ticks(&s);
        let keys = ticks.iter().map(|x| (x.year, x.month)).collect::<Vec<_>>();
        assert_eq!(keys, vec![(2024, 3), (2024, 1), (2023, 12)]);
        assert_eq!(ticks[0].date, day("2024-03-20"));
        assert_eq!(ticks[0].total, 8);
        assert_eq!(ticks[0].bar_width, 400);
        assert_eq!(ticks[2].bar_width, 500);
        let labels = year_labels(&ticks);
        assert_eq!(labels, vec![
            YearLabel { year: 2024, first_tick: 0, count: 2 },
            YearLabel { year: 2023, first_tick: 2, count: 1 },
        ]);
    }

    #[test]
    fn test_drag_emits_only_on_date_change_and_selects_on_release() {
        let mut model = ScrubberModel::new(&monthly(24), 600.0);
        assert_eq!(model.pointer_down(200.0, PointerKind::Mouse), vec![ScrubberEvent::Scrub(model.ticks()[20].date)]);
        assert_eq!(model.pointer_move(203.0), vec![]);
        let events = model.pointer_move(230.0);
        assert_eq!(events, vec![ScrubberEvent::Scrub(model.ticks()[23].date)]);
        let events = model.pointer_up();
        assert_eq!(events, vec![
            ScrubberEvent::Select(model.ticks()[23].date),
            ScrubberEvent::Released(Gesture::Drag),
        ]);
        assert!(!model.is_dragging());
        assert_eq!(model.pointer_move(300.0), vec![]);
    }

    #[test]
    fn test_tap_is_distinguished_by_distance() {
        let mut model = ScrubberModel::new(&monthly(24), 600.0);
        model.pointer_down(200.0, PointerKind::Touch);
        model.pointer_move(201.0);
        assert_eq!(model.pointer_up().last(), Some(&ScrubberEvent::Released(Gesture::Tap)));
    }

    #[test]
    fn test_thumb_and_index_are_clamped() {
        let mut model = ScrubberModel::new(&monthly(5), 600.0);
        model.pointer_down(-50.0, PointerKind::Mouse);
        assert_eq!(model.thumb_top(), Some(PADDING_TOP + TICK_HEIGHT / 2.0));
        assert_eq!(model.tick_index_at(-50.0), Some(0));
        model.pointer_move(900.0);
        assert_eq!(model.thumb_top(), Some(590.0));
        assert_eq!(model.tick_index_at(900.0), Some(4));
    }

    #[test]
    fn test_edge_auto_scroll_progresses_every_frame() {
        let mut model = ScrubberModel::new(&monthly(200), 400.0);
        model.pointer_down(370.0, PointerKind::Mouse);
        assert!((model.velocity() - 10.0).abs() < 1e-9);
        let first = model.tick_index_at(370.0).unwrap();
        let mut scrubs = 0;
        for _ in 0..10 {
            scrubs += model.animation_frame().len();
        }
        assert_eq!(model.list_scroll(), 100.0);
        assert!(model.tick_index_at(370.0).unwrap() > first);
        assert!(scrubs > 0);

        model.pointer_move(200.0);
        assert_eq!(model.velocity(), 0.0);
        assert_eq!(model.animation_frame(), vec![]);

        model.pointer_move(0.0);
        assert_eq!(model.velocity(), -MAX_SPEED_POINTER);
        model.pointer_up();
        assert_eq!(model.velocity(), 0.0);
    }

    #[test]
    fn test_touch_scrolls_faster() {
        let mut model = ScrubberModel::new(&monthly(200), 400.0);
        model.pointer_down(400.0, PointerKind::Touch);
        assert_eq!(model.velocity(), MAX_SPEED_TOUCH);
    }

    #[test]
    fn test_sync_recentres_outside_band() {
        let mut model = ScrubberModel::new(&monthly(120), 400.0);
        let target = model.ticks()[100].date;
        let first = model.sync_to_date(target).unwrap();
        assert!(!first.smooth);
        let center = PADDING_TOP + 100.0 * TICK_HEIGHT + TICK_HEIGHT / 2.0;
        assert_eq!(first.top, center - 200.0);
        assert_eq!(model.thumb_top(), Some(200.0));

        // inside the band: only the thumb follows
        assert_eq!(model.sync_to_date(model.ticks()[101].date), None);
        assert_eq!(model.thumb_top(), Some(208.0));

        let second = model.sync_to_date(model.ticks()[10].date).unwrap();
        assert!(second.smooth);
        assert_eq!(second.top, 0.0);
    }
}
