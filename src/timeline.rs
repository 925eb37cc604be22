use std::time::{Duration, Instant};
use chrono::NaiveDate;
use log::{debug, info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use crate::anchor::{AnchorTracker, JumpController, PendingScroll, ScrollTarget, VisibleDateTracker};
use crate::date_index::TimelineSummary;
use crate::error::GalleryError;
use crate::filter::{FilterState, Location};
use crate::layout::{GridMetrics, Layout, LayoutCache, LayoutNode, WidowPolicy, BOTTOM_PADDING};
use crate::pagination::{LoadOutcome, PaginationController};
use crate::scrubber::{ListScroll, PointerKind, ScrubberEvent, ScrubberModel};
use crate::source::PageSource;
use crate::state::{Debouncer, StateStore};
use crate::visible::{edge_signals, find_visible_range, visible_nodes, VisibleRange, OVERSCAN};

#[derive(Clone, Debug)]
pub struct TimelineOptions {
    pub page_size: usize,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub widow_policy: WidowPolicy,
    pub persist_debounce: Duration,
    /// Let the `prefetch` idle hook fetch the page after the window ahead of time.
    pub prefetch: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            page_size: crate::source::DEFAULT_PAGE_SIZE,
            viewport_width: 1280.0,
            viewport_height: 800.0,
            widow_policy: WidowPolicy::default(),
            persist_debounce: Duration::from_millis(50),
            prefetch: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScrubCommand {
    Scrub(NaiveDate),
    Select(NaiveDate),
}

/// Cloneable sender for scrubber proposals. Proposals are coalesced by the timeline.
#[derive(Clone, Debug)]
pub struct ScrubHandle {
    tx: UnboundedSender<ScrubCommand>,
}

impl ScrubHandle {
    pub fn scrub(&self, date: NaiveDate) {
        if self.tx.send(ScrubCommand::Scrub(date)).is_err() {
            debug!("timeline dropped, scrub to {} ignored", date);
        }
    }

    pub fn select(&self, date: NaiveDate) {
        if self.tx.send(ScrubCommand::Select(date)).is_err() {
            debug!("timeline dropped, select of {} ignored", date);
        }
    }
}

/// Raw input on the scrubber track, `y` relative to the top of the track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScrubberInput {
    Down { y: f64, kind: PointerKind },
    Move { y: f64 },
    Up,
    Frame,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TimelineEvent {
    VisibleDateChanged(NaiveDate),
    Loaded(LoadOutcome),
    LoadFailed(String),
}

/// What the rendering surface needs for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderFrame {
    /// Node indices of `nodes`, overscan included.
    pub range: VisibleRange,
    pub nodes: Vec<LayoutNode>,
    /// Scrollable height, bottom padding included.
    pub total_height: f64,
    /// Set only when the surface must move: after a jump or a prepend.
    pub scroll_to: Option<f64>,
    pub loading: bool,
    pub error: Option<String>,
    /// Scroll for the scrubber's month list when it re-centred on the visible date.
    pub scrubber_scroll: Option<ListScroll>,
}

/// Wires the paging controller, layout, jump slot and persistence into one headless timeline.
pub struct Timeline<S: PageSource, T: StateStore> {
    source: S,
    store: T,
    options: TimelineOptions,
    pagination: PaginationController,
    layout: LayoutCache,
    jumps: JumpController,
    scroll: PendingScroll,
    anchor: AnchorTracker,
    visible_date: VisibleDateTracker,
    persist: Debouncer<NaiveDate>,
    scrubber: ScrubberModel,
    scrubber_scroll: Option<ListScroll>,
    scrub_tx: UnboundedSender<ScrubCommand>,
    scrub_rx: UnboundedReceiver<ScrubCommand>,
    scroll_top: f64,
    scroll_adjust: Option<f64>,
    requested_top: Option<f64>,
    location_date: Option<NaiveDate>,
    last_jump: Option<NaiveDate>,
}

impl<S: PageSource, T: StateStore> Timeline<S, T> {
    pub fn new(source: S, store: T, options: TimelineOptions) -> Self {
        let (scrub_tx, scrub_rx) = unbounded_channel();
        Self {
            pagination: PaginationController::new(options.page_size, FilterState::default()),
            persist: Debouncer::new(options.persist_debounce),
            scrubber: ScrubberModel::new(&TimelineSummary::default(), options.viewport_height),
            scrubber_scroll: None,
            source,
            store,
            options,
            layout: LayoutCache::default(),
            jumps: JumpController::default(),
            scroll: PendingScroll::default(),
            anchor: AnchorTracker::default(),
            visible_date: VisibleDateTracker::default(),
            scrub_tx,
            scrub_rx,
            scroll_top: 0.0,
            scroll_adjust: None,
            requested_top: None,
            location_date: None,
            last_jump: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    pub fn summary(&self) -> &TimelineSummary {
        self.pagination.summary()
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn visible_date(&self) -> Option<NaiveDate> {
        self.visible_date.current()
    }

    pub fn pending_scroll(&self) -> Option<ScrollTarget> {
        self.scroll.target()
    }

    pub fn scrubber(&self) -> &ScrubberModel {
        &self.scrubber
    }

    pub fn scrub_handle(&self) -> ScrubHandle {
        ScrubHandle { tx: self.scrub_tx.clone() }
    }

    pub fn location(&self) -> Location {
        Location { filter: self.pagination.filter().clone(), date: self.location_date }
    }

    pub fn location_query(&self) -> String {
        self.location().to_query()
    }

    pub fn metrics(&self) -> GridMetrics {
        GridMetrics::for_container(self.options.viewport_width)
    }

    pub fn resize(&mut self, viewport_width: f64, viewport_height: f64) {
        self.options.viewport_width = viewport_width;
        self.options.viewport_height = viewport_height;
        self.scrubber.set_track_height(viewport_height);
    }

    pub fn layout(&mut self) -> &Layout {
        current_layout(&mut self.layout, &self.pagination, &self.options)
    }

    /// Loads the summary and the page for the deep-linked date, or the persisted date when
    /// the location has none.
    pub async fn init(&mut self, location: Location) -> Result<(), GalleryError> {
        info!("initializing timeline at {:?}", location.date);
        self.jumps.cancel();
        self.discard_scrubs();
        self.last_jump = None;
        self.pagination.set_filter(location.filter);
        self.location_date = location.date;
        self.pagination.reset_to(&self.source, 0).await?;
        self.scrubber.set_summary(self.pagination.summary());

        let target = match location.date {
            Some(date) => Some(date),
            None => match self.store.load_last_date().await {
                Ok(date) => date,
                Err(e) => {
                    warn!("failed to read persisted date: {}", e);
                    None
                }
            },
        };

        match target {
            Some(date) => {
                let offset = self.pagination.summary().date_to_offset(date, self.pagination.filter().sort.direction);
                if offset >= self.pagination.page_size() {
                    self.pagination.reset_to(&self.source, offset).await?;
                }
                if !self.pagination.window().is_empty() {
                    self.request_scroll(date);
                }
            }
            None => {
                if let Some(first) = self.pagination.window().entries().first().map(|x| x.date()) {
                    self.visible_date.set(first);
                    self.sync_scrubber(first);
                }
            }
        }
        Ok(())
    }

    /// Drops everything loaded for the old filter and starts again from the newest item.
    pub async fn set_filter(&mut self, filter: FilterState) -> Result<(), GalleryError> {
        self.jumps.cancel();
        self.discard_scrubs();
        self.last_jump = None;
        self.pagination.set_filter(filter);
        self.location_date = None;
        self.scroll.clear();
        self.scroll_adjust = None;
        self.requested_top = None;
        self.pagination.reset_to(&self.source, 0).await?;
        self.scrubber.set_summary(self.pagination.summary());
        if let Some(first) = self.pagination.window().entries().first().map(|x| x.date()) {
            self.request_scroll(first);
        }
        Ok(())
    }

    fn request_scroll(&mut self, date: NaiveDate) {
        if self.last_jump != Some(date) {
            self.last_jump = None;
        }
        let target = self.jumps.next_target(date);
        self.scroll.request(target);
        self.visible_date.set(date);
        self.sync_scrubber(date);
    }

    fn sync_scrubber(&mut self, date: NaiveDate) {
        if let Some(scroll) = self.scrubber.sync_to_date(date) {
            self.scrubber_scroll = Some(scroll);
        }
    }

    /// Feeds scrubber input through the drag state machine and queues the dates it proposes.
    /// Queued dates run on the next `process_scrubs`.
    pub fn scrubber_input(&mut self, input: ScrubberInput) -> Vec<ScrubberEvent> {
        let events = match input {
            ScrubberInput::Down { y, kind } => self.scrubber.pointer_down(y, kind),
            ScrubberInput::Move { y } => self.scrubber.pointer_move(y),
            ScrubberInput::Up => self.scrubber.pointer_up(),
            ScrubberInput::Frame => self.scrubber.animation_frame(),
        };
        let handle = self.scrub_handle();
        for event in &events {
            match *event {
                ScrubberEvent::Scrub(date) => handle.scrub(date),
                ScrubberEvent::Select(date) => handle.select(date),
                ScrubberEvent::Released(gesture) => debug!("scrubber released: {:?}", gesture),
            }
        }
        events
    }

    /// Jumps to a date chosen by the user and records it in the location.
    pub async fn jump_to_date(&mut self, date: NaiveDate) {
        self.location_date = Some(date);
        self.run_jumps(date).await;
    }

    async fn run_jumps(&mut self, date: NaiveDate) {
        let Some(mut next) = self.jumps.propose(date) else {
            return;
        };
        loop {
            self.perform_jump(next).await;
            self.drain_scrubs();
            match self.jumps.finish() {
                Some(date) => next = date,
                None => break,
            }
        }
    }

    async fn perform_jump(&mut self, date: NaiveDate) {
        let direction = self.pagination.filter().sort.direction;
        let offset = self.pagination.summary().date_to_offset(date, direction);
        info!("jumping to {} at offset {}", date, offset);
        match self.pagination.reset_to(&self.source, offset).await {
            Ok(_) => {
                self.last_jump = Some(date);
                self.request_scroll(date);
            }
            Err(e) => warn!("jump to {} failed: {}", date, e),
        }
    }

    /// Parks queued scrubber commands behind the running jump; only the latest survives.
    fn drain_scrubs(&mut self) {
        while let Ok(command) = self.scrub_rx.try_recv() {
            let date = match command {
                ScrubCommand::Scrub(date) => date,
                ScrubCommand::Select(date) => {
                    self.location_date = Some(date);
                    date
                }
            };
            self.jumps.propose(date);
        }
    }

    /// Drops scrubber commands issued against a context that no longer exists.
    fn discard_scrubs(&mut self) {
        let mut dropped = 0;
        while self.scrub_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("dropped {} queued scrubber commands", dropped);
        }
    }

    /// True when the last jump landed on `date` and the loaded window still holds it.
    fn is_at(&self, date: NaiveDate) -> bool {
        if self.last_jump != Some(date) || self.jumps.is_busy() {
            return false;
        }
        let window = self.pagination.window();
        let offset = self.pagination.summary().date_to_offset(date, self.pagination.filter().sort.direction);
        !window.is_empty() && window.min_offset() <= offset && offset < window.max_offset()
    }

    /// Runs queued scrubber proposals, collapsing everything that queued up behind the
    /// running jump into the latest date.
    pub async fn process_scrubs(&mut self) {
        let mut latest = None;
        while let Ok(command) = self.scrub_rx.try_recv() {
            match command {
                ScrubCommand::Scrub(date) => latest = Some(date),
                ScrubCommand::Select(date) => {
                    self.location_date = Some(date);
                    latest = Some(date);
                }
            }
        }
        let Some(date) = latest else {
            return;
        };
        if self.is_at(date) {
            debug!("already at {}", date);
            return;
        }
        self.run_jumps(date).await;
    }

    /// Scrolls to the newest day, fetching only when the window does not start at the top.
    pub async fn scroll_to_top(&mut self) {
        let Some(newest) = self.pagination.summary().newest() else {
            return;
        };
        if self.pagination.window().min_offset() == 0 {
            self.request_scroll(newest);
        } else {
            self.run_jumps(newest).await;
        }
    }

    /// Records the surface's scroll position and reacts to it: visible-date tracking and
    /// loading more at either edge of the window.
    pub async fn on_scroll(&mut self, scroll_top: f64, now: Instant) -> Vec<TimelineEvent> {
        self.scroll_top = scroll_top;
        let viewport_height = self.options.viewport_height;
        let mut events = vec![];

        let settled = !self.jumps.is_busy() && self.scroll.target().is_none();
        let (first_visible, content_height) = {
            let layout = self.layout();
            let first = visible_nodes(layout.nodes(), scroll_top, viewport_height).start;
            (first, layout.total_height() + BOTTOM_PADDING)
        };
        if settled {
            let layout = current_layout(&mut self.layout, &self.pagination, &self.options);
            let changed = self.visible_date.observe(layout.nodes(), first_visible);
            if let Some(date) = changed {
                if self.last_jump != Some(date) {
                    self.last_jump = None;
                }
                self.sync_scrubber(date);
                self.persist.push(date, now);
                events.push(TimelineEvent::VisibleDateChanged(date));
            }
        }

        let signals = edge_signals(scroll_top, viewport_height, content_height);
        if signals.end_reached {
            events.extend(self.load_forward().await);
        }
        if signals.start_reached {
            events.extend(self.load_backward().await);
        }
        events
    }

    async fn load_forward(&mut self) -> Vec<TimelineEvent> {
        let mut events = vec![];
        match self.pagination.load_forward(&self.source).await {
            Ok(LoadOutcome::Skipped(reason)) => debug!("forward load skipped: {:?}", reason),
            Ok(outcome) => events.push(TimelineEvent::Loaded(outcome)),
            Err(e) => events.push(TimelineEvent::LoadFailed(e.to_string())),
        }
        events
    }

    /// Idle hook: fetches the page after the window so the next forward load needs no
    /// round trip. Does nothing unless prefetching is enabled or while a jump runs.
    pub async fn prefetch(&mut self) -> Option<LoadOutcome> {
        if !self.options.prefetch || self.jumps.is_busy() || self.pagination.is_loading() {
            return None;
        }
        match self.pagination.prefetch_forward(&self.source).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("prefetch failed: {}", e);
                None
            }
        }
    }

    async fn load_backward(&mut self) -> Vec<TimelineEvent> {
        let anchor_id = self.pagination.window().first_id().map(|x| x.to_string());
        let layout = current_layout(&mut self.layout, &self.pagination, &self.options);
        self.anchor.capture(layout, anchor_id.as_deref());
        let mut events = vec![];
        match self.pagination.load_backward(&self.source).await {
            Ok(LoadOutcome::Skipped(reason)) => debug!("backward load skipped: {:?}", reason),
            Ok(outcome @ LoadOutcome::Prepended(_)) => {
                let delta = {
                    let layout = current_layout(&mut self.layout, &self.pagination, &self.options);
                    self.anchor.take_delta(layout)
                };
                if let Some(delta) = delta {
                    self.scroll_top += delta;
                    self.scroll_adjust = Some(self.scroll_top);
                    debug!("prepend moved anchor by {}", delta);
                }
                events.push(TimelineEvent::Loaded(outcome));
            }
            Ok(outcome @ LoadOutcome::Replaced { .. }) => {
                if let Some(date) = self.visible_date.current() {
                    self.request_scroll(date);
                }
                events.push(TimelineEvent::Loaded(outcome));
            }
            Ok(outcome) => events.push(TimelineEvent::Loaded(outcome)),
            Err(e) => events.push(TimelineEvent::LoadFailed(e.to_string())),
        }
        events
    }

    /// Produces the frame to draw. A pending jump resolves here, in the same pass that lays
    /// out the new window, so the surface never shows the new content at the old offset.
    pub fn render(&mut self) -> RenderFrame {
        let viewport_height = self.options.viewport_height;
        let adjust = self.scroll_adjust.take();
        if let Some(target) = self.scroll.target() {
            if !self.jumps.is_current(&target) {
                debug!("dropping superseded scroll to {}", target.date);
                self.scroll.clear();
                self.requested_top = None;
            }
        }
        let layout = current_layout(&mut self.layout, &self.pagination, &self.options);

        let scroll_to = adjust.or_else(|| self.scroll.resolve(layout));
        if scroll_to.is_some() && self.scroll.target().is_some() && adjust.is_none() {
            self.requested_top = scroll_to;
        }
        let top = scroll_to.unwrap_or(self.scroll_top);
        let range = find_visible_range(layout.nodes(), top, viewport_height, OVERSCAN);
        RenderFrame {
            range,
            nodes: layout.nodes()[range.start..range.end].to_vec(),
            total_height: layout.total_height() + BOTTOM_PADDING,
            scroll_to,
            loading: self.pagination.is_loading() || self.jumps.is_busy(),
            error: self.pagination.last_error().map(|x| x.to_string()),
            scrubber_scroll: self.scrubber_scroll.take(),
        }
    }

    /// Reports where the surface actually ended up after a `scroll_to`.
    pub fn confirm_scroll(&mut self, actual_top: f64) -> bool {
        self.scroll_top = actual_top;
        let Some(requested) = self.requested_top else {
            return true;
        };
        let landed = self.scroll.confirm(requested, actual_top);
        if landed {
            self.requested_top = None;
        }
        landed
    }

    /// Writes the visible date once it has been stable for the debounce period.
    pub async fn flush_persistence(&mut self, now: Instant) -> Result<Option<NaiveDate>, GalleryError> {
        let Some(date) = self.persist.poll(now) else {
            return Ok(None);
        };
        self.store.save_last_date(date).await?;
        debug!("persisted visible date {}", date);
        Ok(Some(date))
    }
}

/// Layout of the loaded window at the current viewport width, recomputed only when either changed.
fn current_layout<'a>(cache: &'a mut LayoutCache, pagination: &PaginationController, options: &TimelineOptions) -> &'a Layout {
    let metrics = GridMetrics::for_container(options.viewport_width);
    let window = pagination.window();
    cache.get(window.version(), window.entries(), metrics.grid_width, metrics.target_row_height, options.widow_policy)
}
