use log::{debug, info, warn};
use crate::date_index::{offset_to_page, TimelineSummary};
use crate::entities::{MediaEntry, PageResponse};
use crate::error::GalleryError;
use crate::filter::FilterState;
use crate::source::PageSource;
use crate::window::{BackwardMerge, LoadedWindow};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Load,
    Prefetch,
}

/// A fetch the caller has to perform and hand back through [`PaginationController::complete`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: usize,
    pub direction: Direction,
    pub kind: RequestKind,
    generation: u64,
    stamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    EndReached,
    StartReached,
    AtStart,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Appended(usize),
    Prepended(usize),
    Replaced { offset: usize },
    /// A forward page brought nothing new; no more forward fetches until the next reset.
    EndReached,
    /// A backward page was empty; no more backward fetches until the next reset.
    StartReached,
    /// A prefetch arrived and is parked until the matching trigger consumes it.
    Prefetched,
    /// The trigger was attached to a prefetch that is still on the wire.
    AwaitingPrefetch,
    Skipped(SkipReason),
    /// The completion belongs to a superseded request and was dropped.
    Stale,
}

#[derive(Debug)]
pub enum Trigger {
    Fetch(PageRequest),
    Done(LoadOutcome),
}

#[derive(Debug, Default)]
enum PrefetchSlot {
    #[default]
    Empty,
    Pending { request: PageRequest, claimed: bool },
    Ready { request: PageRequest, entries: Vec<MediaEntry> },
}

/// Owns the loaded window and the timeline summary for the active filter.
///
/// Every fetch is described by a [`PageRequest`]. Requests carry the generation they were
/// issued in; resets and filter changes bump the generation, so late completions are
/// recognised and dropped. At most one load is in flight; concurrent triggers are skipped.
#[derive(Debug)]
pub struct PaginationController {
    page_size: usize,
    filter: FilterState,
    window: LoadedWindow,
    summary: TimelineSummary,
    total: usize,
    end_reached: bool,
    start_reached: bool,
    in_flight: Option<u64>,
    next: PrefetchSlot,
    prev: PrefetchSlot,
    generation: u64,
    stamp: u64,
    last_error: Option<String>,
}

impl PaginationController {
    pub fn new(page_size: usize, filter: FilterState) -> Self {
        Self {
            page_size: page_size.max(1),
            filter,
            window: LoadedWindow::default(),
            summary: TimelineSummary::default(),
            total: 0,
            end_reached: false,
            start_reached: false,
            in_flight: None,
            next: PrefetchSlot::Empty,
            prev: PrefetchSlot::Empty,
            generation: 0,
            stamp: 0,
            last_error: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn window(&self) -> &LoadedWindow {
        &self.window
    }

    pub fn summary(&self) -> &TimelineSummary {
        &self.summary
    }

    /// Server-reported size of the filtered collection.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached
    }

    pub fn start_reached(&self) -> bool {
        self.start_reached
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Installs a new filter and drops everything derived from the old one.
    pub fn set_filter(&mut self, filter: FilterState) {
        info!("filter changed, resetting pagination");
        self.filter = filter;
        self.invalidate();
        self.window.clear();
        self.summary = TimelineSummary::default();
        self.total = 0;
        self.last_error = None;
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.end_reached = false;
        self.start_reached = false;
        self.next = PrefetchSlot::Empty;
        self.prev = PrefetchSlot::Empty;
    }

    fn request(&mut self, cursor: usize, direction: Direction, kind: RequestKind) -> PageRequest {
        self.stamp += 1;
        PageRequest { cursor, direction, kind, generation: self.generation, stamp: self.stamp }
    }

    fn start_load(&mut self, cursor: usize, direction: Direction) -> PageRequest {
        let request = self.request(cursor, direction, RequestKind::Load);
        self.in_flight = Some(request.stamp);
        self.last_error = None;
        request
    }

    pub fn begin_forward(&mut self) -> Trigger {
        if self.in_flight.is_some() {
            debug!("forward trigger dropped, fetch in flight");
            return Trigger::Done(LoadOutcome::Skipped(SkipReason::InFlight));
        }
        if self.end_reached {
            return Trigger::Done(LoadOutcome::Skipped(SkipReason::EndReached));
        }
        let cursor = self.window.max_offset();
        match std::mem::take(&mut self.next) {
            PrefetchSlot::Ready { request, entries } if request.cursor == cursor => {
                debug!("consuming prefetched page at {}", cursor);
                return Trigger::Done(self.apply_forward(entries));
            }
            PrefetchSlot::Pending { request, .. } if request.cursor == cursor => {
                self.in_flight = Some(request.stamp);
                self.next = PrefetchSlot::Pending { request, claimed: true };
                return Trigger::Done(LoadOutcome::AwaitingPrefetch);
            }
            _ => {}
        }
        Trigger::Fetch(self.start_load(cursor, Direction::Forward))
    }

    /// Backward paging is offset based: the page below `min_offset`, clamped at zero.
    pub fn begin_backward(&mut self) -> Trigger {
        if self.in_flight.is_some() {
            debug!("backward trigger dropped, fetch in flight");
            return Trigger::Done(LoadOutcome::Skipped(SkipReason::InFlight));
        }
        let min = self.window.min_offset();
        if min == 0 {
            return Trigger::Done(LoadOutcome::Skipped(SkipReason::AtStart));
        }
        if self.start_reached {
            return Trigger::Done(LoadOutcome::Skipped(SkipReason::StartReached));
        }
        let cursor = min.saturating_sub(self.page_size);
        match std::mem::take(&mut self.prev) {
            PrefetchSlot::Ready { request, entries } if request.cursor == cursor => {
                debug!("consuming prefetched page at {}", cursor);
                return Trigger::Done(self.apply_backward(cursor, entries));
            }
            PrefetchSlot::Pending { request, .. } if request.cursor == cursor => {
                self.in_flight = Some(request.stamp);
                self.prev = PrefetchSlot::Pending { request, claimed: true };
                return Trigger::Done(LoadOutcome::AwaitingPrefetch);
            }
            _ => {}
        }
        Trigger::Fetch(self.start_load(cursor, Direction::Backward))
    }

    /// Supersedes everything in flight and asks for the page holding `offset`.
    pub fn begin_reset(&mut self, offset: usize) -> PageRequest {
        let cursor = offset_to_page(offset, self.page_size);
        info!("resetting window to offset {} (page {})", offset, cursor);
        self.invalidate();
        self.start_load(cursor, Direction::Reset)
    }

    pub fn begin_prefetch_forward(&mut self) -> Option<PageRequest> {
        if self.end_reached || self.window.is_empty() || !matches!(self.next, PrefetchSlot::Empty) {
            return None;
        }
        let request = self.request(self.window.max_offset(), Direction::Forward, RequestKind::Prefetch);
        self.next = PrefetchSlot::Pending { request: request.clone(), claimed: false };
        Some(request)
    }

    pub fn begin_prefetch_backward(&mut self) -> Option<PageRequest> {
        let min = self.window.min_offset();
        if min == 0 || self.start_reached || !matches!(self.prev, PrefetchSlot::Empty) {
            return None;
        }
        let cursor = min.saturating_sub(self.page_size);
        let request = self.request(cursor, Direction::Backward, RequestKind::Prefetch);
        self.prev = PrefetchSlot::Pending { request: request.clone(), claimed: false };
        Some(request)
    }

    /// Hands back the result of a request issued by one of the `begin_*` methods.
    pub fn complete(&mut self, request: PageRequest, result: Result<PageResponse, GalleryError>) -> Result<LoadOutcome, GalleryError> {
        if request.generation != self.generation {
            debug!("dropping stale completion for cursor {}", request.cursor);
            return Ok(LoadOutcome::Stale);
        }
        match request.kind {
            RequestKind::Load => {
                if self.in_flight != Some(request.stamp) {
                    debug!("dropping superseded completion for cursor {}", request.cursor);
                    return Ok(LoadOutcome::Stale);
                }
                self.in_flight = None;
                self.apply(&request, result)
            }
            RequestKind::Prefetch => self.complete_prefetch(request, result),
        }
    }

    fn complete_prefetch(&mut self, request: PageRequest, result: Result<PageResponse, GalleryError>) -> Result<LoadOutcome, GalleryError> {
        let slot = match request.direction {
            Direction::Backward => &mut self.prev,
            _ => &mut self.next,
        };
        let claimed = match &*slot {
            PrefetchSlot::Pending { request: pending, claimed } if pending.stamp == request.stamp => *claimed,
            _ => {
                debug!("dropping unclaimed prefetch for cursor {}", request.cursor);
                return Ok(LoadOutcome::Stale);
            }
        };
        if claimed {
            *slot = PrefetchSlot::Empty;
            self.in_flight = None;
            return self.apply(&request, result);
        }
        match result.and_then(|page| page.media_entries()) {
            Ok(entries) => {
                *slot = PrefetchSlot::Ready { request, entries };
                Ok(LoadOutcome::Prefetched)
            }
            Err(e) => {
                debug!("prefetch at {} failed: {}", request.cursor, e);
                *slot = PrefetchSlot::Empty;
                Ok(LoadOutcome::Stale)
            }
        }
    }

    fn apply(&mut self, request: &PageRequest, result: Result<PageResponse, GalleryError>) -> Result<LoadOutcome, GalleryError> {
        let parsed = result.and_then(|page| {
            let entries = page.media_entries()?;
            let summary = if request.cursor == 0 && request.direction == Direction::Reset {
                Some(TimelineSummary::from_response(&page)?)
            } else {
                None
            };
            Ok((page.meta.total, entries, summary))
        });
        let (total, entries, summary) = match parsed {
            Ok(x) => x,
            Err(e) => {
                warn!("loading page at {} failed: {}", request.cursor, e);
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.total = total;
        let outcome = match request.direction {
            Direction::Forward => self.apply_forward(entries),
            Direction::Backward => self.apply_backward(request.cursor, entries),
            Direction::Reset => {
                if let Some(summary) = summary {
                    self.summary = summary;
                }
                self.window.replace(request.cursor, entries);
                LoadOutcome::Replaced { offset: request.cursor }
            }
        };
        Ok(outcome)
    }

    fn apply_forward(&mut self, entries: Vec<MediaEntry>) -> LoadOutcome {
        let added = self.window.merge_forward(entries);
        if added == 0 {
            info!("end of collection reached at offset {}", self.window.max_offset());
            self.end_reached = true;
            return LoadOutcome::EndReached;
        }
        LoadOutcome::Appended(added)
    }

    fn apply_backward(&mut self, cursor: usize, entries: Vec<MediaEntry>) -> LoadOutcome {
        if entries.is_empty() {
            self.start_reached = true;
            return LoadOutcome::StartReached;
        }
        match self.window.merge_backward(cursor, entries) {
            BackwardMerge::Prepended(count) => LoadOutcome::Prepended(count),
            BackwardMerge::Replaced => {
                warn!("backward page at {} did not line up, window replaced", cursor);
                self.end_reached = false;
                self.next = PrefetchSlot::Empty;
                LoadOutcome::Replaced { offset: cursor }
            }
        }
    }

    async fn run<S: PageSource>(&mut self, source: &S, trigger: Trigger) -> Result<LoadOutcome, GalleryError> {
        match trigger {
            Trigger::Fetch(request) => {
                let result = source.fetch_page(request.cursor, &self.filter).await;
                self.complete(request, result)
            }
            Trigger::Done(outcome) => Ok(outcome),
        }
    }

    pub async fn load_forward<S: PageSource>(&mut self, source: &S) -> Result<LoadOutcome, GalleryError> {
        let trigger = self.begin_forward();
        self.run(source, trigger).await
    }

    pub async fn load_backward<S: PageSource>(&mut self, source: &S) -> Result<LoadOutcome, GalleryError> {
        let trigger = self.begin_backward();
        self.run(source, trigger).await
    }

    pub async fn reset_to<S: PageSource>(&mut self, source: &S, offset: usize) -> Result<LoadOutcome, GalleryError> {
        let request = self.begin_reset(offset);
        self.run(source, Trigger::Fetch(request)).await
    }

    /// Fetches the page after the window into the prefetch slot. `None` when there is nothing to fetch.
    pub async fn prefetch_forward<S: PageSource>(&mut self, source: &S) -> Result<Option<LoadOutcome>, GalleryError> {
        match self.begin_prefetch_forward() {
            Some(request) => self.run(source, Trigger::Fetch(request)).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn prefetch_backward<S: PageSource>(&mut self, source: &S) -> Result<Option<LoadOutcome>, GalleryError> {
        match self.begin_prefetch_backward() {
            Some(request) => self.run(source, Trigger::Fetch(request)).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use chrono::NaiveDate;
    use crate::filter::{MediaTypeFilter, SortDirection};
    use crate::source::tests::photos;
    use crate::source::InMemoryPageSource;

    fn expect_fetch(trigger: Trigger) -> PageRequest {
        match trigger {
            Trigger::Fetch(request) => request,
            Trigger::Done(outcome) => panic!("expected a fetch, got {:?}", outcome),
        }
    }

    fn assert_contiguous(controller: &PaginationController) {
        let window = controller.window();
        assert_eq!(window.max_offset() - window.min_offset(), window.len());
        assert!(window.is_consistent());
        // fixture ids are 1-based offsets
        for (idx, entry) in window.entries().iter().enumerate() {
            assert_eq!(entry.id, (window.min_offset() + idx + 1).to_string());
        }
    }

    #[tokio::test]
    async fn test_empty_forward_page_stops_forward_fetches() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 600), ("2024-03-01", 400)]), 1000);
        let mut controller = PaginationController::new(1000, FilterState::default());
        controller.reset_to(&source, 0).await.unwrap();
        assert_eq!(controller.window().max_offset(), 1000);

        assert_eq!(controller.load_forward(&source).await.unwrap(), LoadOutcome::EndReached);
        assert_eq!(
            controller.load_forward(&source).await.unwrap(),
            LoadOutcome::Skipped(SkipReason::EndReached)
        );
        assert_eq!(source.fetch_log(), vec![0, 1000]);

        controller.set_filter(FilterState { media_type: MediaTypeFilter::Image, ..Default::default() });
        controller.reset_to(&source, 0).await.unwrap();
        controller.load_forward(&source).await.unwrap();
        assert_eq!(source.fetch_log(), vec![0, 1000, 0, 1000]);
    }

    #[tokio::test]
    async fn test_reset_loads_summary_and_page() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 5), ("2024-03-01", 3)]), 5);
        let mut controller = PaginationController::new(5, FilterState::default());
        assert_eq!(controller.reset_to(&source, 0).await.unwrap(), LoadOutcome::Replaced { offset: 0 });
        assert_eq!(controller.total(), 8);
        assert_eq!(controller.summary().buckets().len(), 2);

        assert_eq!(controller.reset_to(&source, 7).await.unwrap(), LoadOutcome::Replaced { offset: 5 });
        assert_eq!(controller.window().len(), 3);
        assert_eq!(controller.summary().total(), 8);
    }

    #[tokio::test]
    async fn test_jump_to_bucket_date_lands_on_that_date() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 5), ("2024-03-01", 3)]), 5);
        let mut controller = PaginationController::new(5, FilterState::default());
        controller.reset_to(&source, 0).await.unwrap();
        let target = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let offset = controller.summary().date_to_offset(target, SortDirection::Desc);
        assert_eq!(offset, 5);

        source.clear_fetch_log();
        controller.reset_to(&source, offset).await.unwrap();
        assert_eq!(source.fetch_log(), vec![5]);
        assert_eq!(controller.window().len(), 3);
        assert!(controller.window().entries().iter().all(|x| x.date() == target));
    }

    #[tokio::test]
    async fn test_backward_paging_walks_to_start() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 1500), ("2024-03-01", 1500)]), 1000);
        let mut controller = PaginationController::new(1000, FilterState::default());
        controller.reset_to(&source, 2500).await.unwrap();
        assert_eq!(controller.window().min_offset(), 2000);

        assert_eq!(controller.load_backward(&source).await.unwrap(), LoadOutcome::Prepended(1000));
        assert_eq!(controller.load_backward(&source).await.unwrap(), LoadOutcome::Prepended(1000));
        assert_eq!(
            controller.load_backward(&source).await.unwrap(),
            LoadOutcome::Skipped(SkipReason::AtStart)
        );
        assert_eq!(controller.window().len(), 3000);
        assert_contiguous(&controller);
    }

    #[tokio::test]
    async fn test_failure_leaves_window_and_sentinels_untouched() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 30)]), 10);
        let mut controller = PaginationController::new(10, FilterState::default());
        controller.reset_to(&source, 0).await.unwrap();

        source.fail_next(1);
        assert!(controller.load_forward(&source).await.is_err());
        assert_eq!(controller.window().max_offset(), 10);
        assert!(!controller.end_reached());
        assert!(!controller.is_loading());
        assert!(controller.last_error().is_some());

        assert_eq!(controller.load_forward(&source).await.unwrap(), LoadOutcome::Appended(10));
        assert_eq!(controller.last_error(), None);
    }

    #[tokio::test]
    async fn test_no_gaps_under_random_operations_and_failures() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-03", 230), ("2024-03-02", 170), ("2024-03-01", 95)]), 50);
        let mut controller = PaginationController::new(50, FilterState::default());
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for _ in 0..400 {
            if rng.gen_bool(0.2) {
                source.fail_next(1);
            }
            let _ = match rng.gen_range(0..7) {
                0 => controller.reset_to(&source, rng.gen_range(0..520)).await.map(Some),
                1 | 2 => controller.load_backward(&source).await.map(Some),
                3 => controller.prefetch_forward(&source).await,
                4 => controller.prefetch_backward(&source).await,
                _ => controller.load_forward(&source).await.map(Some),
            };
            source.fail_next(0);
            assert_contiguous(&controller);
            assert!(!controller.is_loading());
        }
    }

    #[test]
    fn test_concurrent_triggers_are_dropped() {
        let mut controller = PaginationController::new(10, FilterState::default());
        let _request = expect_fetch(controller.begin_forward());
        assert!(matches!(controller.begin_forward(), Trigger::Done(LoadOutcome::Skipped(SkipReason::InFlight))));
        assert!(matches!(controller.begin_backward(), Trigger::Done(LoadOutcome::Skipped(SkipReason::InFlight))));
    }

    #[test]
    fn test_completion_after_filter_change_is_stale() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 30)]), 10);
        let mut controller = PaginationController::new(10, FilterState::default());
        let request = expect_fetch(controller.begin_forward());
        let page = source.page(request.cursor, controller.filter());
        controller.set_filter(FilterState { search_query: "beach".to_string(), ..Default::default() });
        assert_eq!(controller.complete(request, Ok(page)).unwrap(), LoadOutcome::Stale);
        assert!(controller.window().is_empty());
    }

    #[test]
    fn test_prefetch_is_consumed_once_and_invalidated_by_reset() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 30)]), 10);
        let filter = FilterState::default();
        let mut controller = PaginationController::new(10, filter.clone());
        let reset = controller.begin_reset(0);
        controller.complete(reset, Ok(source.page(0, &filter))).unwrap();

        let prefetch = controller.begin_prefetch_forward().unwrap();
        assert_eq!(prefetch.cursor, 10);
        assert_eq!(controller.complete(prefetch, Ok(source.page(10, &filter))).unwrap(), LoadOutcome::Prefetched);
        assert!(matches!(controller.begin_forward(), Trigger::Done(LoadOutcome::Appended(10))));
        assert_eq!(expect_fetch(controller.begin_forward()).cursor, 20);

        let reset = controller.begin_reset(0);
        let page = source.page(0, &filter);
        controller.complete(reset, Ok(page)).unwrap();
        let prefetch = controller.begin_prefetch_forward().unwrap();
        controller.begin_reset(0);
        assert_eq!(controller.complete(prefetch, Ok(source.page(10, &filter))).unwrap(), LoadOutcome::Stale);
    }

    #[test]
    fn test_trigger_waits_for_pending_prefetch() {
        let source = InMemoryPageSource::new(photos(&[("2024-03-02", 30)]), 10);
        let filter = FilterState::default();
        let mut controller = PaginationController::new(10, filter.clone());
        let reset = controller.begin_reset(0);
        controller.complete(reset, Ok(source.page(0, &filter))).unwrap();

        let prefetch = controller.begin_prefetch_forward().unwrap();
        assert!(matches!(controller.begin_forward(), Trigger::Done(LoadOutcome::AwaitingPrefetch)));
        assert!(controller.is_loading());
        assert_eq!(controller.complete(prefetch, Ok(source.page(10, &filter))).unwrap(), LoadOutcome::Appended(10));
        assert!(!controller.is_loading());
    }
}
