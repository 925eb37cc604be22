use std::cell::{Cell, RefCell};
use std::sync::Arc;
use itertools::Itertools;
use log::debug;
use reqwest::Client;
use crate::entities::{ApiPhoto, ApiTimelineItem, PageMeta, PageResponse};
use crate::error::GalleryError;
use crate::filter::{FilterState, MediaTypeFilter, SortDirection};
use crate::utils::date_utils::{parse_day, DateExtensions};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Upstream collaborator serving pages of the filtered, ordered collection.
pub trait PageSource {
    async fn fetch_page(&self, cursor: usize, filter: &FilterState) -> Result<PageResponse, GalleryError>;
}

impl<T: PageSource> PageSource for &T {
    async fn fetch_page(&self, cursor: usize, filter: &FilterState) -> Result<PageResponse, GalleryError> {
        (**self).fetch_page(cursor, filter).await
    }
}

#[derive(Debug)]
struct HttpSourceConfig {
    api_url: String,
}

#[derive(Clone, Debug)]
pub struct HttpPageSource {
    client: Client,
    config: Arc<HttpSourceConfig>,
}

impl HttpPageSource {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(HttpSourceConfig { api_url: api_url.trim_end_matches('/').to_string() }),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }
}

impl PageSource for HttpPageSource {
    async fn fetch_page(&self, cursor: usize, filter: &FilterState) -> Result<PageResponse, GalleryError> {
        let url = format!("{}/api/timeline", self.config.api_url);
        let mut query = vec![("cursor", cursor.to_string())];
        query.extend(filter.api_params());
        debug!("GET {} {:?}", url, query);
        let res = self.client.get(&url).query(&query).send().await
            .map_err(GalleryError::NetworkError)?;
        let status = res.status();
        if !status.is_success() {
            return Err(GalleryError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }
        let body = res.text().await.map_err(GalleryError::NetworkError)?;
        let page: PageResponse = serde_json::from_str(&body).map_err(GalleryError::ParseError)?;
        Ok(page)
    }
}

/// In-process implementation of the timeline endpoint over a fixed collection.
///
/// Photos are expected newest first; ascending sort reverses them. Search text matches the
/// photo path. Failures can be injected and every requested cursor is logged.
#[derive(Debug, Default)]
pub struct InMemoryPageSource {
    photos: Vec<ApiPhoto>,
    page_size: usize,
    failures: Cell<usize>,
    fetch_log: RefCell<Vec<usize>>,
}

impl InMemoryPageSource {
    pub fn new(photos: Vec<ApiPhoto>, page_size: usize) -> Self {
        Self {
            photos,
            page_size: page_size.max(1),
            failures: Cell::new(0),
            fetch_log: RefCell::new(Vec::new()),
        }
    }

    /// Makes the next `count` fetches fail with `SourceUnavailable`.
    pub fn fail_next(&self, count: usize) {
        self.failures.set(count);
    }

    pub fn fetch_log(&self) -> Vec<usize> {
        self.fetch_log.borrow().clone()
    }

    pub fn clear_fetch_log(&self) {
        self.fetch_log.borrow_mut().clear();
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Builds the response synchronously; the async trait method only adds failure injection.
    pub fn page(&self, cursor: usize, filter: &FilterState) -> PageResponse {
        let mut matching = self.photos.iter()
            .filter(|p| match filter.media_type {
                MediaTypeFilter::All => true,
                MediaTypeFilter::Image => p.t.as_deref() != Some("video"),
                MediaTypeFilter::Video => p.t.as_deref() == Some("video"),
            })
            .filter(|p| filter.search_query.is_empty() || p.path.contains(&filter.search_query))
            .filter(|p| filter.folder.as_deref().map_or(true, |f| p.path.starts_with(f)))
            .cloned()
            .collect::<Vec<ApiPhoto>>();
        if filter.sort.direction == SortDirection::Asc {
            matching.reverse();
        }
        let total = matching.len();
        let timeline = if cursor == 0 {
            matching.iter()
                .map(|p| day_bucket(&p.d))
                .sorted_by(|a, b| b.cmp(a))
                .dedup_with_count()
                .map(|(count, date)| ApiTimelineItem { date, count })
                .collect()
        } else {
            vec![]
        };
        let photos = matching.into_iter()
            .skip(cursor)
            .take(self.page_size)
            .collect::<Vec<ApiPhoto>>();
        let next = cursor + self.page_size;
        let next_cursor = if photos.len() >= self.page_size && next < total {
            next.to_string()
        } else {
            String::new()
        };
        PageResponse {
            meta: PageMeta { total, page_size: self.page_size, next_cursor },
            timeline,
            photos,
        }
    }
}

/// Bucket key of a photo timestamp: the same UTC day `MediaEntry` is dated by.
/// Unparsable values are kept as they are so the summary rejects them.
fn day_bucket(value: &str) -> String {
    parse_day(value).map(|x| x.day_key()).unwrap_or_else(|| value.to_string())
}

impl PageSource for InMemoryPageSource {
    async fn fetch_page(&self, cursor: usize, filter: &FilterState) -> Result<PageResponse, GalleryError> {
        self.fetch_log.borrow_mut().push(cursor);
        let failures = self.failures.get();
        if failures > 0 {
            self.failures.set(failures - 1);
            return Err(GalleryError::SourceUnavailable(format!("injected failure at cursor {}", cursor)));
        }
        Ok(self.page(cursor, filter))
    }
}

/// Deterministic demo collection: `days` consecutive days ending at `newest`, newest first,
/// with a varying number of photos per day and every seventh item a video.
pub fn demo_photos(newest: chrono::NaiveDate, days: usize) -> Vec<ApiPhoto> {
    let mut photos = Vec::new();
    let mut id = 1u64;
    for day in 0..days {
        let date = newest - chrono::Duration::days(day as i64);
        let per_day = 1 + (day * 7 + 3) % 11;
        for i in 0..per_day {
            let (w, h) = match (day + i) % 4 {
                0 => (1600, 1067),
                1 => (1067, 1600),
                2 => (1200, 1200),
                _ => (1920, 1080),
            };
            photos.push(ApiPhoto {
                id,
                w,
                h,
                c: format!("#{:06x}", (id * 2_654_435_761) % 0xFFFFFF),
                t: if id % 7 == 0 { Some("video".to_string()) } else { None },
                d: date.format("%Y-%m-%d").to_string(),
                path: format!("{}/IMG_{:05}.jpg", date.format("%Y/%m"), id),
            });
            id += 1;
        }
    }
    photos
}
