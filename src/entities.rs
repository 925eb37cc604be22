use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use crate::error::GalleryError;
use crate::utils::date_utils::{parse_timestamp, DateExtensions};

pub type MediaId = String;

/// Candidate widths offered to the renderer for images; never wider than the source.
const SRCSET_CANDIDATES: [u32; 3] = [200, 400, 800];
const POSTER_WIDTH: u32 = 800;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrcCandidate {
    pub url: String,
    pub width: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaSource {
    Image { srcset: Vec<SrcCandidate> },
    Video { playlist_url: String, poster_url: String },
}

impl MediaSource {
    /// Renders the image candidates as an HTML `srcset` attribute value.
    pub fn srcset_attr(&self) -> Option<String> {
        match self {
            MediaSource::Image { srcset } => Some(
                srcset.iter()
                    .map(|x| format!("{} {}w", x.url, x.width))
                    .collect::<Vec<String>>()
                    .join(", "),
            ),
            MediaSource::Video { .. } => None,
        }
    }
}

/// One photo or video as materialized in the loaded window.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaEntry {
    pub id: MediaId,
    pub width: u32,
    pub height: u32,
    pub taken_at: NaiveDateTime,
    pub kind: MediaKind,
    pub color: String,
    pub path: String,
    pub source: MediaSource,
}

impl MediaEntry {
    pub fn date(&self) -> NaiveDate {
        self.taken_at.date()
    }

    /// Width over height; degenerate dimensions fall back to a square.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// Per-day count for the whole filtered collection.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineBucket {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub total: usize,
    #[serde(rename = "pagesize")]
    pub page_size: usize,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ApiTimelineItem {
    pub date: String,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ApiPhoto {
    pub id: u64,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub c: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    pub d: String,
    #[serde(default)]
    pub path: String,
}

/// One page of the timeline endpoint, exactly as it travels over the wire.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PageResponse {
    pub meta: PageMeta,
    #[serde(default)]
    pub timeline: Vec<ApiTimelineItem>,
    #[serde(default)]
    pub photos: Vec<ApiPhoto>,
}

impl PageResponse {
    pub fn next_cursor(&self) -> Option<usize> {
        self.meta.next_cursor.parse().ok()
    }

    pub fn media_entries(&self) -> Result<Vec<MediaEntry>, GalleryError> {
        self.photos.iter().map(MediaEntry::try_from).collect()
    }

    pub fn timeline_buckets(&self) -> Result<Vec<TimelineBucket>, GalleryError> {
        self.timeline.iter()
            .map(|x| {
                let date = NaiveDate::parse_from_str(&x.date, "%Y-%m-%d")
                    .map_err(|_| GalleryError::InvalidDate(x.date.clone()))?;
                Ok(TimelineBucket { date, count: x.count })
            })
            .collect()
    }
}

impl TryFrom<&ApiPhoto> for MediaEntry {
    type Error = GalleryError;

    fn try_from(photo: &ApiPhoto) -> Result<Self, Self::Error> {
        let taken_at = parse_timestamp(&photo.d)
            .ok_or_else(|| GalleryError::InvalidDate(photo.d.clone()))?;
        let kind = match photo.t.as_deref() {
            Some("video") => MediaKind::Video,
            _ => MediaKind::Image,
        };
        let id = photo.id.to_string();
        let source = match kind {
            MediaKind::Video => MediaSource::Video {
                playlist_url: format!("/api/transcode/{}/index.m3u8", id),
                poster_url: format!("/api/img/{}/{}", id, POSTER_WIDTH),
            },
            MediaKind::Image => MediaSource::Image {
                srcset: SRCSET_CANDIDATES.iter()
                    .filter(|&&w| w <= photo.w)
                    .map(|&w| SrcCandidate { url: format!("/api/img/{}/{}", id, w), width: w })
                    .collect(),
            },
        };
        Ok(MediaEntry {
            id,
            width: photo.w,
            height: photo.h,
            taken_at,
            kind,
            color: photo.c.clone(),
            path: photo.path.clone(),
            source,
        })
    }
}

impl From<&MediaEntry> for ApiPhoto {
    fn from(entry: &MediaEntry) -> Self {
        ApiPhoto {
            id: entry.id.parse().unwrap_or_default(),
            w: entry.width,
            h: entry.height,
            c: entry.color.clone(),
            t: match entry.kind {
                MediaKind::Video => Some("video".to_string()),
                MediaKind::Image => None,
            },
            d: entry.date().day_key(),
            path: entry.path.clone(),
        }
    }
}
