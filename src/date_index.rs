use chrono::NaiveDate;
use crate::entities::{PageResponse, TimelineBucket};
use crate::error::GalleryError;
use crate::filter::SortDirection;

/// Per-day counts for the whole filtered collection, newest day first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimelineSummary {
    buckets: Vec<TimelineBucket>,
    total: usize,
}

pub fn offset_to_page(offset: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return offset;
    }
    (offset / page_size) * page_size
}

impl TimelineSummary {
    pub fn new(mut buckets: Vec<TimelineBucket>) -> Self {
        buckets.sort_by(|a, b| b.date.cmp(&a.date));
        let total = buckets.iter().map(|x| x.count).sum();
        Self { buckets, total }
    }

    pub fn from_response(page: &PageResponse) -> Result<Self, GalleryError> {
        Ok(Self::new(page.timeline_buckets()?))
    }

    pub fn buckets(&self) -> &[TimelineBucket] {
        &self.buckets
    }

    /// Sum of all bucket counts.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn newest(&self) -> Option<NaiveDate> {
        self.buckets.first().map(|x| x.date)
    }

    pub fn oldest(&self) -> Option<NaiveDate> {
        self.buckets.last().map(|x| x.date)
    }

    /// Rank of the first item dated on or before `date` (descending), or on or after it (ascending).
    pub fn date_to_offset(&self, date: NaiveDate, direction: SortDirection) -> usize {
        match direction {
            SortDirection::Desc => self.buckets.iter()
                .take_while(|x| x.date > date)
                .map(|x| x.count)
                .sum(),
            SortDirection::Asc => self.buckets.iter()
                .rev()
                .take_while(|x| x.date < date)
                .map(|x| x.count)
                .sum(),
        }
    }

    /// The bucket closest to `date`. An exact match wins; otherwise the newer neighbour is
    /// chosen only when strictly closer, so ties go to the older bucket.
    pub fn nearest_bucket(&self, date: NaiveDate) -> Option<NaiveDate> {
        let split = self.buckets.partition_point(|x| x.date > date);
        let older = self.buckets.get(split).map(|x| x.date);
        let newer = split.checked_sub(1).and_then(|idx| self.buckets.get(idx)).map(|x| x.date);
        match (newer, older) {
            (_, Some(older)) if older == date => Some(older),
            (Some(newer), Some(older)) => {
                if (newer - date).num_days().abs() < (date - older).num_days().abs() {
                    Some(newer)
                } else {
                    Some(older)
                }
            }
            (newer, older) => older.or(newer),
        }
    }

    /// Date of the item at a global offset, walking cumulative counts.
    pub fn date_at_offset(&self, offset: usize, direction: SortDirection) -> Option<NaiveDate> {
        if offset >= self.total {
            return None;
        }
        let mut seen = 0;
        let mut reaches = |bucket: &TimelineBucket| {
            seen += bucket.count;
            offset < seen
        };
        match direction {
            SortDirection::Desc => self.buckets.iter().find(|&x| reaches(x)).map(|x| x.date),
            SortDirection::Asc => self.buckets.iter().rev().find(|&x| reaches(x)).map(|x| x.date),
        }
    }
}
