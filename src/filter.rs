use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use crate::utils::date_utils::{parse_day, DateExtensions};
use crate::utils::normalize_query;
use crate::utils::str_utils::StringExtensions;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaTypeFilter {
    #[default]
    All,
    Image,
    Video,
}

impl MediaTypeFilter {
    fn as_param(&self) -> Option<&'static str> {
        match self {
            MediaTypeFilter::All => None,
            MediaTypeFilter::Image => Some("image"),
            MediaTypeFilter::Video => Some("video"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Date,
    Modified,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Everything that scopes the collection. Any change resets the loaded window, the
/// timeline summary and the scroll position.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FilterState {
    pub search_query: String,
    pub min_rating: u8,
    pub tag: Option<String>,
    pub folder: Option<String>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub software: Option<String>,
    pub focal_length_35: Option<u32>,
    pub media_type: MediaTypeFilter,
    pub sort: SortOrder,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            min_rating: 1,
            tag: None,
            folder: None,
            camera: None,
            lens: None,
            software: None,
            focal_length_35: None,
            media_type: MediaTypeFilter::All,
            sort: SortOrder::default(),
        }
    }
}

/// Result of splitting the search box into free text and one trailing `key:value` token.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchTokens {
    pub search_query: String,
    pub tag: Option<String>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub software: Option<String>,
    pub folder: Option<String>,
    pub focal_length_35: Option<u32>,
}

const TOKEN_KEYS: [&str; 6] = ["tag", "camera", "lens", "software", "folder", "focallength35"];

/// Extracts a single `key:value` token from the end of the input. The value runs to the end
/// of the string, so it may contain spaces (`camera:NIKON Z 9`).
pub fn parse_search_tokens(raw: &str) -> SearchTokens {
    let lower = raw.to_ascii_lowercase();
    let found = TOKEN_KEYS.iter()
        .filter_map(|key| {
            let pattern = format!("{}:", key);
            lower.match_indices(&pattern)
                .map(|(idx, _)| idx)
                .find(|&idx| idx == 0 || !raw[..idx].chars().last().is_some_and(|c| c.is_alphanumeric() || c == '_'))
                .map(|idx| (idx, *key))
        })
        .min_by_key(|(idx, _)| *idx);

    let Some((idx, key)) = found else {
        return SearchTokens { search_query: raw.trim().to_string(), ..Default::default() };
    };
    let value = raw[idx + key.len() + 1..].trim().to_string();
    if value.is_empty() {
        return SearchTokens { search_query: raw.trim().to_string(), ..Default::default() };
    }
    let mut tokens = SearchTokens { search_query: raw[..idx].trim().to_string(), ..Default::default() };
    match key {
        "tag" => tokens.tag = Some(value),
        "camera" => tokens.camera = Some(value),
        "lens" => tokens.lens = Some(value),
        "software" => tokens.software = Some(value),
        "folder" => tokens.folder = Some(value),
        _ => tokens.focal_length_35 = value.parse().ok(),
    }
    tokens
}

impl FilterState {
    /// Applies the contents of the search box, replacing every facet the box can express.
    pub fn apply_search_input(&mut self, raw: &str) {
        let tokens = parse_search_tokens(raw);
        self.search_query = normalize_query(&tokens.search_query);
        self.tag = tokens.tag;
        self.camera = tokens.camera;
        self.lens = tokens.lens;
        self.software = tokens.software;
        self.folder = tokens.folder;
        self.focal_length_35 = tokens.focal_length_35;
    }

    /// Parameters sent to the paging API; rating is only sent from 2 stars up.
    pub fn api_params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.facet_params();
        params.push(("orderby", match self.sort.field {
            SortField::Date => "date".to_string(),
            SortField::Modified => "modified".to_string(),
        }));
        params.push(("direction", match self.sort.direction {
            SortDirection::Asc => "asc".to_string(),
            SortDirection::Desc => "desc".to_string(),
        }));
        params
    }

    fn facet_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(term) = self.search_query.non_empty() {
            params.push(("term", term));
        }
        if self.min_rating > 1 {
            params.push(("rating", self.min_rating.to_string()));
        }
        let facets = [
            ("tag", &self.tag),
            ("camera", &self.camera),
            ("lens", &self.lens),
            ("software", &self.software),
            ("folder", &self.folder),
        ];
        for (key, value) in facets {
            if let Some(value) = value.as_deref().and_then(|x| x.non_empty()) {
                params.push((key, value));
            }
        }
        if let Some(focal) = self.focal_length_35.filter(|x| *x > 0) {
            params.push(("focallength35", focal.to_string()));
        }
        if let Some(kind) = self.media_type.as_param() {
            params.push(("type", kind.to_string()));
        }
        params
    }

    /// Parameters for a shareable URL: same as the API parameters minus default sort values.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.facet_params();
        if self.sort.field == SortField::Modified {
            params.push(("orderby", "modified".to_string()));
        }
        if self.sort.direction == SortDirection::Asc {
            params.push(("direction", "asc".to_string()));
        }
        params
    }

    /// Builds the filter from query pairs; unknown keys and malformed numbers are ignored.
    pub fn from_query_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        let mut filter = FilterState::default();
        for (key, value) in pairs {
            match key {
                "term" => filter.search_query = normalize_query(&value),
                "rating" => filter.min_rating = value.parse().unwrap_or(1),
                "tag" => filter.tag = value.non_empty(),
                "folder" => filter.folder = value.non_empty(),
                "camera" => filter.camera = value.non_empty(),
                "lens" => filter.lens = value.non_empty(),
                "software" => filter.software = value.non_empty(),
                "focallength35" => filter.focal_length_35 = value.parse().ok(),
                "type" => filter.media_type = match value.as_str() {
                    "image" => MediaTypeFilter::Image,
                    "video" => MediaTypeFilter::Video,
                    _ => MediaTypeFilter::All,
                },
                "orderby" => filter.sort.field = match value.as_str() {
                    "modified" => SortField::Modified,
                    _ => SortField::Date,
                },
                "direction" => filter.sort.direction = match value.as_str() {
                    "asc" => SortDirection::Asc,
                    _ => SortDirection::Desc,
                },
                _ => {}
            }
        }
        filter
    }
}

/// The navigable state of the timeline: what is filtered and which day is being looked at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub filter: FilterState,
    pub date: Option<NaiveDate>,
}

impl Location {
    pub fn from_query(query: &str) -> Self {
        let pairs = parse_query(query);
        let date = pairs.iter()
            .find(|(k, _)| k == "date")
            .and_then(|(_, v)| parse_day(v));
        let filter = FilterState::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.clone())));
        Self { filter, date }
    }

    pub fn to_query(&self) -> String {
        let mut params = self.filter.query_params();
        if let Some(date) = self.date {
            params.push(("date", date.day_key()));
        }
        encode_query(&params)
    }
}

pub fn encode_query(params: &[(&str, String)]) -> String {
    params.iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .join("&")
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query.trim_start_matches('?')
        .split('&')
        .filter(|x| !x.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let v = v.replace('+', " ");
            let v = urlencoding::decode(&v).map(|x| x.into_owned()).unwrap_or(v);
            (k.to_string(), v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_word_camera() {
        let result = parse_search_tokens("camera:NIKON");
        assert_eq!(result.camera.as_deref(), Some("NIKON"));
        assert_eq!(result.search_query, "");
    }

    #[test]
    fn test_parse_multi_word_value_keeps_search_text() {
        let result = parse_search_tokens("sunset beach camera:NIKON D750");
        assert_eq!(result.camera.as_deref(), Some("NIKON D750"));
        assert_eq!(result.search_query, "sunset beach");

        let result = parse_search_tokens("software:Adobe Lightroom Classic");
        assert_eq!(result.software.as_deref(), Some("Adobe Lightroom Classic"));
    }

    #[test]
    fn test_parse_tokens_case_insensitive_key() {
        let result = parse_search_tokens("mountains winter TAG:landscape");
        assert_eq!(result.tag.as_deref(), Some("landscape"));
        assert_eq!(result.search_query, "mountains winter");
    }

    #[test]
    fn test_parse_folder_and_focal_length() {
        assert_eq!(parse_search_tokens("folder:2022/vacation").folder.as_deref(), Some("2022/vacation"));
        let result = parse_search_tokens("focallength35:50");
        assert_eq!(result.focal_length_35, Some(50));
        assert_eq!(result.search_query, "");
    }

    #[test]
    fn test_parse_plain_and_empty() {
        assert_eq!(parse_search_tokens("sunset beach").search_query, "sunset beach");
        assert_eq!(parse_search_tokens("sunset beach").camera, None);
        assert_eq!(parse_search_tokens(""), SearchTokens::default());
        // a key embedded in another word is not a token
        assert_eq!(parse_search_tokens("retag:x").tag, None);
    }

    #[test]
    fn test_api_params_omit_defaults_but_keep_sort() {
        let filter = FilterState::default();
        assert_eq!(
            filter.api_params(),
            vec![("orderby", "date".to_string()), ("direction", "desc".to_string())]
        );
        assert!(filter.query_params().is_empty());
    }

    #[test]
    fn test_rating_only_sent_from_two_stars() {
        let mut filter = FilterState { min_rating: 1, ..Default::default() };
        assert!(!filter.api_params().iter().any(|(k, _)| *k == "rating"));
        filter.min_rating = 3;
        assert!(filter.api_params().contains(&("rating", "3".to_string())));
    }

    #[test]
    fn test_location_round_trip() {
        let mut filter = FilterState::default();
        filter.apply_search_input("sunset  beach camera:NIKON Z 9");
        filter.media_type = MediaTypeFilter::Video;
        filter.sort = SortOrder { field: SortField::Modified, direction: SortDirection::Asc };
        filter.min_rating = 4;
        let location = Location { filter, date: NaiveDate::from_ymd_opt(2024, 3, 1) };

        let query = location.to_query();
        assert!(query.contains("camera=NIKON%20Z%209"));
        assert!(query.contains("date=2024-03-01"));
        assert_eq!(Location::from_query(&format!("?{}", query)), location);
    }

    #[test]
    fn test_location_from_query_defaults() {
        let location = Location::from_query("?rating=abc&type=gif&unknown=1&term=a+b");
        assert_eq!(location.filter.min_rating, 1);
        assert_eq!(location.filter.media_type, MediaTypeFilter::All);
        assert_eq!(location.filter.search_query, "a b");
        assert_eq!(location.date, None);
    }
}
