pub mod date_utils;
pub mod str_utils;

use crate::utils::str_utils::StringExtensions;

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn normalize_query(query: &str) -> String {
    query.collapse_whitespace()
}
