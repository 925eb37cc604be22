use itertools::Itertools;

pub trait StringExtensions {
    /// `None` for empty or whitespace-only strings, otherwise the trimmed value.
    fn non_empty(&self) -> Option<String>;

    /// Collapse runs of whitespace into single spaces.
    /// E.g. `"  sunset   beach ".collapse_whitespace() == "sunset beach"`
    fn collapse_whitespace(&self) -> String;
}

impl StringExtensions for str {
    fn non_empty(&self) -> Option<String> {
        let trimmed = self.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn collapse_whitespace(&self) -> String {
        self.split_whitespace().join(" ")
    }
}

impl StringExtensions for String {
    fn non_empty(&self) -> Option<String> {
        self.as_str().non_empty()
    }

    fn collapse_whitespace(&self) -> String {
        self.as_str().collapse_whitespace()
    }
}

#[test]
fn test_non_empty() {
    assert_eq!("  ".non_empty(), None);
    assert_eq!("".to_string().non_empty(), None);
    assert_eq!(" NIKON D750 ".non_empty(), Some("NIKON D750".to_string()));
}

#[test]
fn test_collapse_whitespace() {
    assert_eq!("  sunset   beach ".collapse_whitespace(), "sunset beach");
    assert_eq!("\tmountains\nwinter".to_string().collapse_whitespace(), "mountains winter");
    assert_eq!("".collapse_whitespace(), "");
}
