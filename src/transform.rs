//! Element transforms: what gets written in place of each target element.
//!
//! A transform sees the parsed element and its verbatim source text and
//! returns the literal fragments to emit instead. Returning the verbatim
//! text unchanged keeps the element; returning nothing drops it.

use crate::config::FilterRules;
use crate::pump::ParsedElement;
use std::fs;
use std::io;
use std::path::Path;

pub trait ElementTransform {
    fn transform(&mut self, element: &ParsedElement, verbatim: &str) -> Vec<String>;
}

impl<F> ElementTransform for F
where
    F: FnMut(&ParsedElement, &str) -> Vec<String>,
{
    fn transform(&mut self, element: &ParsedElement, verbatim: &str) -> Vec<String> {
        self(element, verbatim)
    }
}

/// Emits every element exactly as it appeared in the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ElementTransform for PassThrough {
    fn transform(&mut self, _element: &ParsedElement, verbatim: &str) -> Vec<String> {
        vec![verbatim.to_string()]
    }
}

/// Inserts literal content immediately before the first target element.
#[derive(Debug, Clone)]
pub struct AddBeforeFirst {
    content: String,
    inserted: bool,
}

impl AddBeforeFirst {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            inserted: false,
        }
    }

    /// Read the content to insert from a file. A leading UTF-8 byte order
    /// mark belongs to the file, not the content, and is dropped.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let mut content = fs::read_to_string(path)?;
        if content.starts_with('\u{FEFF}') {
            content.drain(..'\u{FEFF}'.len_utf8());
        }
        Ok(Self::new(content))
    }

    /// Whether the content has been emitted. Stays `false` for documents
    /// without target elements.
    pub fn inserted(&self) -> bool {
        self.inserted
    }
}

impl ElementTransform for AddBeforeFirst {
    fn transform(&mut self, _element: &ParsedElement, verbatim: &str) -> Vec<String> {
        if self.inserted {
            return vec![verbatim.to_string()];
        }
        self.inserted = true;
        vec![self.content.clone(), verbatim.to_string()]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub kept: usize,
    pub dropped: usize,
    /// Elements whose text was changed by at least one replace rule
    pub rewritten: usize,
}

/// Rewrites each element with the replace rules, then drops it if the
/// rewritten text matches any blacklist pattern.
#[derive(Debug, Clone)]
pub struct FilterTransform {
    rules: FilterRules,
    stats: FilterStats,
}

impl FilterTransform {
    pub fn new(rules: FilterRules) -> Self {
        Self {
            rules,
            stats: FilterStats::default(),
        }
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }
}

impl ElementTransform for FilterTransform {
    fn transform(&mut self, element: &ParsedElement, verbatim: &str) -> Vec<String> {
        let text = self.rules.apply_replacements(verbatim);
        if text != verbatim {
            self.stats.rewritten += 1;
        }

        if self.rules.is_blacklisted(&text) {
            log::debug!(
                "dropping {} {}",
                element.name,
                element.attribute("Name").unwrap_or("<unnamed>")
            );
            self.stats.dropped += 1;
            return Vec::new();
        }

        self.stats.kept += 1;
        vec![text.into_owned()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(name: &str) -> ParsedElement {
        let mut element = ParsedElement::new("Element");
        element.attributes.push(("Name".into(), name.into()));
        element
    }

    #[test]
    fn test_pass_through() {
        let out = PassThrough.transform(&element("A"), "<Element Name=\"A\"/>");
        assert_eq!(out, vec!["<Element Name=\"A\"/>".to_string()]);
    }

    #[test]
    fn test_add_fires_once() {
        let mut add = AddBeforeFirst::new("<Element Name=\"New\"/>");
        assert!(!add.inserted());

        let first = add.transform(&element("A"), "<A/>");
        let second = add.transform(&element("B"), "<B/>");

        assert_eq!(first, vec!["<Element Name=\"New\"/>".to_string(), "<A/>".to_string()]);
        assert_eq!(second, vec!["<B/>".to_string()]);
        assert!(add.inserted());
    }

    #[test]
    fn test_from_file_drops_byte_order_mark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("add.xml");
        fs::write(&path, b"\xEF\xBB\xBF<Element Name=\"New\"/>").unwrap();

        let mut add = AddBeforeFirst::from_file(&path).unwrap();
        let out = add.transform(&element("A"), "<Element Name=\"A\"/>");

        assert_eq!(out[0], "<Element Name=\"New\"/>");
        assert!(!out.concat().contains('\u{FEFF}'));
    }

    #[test]
    fn test_from_file_strips_only_leading_mark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("add.xml");
        fs::write(&path, "\u{FEFF}\u{FEFF}x").unwrap();

        // Only the leading mark is the file's.
        let mut add = AddBeforeFirst::from_file(&path).unwrap();
        assert_eq!(add.transform(&element("A"), "a")[0], "\u{FEFF}x");
    }

    #[test]
    fn test_filter_without_rules_keeps_everything() {
        let mut filter = FilterTransform::new(FilterRules::new());
        let out = filter.transform(&element("A"), "<Element Name=\"A\">\r\n</Element>");
        assert_eq!(out, vec!["<Element Name=\"A\">\r\n</Element>".to_string()]);
        assert_eq!(
            filter.stats(),
            FilterStats {
                kept: 1,
                dropped: 0,
                rewritten: 0
            }
        );
    }

    #[test]
    fn test_replace_runs_before_blacklist() {
        // The blacklist only matches after the rewrite.
        let rules = FilterRules::from_lines("Name=\"Gone\"", "Name=\"Old\"\tName=\"Gone\"").unwrap();
        let mut filter = FilterTransform::new(rules);

        assert!(filter
            .transform(&element("Old"), "<Element Name=\"Old\"/>")
            .is_empty());
        assert_eq!(
            filter.transform(&element("Keep"), "<Element Name=\"Keep\"/>"),
            vec!["<Element Name=\"Keep\"/>".to_string()]
        );

        let stats = filter.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.rewritten, 1);
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn test_replacement_output_is_emitted() {
        let rules = FilterRules::from_lines("", "SqlServer2016\tSqlAzure").unwrap();
        let mut filter = FilterTransform::new(rules);
        let out = filter.transform(&element("A"), "<Element Platform=\"SqlServer2016\"/>");
        assert_eq!(out, vec!["<Element Platform=\"SqlAzure\"/>".to_string()]);
    }

    #[test]
    fn test_closure_is_a_transform() {
        let mut upper = |_: &ParsedElement, verbatim: &str| vec![verbatim.to_uppercase()];
        assert_eq!(upper.transform(&element("a"), "<a/>"), vec!["<A/>".to_string()]);
    }
}
