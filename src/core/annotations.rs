use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::OnceLock;

use crate::error::{ScriptfoldError, Result};

/// Tag that marks a region whose text must survive minification untouched
pub const PRESERVE_TAG: &str = "preserve";

/// A tagged source range, derived from `#region` markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Byte range from the start of the `#region` line to the end of the
    /// matching `#endregion` line
    pub range: Range<usize>,

    /// Lower-cased words following `#region`
    pub tags: BTreeSet<String>,
}

impl Annotation {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Immutable set of annotations over one document
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    regions: Vec<Annotation>,
}

fn region_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ \t]*#region\b(.*)$").expect("Invalid region start regex"))
}

fn region_end_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ \t]*#endregion\b").expect("Invalid region end regex"))
}

impl Annotations {
    /// Extract all tagged regions from a document
    pub fn extract(text: &str) -> Result<Self> {
        let mut regions = Vec::new();
        let mut open: Vec<(usize, usize, BTreeSet<String>)> = Vec::new();
        let mut offset = 0;

        for (index, line) in text.split_inclusive('\n').enumerate() {
            let content = line.trim_end_matches(['\n', '\r']);
            if let Some(caps) = region_start_regex().captures(content) {
                let tags = caps
                    .get(1)
                    .map(|m| {
                        m.as_str()
                            .split_whitespace()
                            .map(|w| w.to_lowercase())
                            .collect()
                    })
                    .unwrap_or_default();
                open.push((offset, index + 1, tags));
            } else if region_end_regex().is_match(content) {
                let (start, _, tags) = open.pop().ok_or_else(|| {
                    ScriptfoldError::Parser(format!("#endregion without #region at line {}", index + 1))
                })?;
                if !tags.is_empty() {
                    regions.push(Annotation {
                        range: start..offset + content.len(),
                        tags,
                    });
                }
            }
            offset += line.len();
        }

        if let Some((_, line, _)) = open.pop() {
            return Err(ScriptfoldError::Parser(format!(
                "Unclosed #region starting at line {}",
                line
            )));
        }

        regions.sort_by_key(|r| r.range.start);
        Ok(Self { regions })
    }

    /// Outermost preserve spans in source order
    pub fn preserve_spans(&self) -> Vec<Range<usize>> {
        let mut spans: Vec<Range<usize>> = Vec::new();
        for region in self.regions.iter().filter(|r| r.has_tag(PRESERVE_TAG)) {
            if spans.last().map_or(false, |last| last.end >= region.range.end) {
                continue;
            }
            spans.push(region.range.clone());
        }
        spans
    }

    /// Whether a range lies inside any preserve span
    pub fn is_preserved(&self, range: &Range<usize>) -> bool {
        self.preserve_span_containing(range).is_some()
    }

    pub fn preserve_span_containing(&self, range: &Range<usize>) -> Option<Range<usize>> {
        self.regions
            .iter()
            .filter(|r| r.has_tag(PRESERVE_TAG))
            .find(|r| r.range.start <= range.start && range.end <= r.range.end)
            .map(|r| r.range.clone())
    }
}
