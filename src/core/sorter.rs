use std::cmp::Ordering;
use std::path::Path;

use super::classifier::ScriptPart;

/// Deterministic ordering of script parts and units
///
/// Higher explicit weight first; among equal weights the canonical entry
/// file comes first, then case-insensitive display name. Sorting is stable,
/// so parts of one unit keep their source order.
pub struct PartSorter<'a> {
    entry_file: &'a str,
}

impl<'a> PartSorter<'a> {
    pub fn new(entry_file: &'a str) -> Self {
        Self { entry_file }
    }

    pub fn sort_parts(&self, parts: &mut [ScriptPart]) {
        parts.sort_by(|a, b| self.compare(a.weight(), a.unit(), b.weight(), b.unit()));
    }

    /// Order arbitrary items by the same key as parts
    pub fn sort_by_key<T>(&self, items: &mut [T], key: impl Fn(&T) -> (Option<i32>, &str)) {
        items.sort_by(|a, b| {
            let (wa, na) = key(a);
            let (wb, nb) = key(b);
            self.compare(wa, na, wb, nb)
        });
    }

    fn compare(&self, wa: Option<i32>, na: &str, wb: Option<i32>, nb: &str) -> Ordering {
        let weight = |w: Option<i32>| -(w.unwrap_or(0) as i64);
        weight(wa)
            .cmp(&weight(wb))
            .then_with(|| self.is_entry_file(nb).cmp(&self.is_entry_file(na)))
            .then_with(|| na.to_lowercase().cmp(&nb.to_lowercase()))
            .then_with(|| na.cmp(nb))
    }

    fn is_entry_file(&self, unit: &str) -> bool {
        Path::new(unit)
            .file_stem()
            .and_then(|s| s.to_str())
            .map_or(false, |stem| stem.eq_ignore_ascii_case(self.entry_file))
    }
}
