//! Identity resolution: deciding whether an observed anime is one we
//! already track.
//!
//! Source names drift between the website and the API (fullwidth symbols,
//! decorative punctuation), so after an exact comparison fails we retry with
//! a small fixed set of punctuation stripped from both sides. Anything
//! fuzzier than that risks merging genuinely different shows.

use crate::store::Index;

/// Characters ignored during the second, normalized comparison pass.
const STRIPPED_PUNCTUATION: [char; 4] = ['☆', '-', '!', '?'];

#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect()
}

/// Looks up a candidate by name against the index.
///
/// Matching is case-sensitive: exact on `name` or `name_cn` first, then a
/// second pass with [`STRIPPED_PUNCTUATION`] removed from both sides. Ties
/// go to the lowest `local_id`, which for a monotonic allocator is the
/// earliest-inserted entity. Returns `None` when the candidate has no name
/// to match on.
#[must_use]
pub fn resolve(name: &str, name_cn: &str, index: &Index) -> Option<u32> {
    if name.is_empty() && name_cn.is_empty() {
        return None;
    }

    for (&local_id, entry) in index {
        if (!name.is_empty() && name == entry.name)
            || (!name_cn.is_empty() && name_cn == entry.name_cn)
        {
            return Some(local_id);
        }
    }

    let clean = normalize_name(name);
    let clean_cn = normalize_name(name_cn);

    for (&local_id, entry) in index {
        if !clean.is_empty() {
            let entry_clean = normalize_name(&entry.name);
            if !entry_clean.is_empty() && clean == entry_clean {
                return Some(local_id);
            }
        }
        if !clean_cn.is_empty() {
            let entry_clean_cn = normalize_name(&entry.name_cn);
            if !entry_clean_cn.is_empty() && clean_cn == entry_clean_cn {
                return Some(local_id);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IndexEntry;

    fn entry(name: &str, name_cn: &str) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            name_cn: name_cn.to_string(),
            cover: String::new(),
            theme_color: String::new(),
            points: Vec::new(),
            inform: String::new(),
        }
    }

    #[test]
    fn exact_match_on_either_name() {
        let mut index = Index::new();
        index.insert(3, entry("ゆるキャン△", "摇曳露营"));

        assert_eq!(resolve("ゆるキャン△", "", &index), Some(3));
        assert_eq!(resolve("", "摇曳露营", &index), Some(3));
        assert_eq!(resolve("something else", "别的", &index), None);
    }

    #[test]
    fn punctuation_drift_still_matches() {
        let mut index = Index::new();
        index.insert(7, entry("A☆B", "甲"));

        assert_eq!(resolve("A-B!", "", &index), Some(7));
    }

    #[test]
    fn no_key_means_no_match() {
        let mut index = Index::new();
        index.insert(1, entry("", ""));

        assert_eq!(resolve("", "", &index), None);
        // A candidate made entirely of stripped punctuation must not match
        // an entry that normalizes to empty either.
        assert_eq!(resolve("!?", "", &index), None);
    }

    #[test]
    fn earliest_inserted_entity_wins() {
        let mut index = Index::new();
        index.insert(12, entry("Same Title", ""));
        index.insert(4, entry("Same Title", ""));

        assert_eq!(resolve("Same Title", "", &index), Some(4));
    }

    #[test]
    fn exact_pass_runs_before_normalized_pass() {
        let mut index = Index::new();
        index.insert(1, entry("AB", ""));
        index.insert(2, entry("A-B", ""));

        // "A-B" matches entry 2 exactly even though entry 1 would match
        // after normalization and has a lower id.
        assert_eq!(resolve("A-B", "", &index), Some(2));
    }
}
