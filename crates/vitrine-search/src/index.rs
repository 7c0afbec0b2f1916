//! The in-memory catalog index.
//!
//! A trigram posting index narrows the candidate set, then the fuzzy
//! subsequence scorer ranks candidates. The index is immutable once built:
//! it is a pure function of one snapshot, discarded and rebuilt wholesale
//! whenever the snapshot changes.

use vitrine_core::ProductRecord;

use crate::scoring::{fuzzy_match, MatchScore};

/// A packed 3-byte trigram, ASCII case-folded, big-endian:
/// `b0 << 16 | b1 << 8 | b2`.
type Trigram = u32;

#[inline]
fn pack(a: u8, b: u8, c: u8) -> Trigram {
    (u32::from(a) << 16) | (u32::from(b) << 8) | u32::from(c)
}

/// Appends all overlapping case-folded trigrams of `text` to `out`.
fn trigrams(text: &str, out: &mut Vec<Trigram>) {
    let bytes = text.as_bytes();
    if bytes.len() < 3 {
        return;
    }

    let mut a = bytes[0].to_ascii_lowercase();
    let mut b = bytes[1].to_ascii_lowercase();
    for &c_raw in &bytes[2..] {
        let c = c_raw.to_ascii_lowercase();
        out.push(pack(a, b, c));
        a = b;
        b = c;
    }
}

/// A catalog search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matched product.
    pub record: ProductRecord,
    /// The match quality; hits are returned best first.
    pub score: MatchScore,
}

/// Immutable fuzzy-search index over one catalog snapshot.
pub struct CatalogIndex {
    records: Vec<ProductRecord>,
    /// Sorted trigram keys; `offsets` has `keys.len() + 1` entries into
    /// `postings`.
    keys: Vec<Trigram>,
    offsets: Vec<u32>,
    postings: Vec<u32>,
}

impl CatalogIndex {
    /// Builds an index over `records`, indexing name, category, and
    /// description text.
    #[must_use]
    pub fn build(records: Vec<ProductRecord>) -> Self {
        // (trigram, slot) pairs packed into u64 so one sort groups postings.
        let mut pairs: Vec<u64> = Vec::new();
        let mut scratch: Vec<Trigram> = Vec::new();

        for (slot, record) in records.iter().enumerate() {
            scratch.clear();
            trigrams(&record.name, &mut scratch);
            trigrams(&record.category, &mut scratch);
            trigrams(&record.description, &mut scratch);
            scratch.sort_unstable();
            scratch.dedup();

            let slot = u32::try_from(slot).unwrap_or(u32::MAX);
            pairs.extend(scratch.iter().map(|&g| (u64::from(g) << 32) | u64::from(slot)));
        }
        pairs.sort_unstable();
        pairs.dedup();

        let mut keys = Vec::new();
        let mut offsets = vec![0u32];
        let mut postings = Vec::new();
        for pair in pairs {
            #[allow(clippy::cast_possible_truncation)]
            let trigram = (pair >> 32) as Trigram;
            #[allow(clippy::cast_possible_truncation)]
            let slot = pair as u32;

            if keys.last() != Some(&trigram) {
                keys.push(trigram);
                offsets.push(0);
            }
            postings.push(slot);
            if let Some(end) = offsets.last_mut() {
                *end = u32::try_from(postings.len()).unwrap_or(u32::MAX);
            }
        }

        Self {
            records,
            keys,
            offsets,
            postings,
        }
    }

    /// Number of indexed products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no products are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the posting list for `trigram` (sorted ascending).
    fn postings_for(&self, trigram: Trigram) -> &[u32] {
        match self.keys.binary_search(&trigram) {
            Ok(ix) => {
                let start = self.offsets[ix] as usize;
                let end = self.offsets[ix + 1] as usize;
                &self.postings[start..end]
            }
            Err(_) => &[],
        }
    }

    /// Candidate slots for `query`: the intersection of posting lists for
    /// every query trigram, rarest list first. Queries too short to carry a
    /// trigram scan everything.
    fn candidates(&self, query: &str) -> Vec<u32> {
        let mut q_trigrams = Vec::new();
        trigrams(query, &mut q_trigrams);
        if q_trigrams.is_empty() {
            return (0..u32::try_from(self.records.len()).unwrap_or(u32::MAX)).collect();
        }
        q_trigrams.sort_unstable();
        q_trigrams.dedup();

        let mut lists: Vec<&[u32]> = q_trigrams
            .iter()
            .map(|&t| self.postings_for(t))
            .collect();
        if lists.iter().any(|l| l.is_empty()) {
            return Vec::new();
        }
        lists.sort_by_key(|l| l.len());

        let base = lists[0];
        let rest = &lists[1..];
        base.iter()
            .copied()
            .filter(|slot| rest.iter().all(|list| list.binary_search(slot).is_ok()))
            .collect()
    }

    /// Searches the index, returning up to `limit` hits, best first.
    ///
    /// Candidates are scored against the product name first, falling back to
    /// category and description at a penalty, so name matches dominate.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .candidates(query)
            .into_iter()
            .filter_map(|slot| {
                let record = &self.records[slot as usize];
                score_record(query, record).map(|score| SearchHit {
                    record: record.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        hits.truncate(limit);
        hits
    }
}

/// Non-name fields match at a discount so name hits rank first.
const SECONDARY_FIELD_PENALTY: i32 = 24;

fn score_record(query: &str, record: &ProductRecord) -> Option<MatchScore> {
    let name = fuzzy_match(query, &record.name);

    let secondary = [&record.category, &record.description]
        .into_iter()
        .filter_map(|field| fuzzy_match(query, field))
        .map(|mut s| {
            s.score = s.score.saturating_sub(SECONDARY_FIELD_PENALTY);
            s
        })
        .max();

    match (name, secondary) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::ProductId;

    fn product(id: &str, name: &str, category: &str, description: &str) -> ProductRecord {
        ProductRecord {
            id: ProductId::new(id),
            name: name.to_string(),
            category: category.to_string(),
            price: 1_000,
            stock_quantity: 1,
            image_ref: String::new(),
            description: description.to_string(),
            review_count: 0,
            rating: 0.0,
        }
    }

    fn sample_index() -> CatalogIndex {
        CatalogIndex::build(vec![
            product("1", "Walnut desk", "furniture", "Solid walnut writing desk"),
            product("2", "Desk lamp", "lighting", "Brass lamp with dimmer"),
            product("3", "Garden chair", "furniture", "Weatherproof stacking chair"),
        ])
    }

    #[test]
    fn finds_products_by_name() {
        let index = sample_index();
        let hits = index.search("walnut", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id.as_str(), "1");
    }

    #[test]
    fn name_hits_rank_above_description_hits() {
        let index = sample_index();
        let hits = index.search("desk", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.name, "Desk lamp");
    }

    #[test]
    fn matches_category_text() {
        let index = sample_index();
        let hits = index.search("furniture", 10);
        let ids: Vec<_> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert!(ids.contains(&"1") && ids.contains(&"3"));
    }

    #[test]
    fn short_queries_fall_back_to_a_full_scan() {
        let index = sample_index();
        let hits = index.search("de", 10);
        assert!(!hits.is_empty());
    }

    #[test]
    fn unmatched_queries_return_nothing() {
        let index = sample_index();
        assert!(index.search("xylophone", 10).is_empty());
        assert!(index.search("", 10).is_empty());
    }

    #[test]
    fn limit_truncates_results() {
        let index = sample_index();
        assert_eq!(index.search("desk", 1).len(), 1);
    }

    #[test]
    fn empty_index_is_searchable() {
        let index = CatalogIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.search("desk", 10).is_empty());
    }
}
