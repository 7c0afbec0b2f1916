//! Fuzzy subsequence scoring.
//!
//! Matching is ASCII case-insensitive: inputs are treated as raw bytes and
//! only `A-Z`/`a-z` are folded, which is sufficient for catalog text. The
//! scorer ranks candidates where the query appears as a (not necessarily
//! contiguous) subsequence, preferring prefix matches, word-start hits, and
//! tight runs over scattered ones.

use std::cmp::Ordering;

/// The kind of match that was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Candidate starts with the query (case-insensitive).
    Prefix,
    /// General fuzzy subsequence match.
    Fuzzy,
}

/// Score returned by [`fuzzy_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchScore {
    /// Match kind; prefix matches always rank above fuzzy ones.
    pub kind: MatchKind,
    /// Relative quality within the kind; higher is better.
    pub score: i32,
}

impl MatchScore {
    /// Returns a sort key: prefix beats fuzzy, then score descending.
    #[must_use]
    pub fn rank_key(self) -> (i32, i32) {
        let kind_rank = match self.kind {
            MatchKind::Prefix => 2,
            MatchKind::Fuzzy => 1,
        };
        (kind_rank, self.score)
    }
}

impl Ord for MatchScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

impl PartialOrd for MatchScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn fold(b: u8) -> u8 {
    b.to_ascii_lowercase()
}

#[inline]
fn is_separator(b: u8) -> bool {
    matches!(b, b'_' | b'-' | b' ' | b'/' | b'.' | b',' | b'(' | b')')
}

/// True when position `i` begins a word within `candidate`.
fn is_word_start(candidate: &[u8], i: usize) -> bool {
    i == 0 || is_separator(candidate[i - 1])
}

const WORD_START_BONUS: i32 = 16;
const CONSECUTIVE_BONUS: i32 = 8;
const GAP_PENALTY: i32 = 1;

/// Scores `query` against `candidate`, returning `None` when the query is
/// not a case-insensitive subsequence of the candidate.
///
/// Greedy left-to-right matching: each query byte consumes the next
/// occurrence in the candidate. Word-start and consecutive-run bonuses make
/// `"wal desk"`-style queries land on `"Walnut desk"` ahead of scattered
/// matches.
#[must_use]
pub fn fuzzy_match(query: &str, candidate: &str) -> Option<MatchScore> {
    let query = query.as_bytes();
    let candidate = candidate.as_bytes();

    if query.is_empty() || query.len() > candidate.len() {
        return None;
    }

    let is_prefix = candidate
        .iter()
        .zip(query.iter())
        .all(|(&c, &q)| fold(c) == fold(q));

    let mut score = 0i32;
    let mut qi = 0usize;
    let mut prev_hit: Option<usize> = None;

    for (ci, &c) in candidate.iter().enumerate() {
        if qi == query.len() {
            break;
        }
        if fold(c) != fold(query[qi]) {
            continue;
        }

        if is_word_start(candidate, ci) {
            score += WORD_START_BONUS;
        }
        match prev_hit {
            Some(prev) if ci == prev + 1 => score += CONSECUTIVE_BONUS,
            Some(prev) => {
                let gap = i32::try_from(ci - prev - 1).unwrap_or(i32::MAX);
                score = score.saturating_sub(gap * GAP_PENALTY);
            }
            None => {
                // Penalize matches that start deep inside the candidate.
                let lead = i32::try_from(ci).unwrap_or(i32::MAX);
                score = score.saturating_sub(lead * GAP_PENALTY);
            }
        }
        prev_hit = Some(ci);
        qi += 1;
    }

    if qi < query.len() {
        return None;
    }

    // Shorter candidates rank above longer ones at equal match quality.
    score = score.saturating_sub(i32::try_from(candidate.len()).unwrap_or(i32::MAX) / 4);

    Some(MatchScore {
        kind: if is_prefix {
            MatchKind::Prefix
        } else {
            MatchKind::Fuzzy
        },
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_subsequence_does_not_match() {
        assert!(fuzzy_match("desk", "chair").is_none());
        assert!(fuzzy_match("deskx", "desk").is_none());
    }

    #[test]
    fn prefix_matches_rank_above_fuzzy_matches() {
        let prefix = fuzzy_match("wal", "Walnut desk").expect("match");
        let fuzzy = fuzzy_match("wal", "Sidewall lamp").expect("match");
        assert_eq!(prefix.kind, MatchKind::Prefix);
        assert_eq!(fuzzy.kind, MatchKind::Fuzzy);
        assert!(prefix > fuzzy);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(fuzzy_match("WALNUT", "walnut desk").is_some());
        assert!(fuzzy_match("walnut", "WALNUT DESK").is_some());
    }

    #[test]
    fn word_start_hits_beat_scattered_hits() {
        let word_start = fuzzy_match("wd", "walnut desk").expect("match");
        let scattered = fuzzy_match("wd", "weathered").expect("match");
        assert!(word_start.score > scattered.score);
    }
}
