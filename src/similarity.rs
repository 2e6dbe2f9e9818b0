//! Character-sequence similarity between a target string and the rows of a table.
//!
//! Scores are the Ratcliff/Obershelp ratio `2 * M / T`, where `M` counts the characters in
//! the matching blocks found by recursively taking the longest common block, and `T` is the
//! combined length of both strings. Block selection follows Python's `difflib.SequenceMatcher`
//! exactly (including its "popular element" heuristic for sequences of 200 or more characters),
//! so scores agree with it to the last bit.

use crate::table::Table;
use std::collections::HashMap;

/// Sequences at least this long drop "popular" characters from the match index
const AUTOJUNK_MIN_LENGTH: usize = 200;

/// Matcher for one pair of strings. The index is built over `b`.
pub struct SequenceMatcher {
    a: Vec<char>,
    b: Vec<char>,
    /// Positions of each character of `b`, popular characters excluded
    b2j: HashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    pub fn new(a: &str, b: &str) -> SequenceMatcher {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, character) in b.iter().enumerate() {
            b2j.entry(*character).or_default().push(j);
        }
        if b.len() >= AUTOJUNK_MIN_LENGTH {
            let threshold = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= threshold);
        }
        SequenceMatcher { a, b, b2j }
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
    /// Among equally long blocks the one starting earliest in `a`, then in `b`, wins.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next_j2len: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|previous| j2len.get(&previous)).copied().unwrap_or(0) + 1;
                    next_j2len.insert(j, k);
                    if k > best_size {
                        (best_i, best_j, best_size) = (i + 1 - k, j + 1 - k, k);
                    }
                }
            }
            j2len = next_j2len;
        }

        // Popular characters are missing from the index but still extend a block.
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }
        (best_i, best_j, best_size)
    }

    /// Matching blocks as `(i, j, size)`, sorted by position.
    pub fn matching_blocks(&self) -> Vec<(usize, usize, usize)> {
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k > 0 {
                blocks.push((i, j, k));
                if alo < i && blo < j {
                    queue.push((alo, i, blo, j));
                }
                if i + k < ahi && j + k < bhi {
                    queue.push((i + k, ahi, j + k, bhi));
                }
            }
        }
        blocks.sort_unstable();
        blocks
    }

    /// Similarity in `[0, 1]`; two empty strings are identical.
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matches: usize = self.matching_blocks().iter().map(|(_, _, size)| size).sum();
        2.0 * matches as f64 / total as f64
    }
}

/// Similarity ratio of two strings
pub fn ratio(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(a, b).ratio()
}

/// A scored table row
#[derive(Clone, Debug, PartialEq)]
pub struct SimilarityMatch {
    /// Position of the row in the table
    pub index: usize,
    /// The row's cells as stored (never lowercased)
    pub values: Vec<String>,
    pub score: f64,
}

impl SimilarityMatch {
    pub fn joined(&self, delimiter: char) -> String {
        self.values.join(&delimiter.to_string())
    }

    /// The row with every field wrapped in double quotes: `"a";"b"`.
    pub fn quoted(&self, delimiter: char) -> String {
        self.values
            .iter()
            .map(|value| format!("\"{value}\""))
            .collect::<Vec<_>>()
            .join(&delimiter.to_string())
    }
}

fn scores<'a>(table: &'a Table, target_text: &str, delimiter: char, case_sensitive: bool) -> impl Iterator<Item = SimilarityMatch> + 'a {
    let target = if case_sensitive { target_text.to_owned() } else { target_text.to_lowercase() };
    let separator = delimiter.to_string();
    table.rows().iter().enumerate().map(move |(index, row)| {
        let joined = row.join(&separator);
        let candidate = if case_sensitive { joined } else { joined.to_lowercase() };
        SimilarityMatch {
            index,
            values: row.to_owned(),
            score: ratio(&target, &candidate),
        }
    })
}

/// Finds the row most similar to `target_text`, each row joined with `delimiter` before scoring.
/// Ties keep the earliest row. `None` only for a table without rows.
pub fn most_similar_row(table: &Table, target_text: &str, delimiter: char, case_sensitive: bool) -> Option<SimilarityMatch> {
    let mut best: Option<SimilarityMatch> = None;
    for candidate in scores(table, target_text, delimiter, case_sensitive) {
        if best.as_ref().map(|best| candidate.score > best.score).unwrap_or(true) {
            best = Some(candidate);
        }
    }
    best
}

/// The `limit` most similar rows, best first; equal scores stay in table order.
pub fn rank(table: &Table, target_text: &str, delimiter: char, case_sensitive: bool, limit: usize) -> Vec<SimilarityMatch> {
    let mut ranked: Vec<SimilarityMatch> = scores(table, target_text, delimiter, case_sensitive).collect();
    ranked.sort_by(|left, right| right.score.total_cmp(&left.score));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&str]) -> Table {
        Table::from_rows(rows.iter().map(|row| row.split(';').map(str::to_owned).collect()).collect())
    }

    #[test]
    fn ratio_matches_reference_values() {
        assert_eq!(ratio("abcd", "bcde"), 0.75);
        assert_eq!(ratio("tide", "diet"), 0.25);
        assert_eq!(ratio("diet", "tide"), 0.5);
        assert_eq!(ratio("", ""), 1.0);
        assert_eq!(ratio("abc", ""), 0.0);
        assert_eq!(ratio("same", "same"), 1.0);
    }

    #[test]
    fn popular_characters_are_not_indexed_in_long_sequences() {
        let a = format!("b{}", "a".repeat(10));
        let b = format!("{}b", "a".repeat(200));
        assert_eq!(ratio(&a, &b), 2.0 / 212.0);

        // below the threshold the long run of 'a' is found
        let b = format!("{}b", "a".repeat(150));
        assert_eq!(ratio(&a, &b), 2.0 * 10.0 / 162.0);
    }

    #[test]
    fn matching_blocks_are_sorted() {
        let matcher = SequenceMatcher::new("abxcd", "abcd");
        assert_eq!(matcher.matching_blocks(), vec![(0, 0, 2), (3, 2, 2)]);
    }

    #[test]
    fn picks_closest_template_row() {
        let candidates = table(&["FP;Nome;Valor", "SAMS;Nome;Quota"]);
        let best = most_similar_row(&candidates, "FP;Nome;Valor do Desconto", ';', true).unwrap();
        assert_eq!(best.index, 0);
        let other = ratio("FP;Nome;Valor do Desconto", "SAMS;Nome;Quota");
        assert!(best.score > other);
        assert_eq!(best.quoted(';'), "\"FP\";\"Nome\";\"Valor\"");
    }

    #[test]
    fn exact_row_scores_one() {
        let candidates = table(&["x;y", "A;B;C"]);
        let best = most_similar_row(&candidates, "A;B;C", ';', true).unwrap();
        assert_eq!((best.index, best.score), (1, 1.0));
        assert_eq!(best.joined(';'), "A;B;C");
    }

    #[test]
    fn ties_keep_first_row() {
        let candidates = table(&["ab", "ab", "zz"]);
        assert_eq!(most_similar_row(&candidates, "ab", ';', true).unwrap().index, 0);

        let unrelated = table(&["qq", "ww"]);
        let best = most_similar_row(&unrelated, "ab", ';', true).unwrap();
        assert_eq!((best.index, best.score), (0, 0.0));

        assert!(most_similar_row(&Table::default(), "ab", ';', true).is_none());
    }

    #[test]
    fn case_insensitive_scoring_keeps_original_values() {
        let candidates = table(&["NOME;VALOR"]);
        let best = most_similar_row(&candidates, "nome;valor", ';', false).unwrap();
        assert_eq!(best.score, 1.0);
        assert_eq!(best.values, vec!["NOME", "VALOR"]);
        assert!(most_similar_row(&candidates, "nome;valor", ';', true).unwrap().score < 1.0);
    }

    #[test]
    fn rank_orders_by_score() {
        let candidates = table(&["zzz", "abc", "abz", "abc"]);
        let ranked = rank(&candidates, "abc", ';', true, 3);
        let indexes: Vec<usize> = ranked.iter().map(|it| it.index).collect();
        assert_eq!(indexes, vec![1, 3, 2]);
        for score in ranked.iter().map(|it| it.score) {
            assert!((0.0..=1.0).contains(&score));
        }
    }
}
