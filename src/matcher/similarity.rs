//! String and collection similarity measures.

use std::collections::HashMap;
use std::hash::Hash;

/// Calculate string similarity using Levenshtein distance.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();

    if len_a == 0 || len_b == 0 {
        return 0.0;
    }

    let distance = levenshtein_distance(a, b);
    let max_len = len_a.max(len_b);

    1.0 - (distance as f64 / max_len as f64)
}

/// Calculate Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    // Two rolling rows are enough.
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Size of the multiset intersection of two sequences.
pub fn multiset_intersection<T: Eq + Hash>(a: &[T], b: &[T]) -> usize {
    let mut counts: HashMap<&T, usize> = HashMap::new();
    for item in a {
        *counts.entry(item).or_default() += 1;
    }
    let mut shared = 0;
    for item in b {
        if let Some(n) = counts.get_mut(item)
            && *n > 0
        {
            *n -= 1;
            shared += 1;
        }
    }
    shared
}

/// Dice coefficient of two multisets. Two empty inputs are identical.
pub fn dice<T: Eq + Hash>(a: &[T], b: &[T]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    2.0 * multiset_intersection(a, b) as f64 / (a.len() + b.len()) as f64
}

/// Parameter list similarity: type multiset Dice times the share of
/// positions holding the same type.
pub fn parameter_similarity(a: &[&str], b: &[&str]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let positional = a.iter().zip(b).filter(|(x, y)| x == y).count() as f64
        / a.len().max(b.len()) as f64;
    dice(a, b) * (0.5 + 0.5 * positional)
}

/// Longest common subsequence of two sequences under `eq`, as index pairs in
/// increasing order. Ties prefer the earliest elements of `a`.
pub fn lcs<A, B>(a: &[A], b: &[B], eq: impl Fn(&A, &B) -> bool) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if eq(&a[i], &b[j]) {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(table[0][0]);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if eq(&a[i], &b[j]) {
            out.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcs() {
        let a = ["a", "b", "c", "d"];
        let b = ["b", "x", "d"];
        assert_eq!(lcs(&a, &b, |x, y| x == y), [(1, 0), (3, 2)]);
        assert!(lcs::<&str, &str>(&[], &b, |x, y| x == y).is_empty());
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("saturday", "sunday"), 3);
    }

    #[test]
    fn test_string_similarity() {
        assert_eq!(string_similarity("foo", "foo"), 1.0);
        assert_eq!(string_similarity("", "foo"), 0.0);
        assert!(string_similarity("getUserById", "fetchUserById") > 0.7);
    }

    #[test]
    fn test_dice() {
        assert_eq!(dice::<&str>(&[], &[]), 1.0);
        assert_eq!(dice(&["a", "b"], &["a", "b"]), 1.0);
        assert_eq!(dice(&["a", "a", "b"], &["a", "c"]), 0.4);
        assert_eq!(multiset_intersection(&["x", "x"], &["x", "x", "x"]), 2);
    }

    #[test]
    fn test_parameter_similarity() {
        assert_eq!(parameter_similarity(&[], &[]), 1.0);
        assert_eq!(parameter_similarity(&["int", "String"], &["int", "String"]), 1.0);
        // Reordered: same multiset, no positional agreement.
        assert_eq!(parameter_similarity(&["int", "String"], &["String", "int"]), 0.5);
        assert!(parameter_similarity(&["DetailAST"], &["DetailAST", "int"]) > 0.4);
    }
}
