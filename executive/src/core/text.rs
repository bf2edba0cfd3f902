//! UTF-8 safe byte-budget helpers.

/// Largest index `<= index` that falls on a char boundary of `s`.
pub fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut idx = index;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest index `>= index` that falls on a char boundary of `s`.
pub fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut idx = index;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Keep at most `max_bytes` from the start of `s`.
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    &s[..floor_char_boundary(s, max_bytes)]
}

/// Keep at most `max_bytes` from the end of `s`.
pub fn tail_bytes(s: &str, max_bytes: usize) -> &str {
    let start = ceil_char_boundary(s, s.len().saturating_sub(max_bytes));
    &s[start..]
}
