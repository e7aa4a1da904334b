//! Index name formatting with Go reference-time tokens
//!
//! `indexFormat` strings embed date tokens inside `{ ... }` blocks, e.g.
//! `kube-events-{2006-01-02}`. The block is tokenised left to right with the
//! longest token first, so overlapping tokens cannot corrupt each other.

use chrono::{DateTime, Utc};

/// Go reference-time tokens, longest first.
const TOKENS: &[(&str, &str)] = &[
    ("2006", "%Y"),
    ("01", "%m"),
    ("02", "%d"),
    ("15", "%H"),
    ("04", "%M"),
    ("05", "%S"),
];

/// Substitute date tokens inside every `{...}` block; text outside blocks is
/// copied verbatim. An unmatched `{` is treated as a literal.
pub(crate) fn format_index(format: &str, at: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                substitute(&after[..end], at, &mut out);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn substitute(block: &str, at: DateTime<Utc>, out: &mut String) {
    let mut i = 0;
    'scan: while i < block.len() {
        for (token, strftime) in TOKENS {
            if block[i..].starts_with(token) {
                out.push_str(&at.format(strftime).to_string());
                i += token.len();
                continue 'scan;
            }
        }
        // Not a token start; copy one character.
        let ch = block[i..].chars().next().unwrap_or_default();
        out.push(ch);
        i += ch.len_utf8();
    }
}
