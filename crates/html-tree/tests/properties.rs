//! Quantified properties: raw-byte reassembly, escape round-trips, and
//! parser totality over arbitrary inputs.

use html_tree::{parse, Error, ParseOptions, TokenKind, Tokenizer};
use quickcheck_macros::quickcheck;

/// Concatenated raw token bytes plus the unread tail must reproduce the
/// input byte-for-byte, whatever the input.
#[quickcheck]
fn raw_reassembly_is_lossless(input: Vec<u8>) -> bool {
    let mut z = Tokenizer::new(&input[..]);
    let mut raw = Vec::new();
    loop {
        let kind = z.next();
        raw.extend_from_slice(z.raw());
        if kind == TokenKind::Error {
            break;
        }
    }
    raw.extend_from_slice(z.buffered());
    raw == input
}

#[quickcheck]
fn escape_then_unescape_is_identity(s: String) -> bool {
    entities::unescape_string(&entities::escape_string(&s), false) == s
}

/// Escaping grows the text at most six-fold, and is exactly the rewrite
/// of the six escaped characters — nothing else changes.
#[quickcheck]
fn escaping_expands_at_most_six_fold_and_touches_only_its_six_chars(s: String) -> bool {
    let escaped = entities::escape_string(&s);
    if escaped.len() > 6 * s.len().max(1) {
        return false;
    }

    let mut reference = String::new();
    for c in s.chars() {
        match c {
            '&' => reference.push_str("&amp;"),
            '\'' => reference.push_str("&#39;"),
            '<' => reference.push_str("&lt;"),
            '>' => reference.push_str("&gt;"),
            '"' => reference.push_str("&#34;"),
            '\r' => reference.push_str("&#13;"),
            c => reference.push(c),
        }
    }
    escaped == reference
}

/// Malformed input is recovered, never rejected: any byte soup parses to
/// a consistent tree.
#[quickcheck]
fn parsing_never_fails_and_trees_stay_consistent(input: Vec<u8>) -> bool {
    let doc = match parse(&input[..], ParseOptions::default()) {
        Ok(doc) => doc,
        Err(_) => return false,
    };
    doc.arena().assert_consistent(doc.root());
    true
}

/// A capped parse either completes (when every token fits) or reports the
/// cap; either way the bytes consumed up to that point plus the unread
/// tail reproduce a prefix of the input.
#[quickcheck]
fn max_buf_either_completes_or_reports(input: Vec<u8>) -> bool {
    match parse(
        &input[..],
        ParseOptions {
            max_buf: 64,
            ..ParseOptions::default()
        },
    ) {
        Ok(doc) => doc.arena().assert_consistent(doc.root()),
        Err(Error::BufferExceeded) => {}
        Err(_) => return false,
    }

    let mut z = Tokenizer::new(&input[..]);
    z.set_max_buf(64);
    let mut consumed = Vec::new();
    loop {
        let kind = z.next();
        consumed.extend_from_slice(z.raw());
        if kind == TokenKind::Error {
            break;
        }
    }
    consumed.extend_from_slice(z.buffered());
    input.starts_with(&consumed)
}
