//! HTML character-reference decoding and text escaping.
//!
//! Decoding rewrites the input buffer in place: every expansion is at most
//! as long as the reference it replaces (`&` plus the name), so the decoded
//! text always fits in the source allocation. The tables live in
//! [`tables`]; lookups go through maps derived from them once per process.

mod tables;

use lazy_static::lazy_static;
use std::collections::HashMap;

pub use tables::{
    ENTITY, ENTITY2, LONGEST_ENTITY_WITHOUT_SEMICOLON, MAX_ENTITY_LEN, WINDOWS_1252_REPLACEMENTS,
};

lazy_static! {
    static ref ENTITY_MAP: HashMap<&'static str, char> = ENTITY.iter().copied().collect();
    static ref ENTITY2_MAP: HashMap<&'static str, [char; 2]> = ENTITY2.iter().copied().collect();
}

/// Characters rewritten by [`escape_into`]: `& ' < > " \r`.
const ESCAPED_CHARS: &[u8] = b"&'<>\"\r";

/// Decodes all character references in `b`, rewriting it in place, and
/// returns the length of the decoded prefix.
///
/// `in_attribute` selects the attribute-value rules, under which a
/// reference without a terminating semicolon is left alone when it is
/// followed by `=` (or by an alphanumeric, which the name scan already
/// consumes). This preserves query strings like `?q=a&not=b`.
///
/// @see https://html.spec.whatwg.org/multipage/parsing.html#character-reference-state
pub fn unescape_in_place(b: &mut [u8], in_attribute: bool) -> usize {
    let Some(first) = memchr::memchr(b'&', b) else {
        return b.len();
    };

    let mut dst = first;
    let mut src = first;
    while src < b.len() {
        if b[src] == b'&' {
            let (d, s) = unescape_entity(b, dst, src, in_attribute);
            dst = d;
            src = s;
        } else {
            b[dst] = b[src];
            dst += 1;
            src += 1;
        }
    }
    dst
}

/// Decodes `s`, returning a fresh string.
pub fn unescape_string(s: &str, in_attribute: bool) -> String {
    if memchr::memchr(b'&', s.as_bytes()).is_none() {
        return s.to_string();
    }
    let mut b = s.as_bytes().to_vec();
    let n = unescape_in_place(&mut b, in_attribute);
    b.truncate(n);
    String::from_utf8_lossy(&b).into_owned()
}

/// Decodes one reference starting at `b[src]` (which holds `&`), writing
/// the expansion at `b[dst]`. Returns the advanced `(dst, src)` cursors.
fn unescape_entity(b: &mut [u8], dst: usize, src: usize, in_attribute: bool) -> (usize, usize) {
    let s = &b[src..];
    if s.len() <= 1 {
        b[dst] = b[src];
        return (dst + 1, src + 1);
    }

    if s[1] == b'#' {
        return unescape_numeric(b, dst, src);
    }

    // Consume the longest run of characters that could form a name. The
    // scan stops after a semicolon or before the first non-alphanumeric.
    let mut i = 1;
    while i < s.len() {
        let c = s[i];
        i += 1;
        if c.is_ascii_alphanumeric() {
            continue;
        }
        if c != b';' {
            i -= 1;
        }
        break;
    }

    let name_len = i - 1;
    if name_len > 0 {
        let name = std::str::from_utf8(&s[1..i]).unwrap_or("");
        let unterminated = s[i - 1] != b';';
        if in_attribute && unterminated && i < s.len() && s[i] == b'=' {
            // Legacy attribute parsing: `&not=` stays literal.
        } else if let Some(&c) = ENTITY_MAP.get(name) {
            let n = encode_char(&mut b[dst..], c);
            return (dst + n, src + i);
        } else if let Some(&[c0, c1]) = ENTITY2_MAP.get(name) {
            let n0 = encode_char(&mut b[dst..], c0);
            let n1 = encode_char(&mut b[dst + n0..], c1);
            return (dst + n0 + n1, src + i);
        } else if !in_attribute {
            // No full match; retry progressively shorter prefixes against
            // the semicolon-less legacy names, longest first.
            let max = name_len.min(LONGEST_ENTITY_WITHOUT_SEMICOLON);
            let mut short = [0u8; LONGEST_ENTITY_WITHOUT_SEMICOLON];
            short[..max].copy_from_slice(&s[1..1 + max]);
            for j in (2..=max).rev() {
                let prefix = std::str::from_utf8(&short[..j]).unwrap_or("");
                if let Some(&c) = ENTITY_MAP.get(prefix) {
                    let n = encode_char(&mut b[dst..], c);
                    return (dst + n, src + j + 1);
                }
            }
        }
    }

    // Nothing matched; pass the scanned bytes through untouched.
    b.copy_within(src..src + i, dst);
    (dst + i, src + i)
}

/// Decodes a numeric reference (`&#`, `&#x`, `&#X`) starting at `b[src]`.
fn unescape_numeric(b: &mut [u8], dst: usize, src: usize) -> (usize, usize) {
    let s = &b[src..];
    if s.len() <= 3 {
        b[dst] = b[src];
        return (dst + 1, src + 1);
    }

    let mut i = 2;
    let hex = matches!(s[i], b'x' | b'X');
    if hex {
        i += 1;
    }

    let mut x: u32 = 0;
    while i < s.len() {
        let c = s[i];
        i += 1;
        let digit = match c {
            b'0'..=b'9' => (c - b'0') as u32,
            b'a'..=b'f' if hex => (c - b'a' + 10) as u32,
            b'A'..=b'F' if hex => (c - b'A' + 10) as u32,
            _ => {
                if c != b';' {
                    i -= 1;
                }
                break;
            }
        };
        x = x.saturating_mul(if hex { 16 } else { 10 }).saturating_add(digit);
    }

    if i <= 3 {
        // No digits matched; the `&` passes through alone.
        b[dst] = b[src];
        return (dst + 1, src + 1);
    }

    let c = replace_disallowed_codepoint(x);
    let n = encode_char(&mut b[dst..], c);
    (dst + n, src + i)
}

/// Maps a numeric reference value to the character it produces.
///
/// The C1-control range goes through the Windows-1252 table; NUL, values
/// beyond Unicode, surrogates, noncharacters, DEL, and C0 controls other
/// than whitespace collapse to U+FFFD.
fn replace_disallowed_codepoint(x: u32) -> char {
    if (0x80..=0x9F).contains(&x) {
        return WINDOWS_1252_REPLACEMENTS[(x - 0x80) as usize];
    }
    if x == 0 || x > 0x10FFFF || (0xD800..=0xDFFF).contains(&x) {
        return '\u{FFFD}';
    }
    if x == 0x7F
        || (0xFDD0..=0xFDEF).contains(&x)
        || (x & 0xFFFE) == 0xFFFE
        || (x < 0x20 && !matches!(x, 0x09 | 0x0A | 0x0C | 0x0D))
    {
        return '\u{FFFD}';
    }
    char::from_u32(x).unwrap_or('\u{FFFD}')
}

fn encode_char(b: &mut [u8], c: char) -> usize {
    c.encode_utf8(b).len()
}

/// Appends `s` to `out` with `& ' < > " \r` rewritten as references.
pub fn escape_into(out: &mut String, s: &str) {
    let mut rest = s;
    while let Some(i) = rest
        .as_bytes()
        .iter()
        .position(|b| ESCAPED_CHARS.contains(b))
    {
        out.push_str(&rest[..i]);
        out.push_str(match rest.as_bytes()[i] {
            b'&' => "&amp;",
            b'\'' => "&#39;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            b'"' => "&#34;",
            b'\r' => "&#13;",
            _ => unreachable!("escape set is fixed"),
        });
        rest = &rest[i + 1..];
    }
    out.push_str(rest);
}

/// Escapes `s`, returning a fresh string.
///
/// The result is at most six times the input length, one reference per
/// escaped byte.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(&mut out, s);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn unescape(s: &str) -> String {
        unescape_string(s, false)
    }

    fn unescape_attr(s: &str) -> String {
        unescape_string(s, true)
    }

    #[test]
    fn named_references() {
        assert_eq!(unescape("&amp;"), "&");
        assert_eq!(unescape("&amp"), "&");
        assert_eq!(unescape("&lt;b&gt;"), "<b>");
        assert_eq!(unescape("&notin;"), "\u{2209}");
        assert_eq!(unescape("&copy 2024"), "\u{A9} 2024");
        assert_eq!(unescape("&unknown;"), "&unknown;");
        assert_eq!(unescape("&"), "&");
        assert_eq!(unescape("&#"), "&#");
    }

    #[test]
    fn longest_prefix_fallback() {
        // "notit" is not a reference but its prefix "not" is one of the
        // legacy semicolon-less names.
        assert_eq!(unescape("&notit;&notin;"), "\u{AC}it;\u{2209}");
    }

    #[test]
    fn attribute_mode_preserves_query_strings() {
        assert_eq!(
            unescape_attr("q=z&amp=5&notice=hello&not;=world"),
            "q=z&amp=5&notice=hello\u{AC}=world"
        );
        // With the semicolon the reference always decodes.
        assert_eq!(unescape_attr("&amp;=5"), "&=5");
    }

    #[test]
    fn two_codepoint_references() {
        assert_eq!(unescape("&fjlig;"), "fj");
        assert_eq!(unescape("&nang;"), "\u{2220}\u{20D2}");
    }

    #[test]
    fn numeric_references() {
        assert_eq!(unescape("&#65;&#x42;&#X63;"), "ABc");
        assert_eq!(unescape("&#65"), "A");
        // C1 range remaps through Windows-1252.
        assert_eq!(unescape("&#x80;"), "\u{20AC}");
        assert_eq!(unescape("&#151;"), "\u{2014}");
        // NUL, surrogates, and out-of-range values collapse to U+FFFD.
        assert_eq!(unescape("&#0;"), "\u{FFFD}");
        assert_eq!(unescape("&#xD83D;"), "\u{FFFD}");
        assert_eq!(unescape("&#x110000;"), "\u{FFFD}");
        assert_eq!(unescape("&#x7F;"), "\u{FFFD}");
        assert_eq!(unescape("&#xFDD0;"), "\u{FFFD}");
        assert_eq!(unescape("&#xFFFE;"), "\u{FFFD}");
        assert_eq!(unescape("&#1;"), "\u{FFFD}");
        // Whitespace controls survive.
        assert_eq!(unescape("&#9;&#10;&#13;"), "\t\n\r");
    }

    #[test]
    fn escape_round_trip() {
        let cases = [
            "",
            "plain text",
            "&'<>\"\r",
            "a < b && c > d",
            "\"quoted\" & 'single'",
            "line\rbreak",
            "\u{1F600} unicode \u{AC}",
        ];
        for s in cases {
            assert_eq!(unescape(&escape_string(s)), s, "round trip of {s:?}");
        }
    }

    #[test]
    fn escape_expansion_bound() {
        for s in ["&&&&", "\"'<>", "plain", "\r\r"] {
            assert!(escape_string(s).len() <= 6 * s.len().max(1));
        }
    }

    #[test]
    fn expansions_never_outgrow_their_references() {
        for (name, c) in ENTITY {
            assert!(
                1 + name.len() >= c.len_utf8(),
                "expansion of &{name} is longer than its reference"
            );
        }
        for (name, [c0, c1]) in ENTITY2 {
            assert!(
                1 + name.len() >= c0.len_utf8() + c1.len_utf8(),
                "expansion of &{name} is longer than its reference"
            );
        }
    }

    #[test]
    fn declared_length_bounds_hold() {
        for (name, _) in ENTITY {
            assert!(name.len() <= MAX_ENTITY_LEN);
            if !name.ends_with(';') {
                assert!(
                    name.len() <= LONGEST_ENTITY_WITHOUT_SEMICOLON,
                    "&{name} has no semicolon but exceeds the declared bound"
                );
            }
        }
        for (name, _) in ENTITY2 {
            assert!(name.len() <= MAX_ENTITY_LEN);
            assert!(name.ends_with(';'));
        }
    }

    #[test]
    fn every_bare_name_has_a_terminated_twin() {
        for (name, c) in ENTITY {
            if !name.ends_with(';') {
                let full = format!("{name};");
                assert_eq!(
                    ENTITY_MAP.get(full.as_str()),
                    Some(c),
                    "&{name} lacks a &{full} entry"
                );
            }
        }
    }

    #[test]
    fn in_place_length_shrinks_only() {
        let mut b = b"x&amp;y&#65;z".to_vec();
        let n = unescape_in_place(&mut b, false);
        assert_eq!(&b[..n], b"x&yAz");
    }
}
