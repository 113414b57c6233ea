//! The byte-driven tokenizer.
//!
//! The tokenizer pulls bytes from a reader into a growable buffer and
//! tracks two spans over it: `raw` delimits every byte of the token being
//! scanned, `data` the semantic payload within it (tag name, text, comment
//! body). Attribute key/value spans share the same coordinate space.
//! Nothing is copied or decoded until an accessor materializes it, so
//! concatenating `raw()` across all tokens reproduces the input exactly.
//!
//! @see https://html.spec.whatwg.org/multipage/parsing.html#tokenization

use std::io::{self, Read};

use rustc_hash::FxHashSet;

use crate::atoms::Atom;
use crate::errors::Error;
use crate::node::Attribute;

/// How many interrupted reads in a row to tolerate before giving up with
/// [`Error::NoProgress`].
const MAX_INTERRUPTED_READS: usize = 100;

/// Granularity of reads into the buffer tail.
const READ_CHUNK: usize = 4096;

/// The classification `next` assigns to the current token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// End of stream or a failed read; `err` tells which.
    Error,
    Text,
    StartTag,
    EndTag,
    SelfClosingTag,
    Comment,
    Doctype,
}

/// An owning copy of the current token, materialized by [`Tokenizer::token`].
#[derive(Clone, Debug, Default)]
pub struct Token {
    pub kind: TokenKind,
    /// Atom code of the tag name; `Atom::NONE` for unknown names and
    /// non-tag tokens.
    pub atom: Atom,
    /// Tag name for tags, decoded text for text/comment/doctype tokens.
    pub data: String,
    pub attrs: Vec<Attribute>,
}

impl Default for TokenKind {
    fn default() -> Self {
        TokenKind::Error
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// Elements whose content the tokenizer consumes without tag recognition.
/// `title` and `textarea` are RCDATA (references decode); the rest are raw.
fn is_raw_text_tag(name: &str) -> bool {
    matches!(
        name,
        "iframe"
            | "noembed"
            | "noframes"
            | "noscript"
            | "plaintext"
            | "script"
            | "style"
            | "title"
            | "textarea"
            | "xmp"
    )
}

pub struct Tokenizer<R: Read> {
    reader: R,
    /// Classification of the current token.
    kind: TokenKind,
    /// Set once the reader is exhausted or fails; `next` then reports
    /// `TokenKind::Error` forever.
    err: Option<Error>,
    buf: Vec<u8>,
    /// Bytes of the current token: `buf[raw.start..raw.end]`.
    raw: Span,
    /// Semantic payload within `raw`.
    data: Span,
    /// Key/value spans of the attribute being scanned.
    pending_attr: [Span; 2],
    attrs: Vec<[Span; 2]>,
    n_attr_returned: usize,
    /// Lowercased name of the raw-text element whose content comes next;
    /// empty outside raw-text mode.
    raw_tag: String,
    /// Whether the current text token may not have references decoded.
    text_is_raw: bool,
    /// Whether NUL bytes in the current text token become U+FFFD.
    convert_nul: bool,
    allow_cdata: bool,
    /// Cap on the live window; zero means unbounded.
    max_buf: usize,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R) -> Tokenizer<R> {
        Tokenizer {
            reader,
            kind: TokenKind::Error,
            err: None,
            buf: Vec::with_capacity(READ_CHUNK),
            raw: Span::default(),
            data: Span::default(),
            pending_attr: [Span::default(); 2],
            attrs: Vec::new(),
            n_attr_returned: 0,
            raw_tag: String::new(),
            text_is_raw: false,
            convert_nul: false,
            allow_cdata: false,
            max_buf: 0,
        }
    }

    /// A tokenizer for fragment parsing: when the context element is a
    /// raw-text element, its content mode applies from the first byte.
    pub fn new_fragment(reader: R, context_tag: &str) -> Tokenizer<R> {
        let mut z = Tokenizer::new(reader);
        let lowered = context_tag.to_ascii_lowercase();
        if is_raw_text_tag(&lowered) {
            z.raw_tag = lowered;
        }
        z
    }

    /// Caps the number of buffered bytes a single token may span. Zero
    /// removes the cap.
    pub fn set_max_buf(&mut self, n: usize) {
        self.max_buf = n;
    }

    /// Whether `<![CDATA[` sections are recognized. The tree constructor
    /// enables this only inside foreign content.
    pub fn set_allow_cdata(&mut self, allow: bool) {
        self.allow_cdata = allow;
    }

    /// Cancels raw-text mode for the element just opened. The tree
    /// constructor calls this for `<noscript>` without scripting and for
    /// raw-text names inside foreign content.
    pub fn next_is_not_raw_text(&mut self) {
        self.raw_tag.clear();
    }

    /// The error that ended the stream, once `next` has reported
    /// [`TokenKind::Error`].
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub(crate) fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }

    /// The raw bytes of the current token.
    pub fn raw(&self) -> &[u8] {
        &self.buf[self.raw.start..self.raw.end]
    }

    /// Bytes read from the reader but not yet consumed by any token.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.raw.end..]
    }

    /// Reads the byte at `raw.end`, extending the raw span, refilling the
    /// buffer from the reader as needed. Returns 0 with `err` set when no
    /// byte is available.
    fn read_byte(&mut self) -> u8 {
        if self.raw.end >= self.buf.len() {
            if !self.fill() {
                return 0;
            }
        }
        let b = self.buf[self.raw.end];
        self.raw.end += 1;
        if self.max_buf > 0 && self.raw.end - self.raw.start >= self.max_buf {
            self.err = Some(Error::BufferExceeded);
            return 0;
        }
        b
    }

    /// Puts the byte just read back.
    fn unread_byte(&mut self) {
        self.raw.end -= 1;
    }

    /// Compacts the buffer and reads at least one more byte. Returns false
    /// with `err` set on end of stream or failure.
    fn fill(&mut self) -> bool {
        // Shift the live window to the front; every span in the window
        // coordinate space rebases by the shift.
        let shift = self.raw.start;
        if shift > 0 {
            self.buf.copy_within(shift.., 0);
            let len = self.buf.len() - shift;
            self.buf.truncate(len);
            self.raw.start = 0;
            self.raw.end -= shift;
            self.data.start = self.data.start.saturating_sub(shift);
            self.data.end = self.data.end.saturating_sub(shift);
            for span in &mut self.pending_attr {
                span.start = span.start.saturating_sub(shift);
                span.end = span.end.saturating_sub(shift);
            }
            for attr in &mut self.attrs {
                for span in attr {
                    span.start = span.start.saturating_sub(shift);
                    span.end = span.end.saturating_sub(shift);
                }
            }
        }

        // Grow (doubling) once the live window passes half the capacity.
        let len = self.buf.len();
        if 2 * len > self.buf.capacity() {
            self.buf.reserve(self.buf.capacity().max(READ_CHUNK));
        }

        let chunk = (self.buf.capacity() - len).max(READ_CHUNK);
        self.buf.resize(len + chunk, 0);
        let mut interrupted = 0;
        loop {
            match self.reader.read(&mut self.buf[len..]) {
                Ok(0) => {
                    self.buf.truncate(len);
                    self.err = Some(Error::EndOfStream);
                    return false;
                }
                Ok(n) => {
                    self.buf.truncate(len + n);
                    return true;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    interrupted += 1;
                    if interrupted >= MAX_INTERRUPTED_READS {
                        self.buf.truncate(len);
                        self.err = Some(Error::NoProgress);
                        return false;
                    }
                }
                Err(e) => {
                    self.buf.truncate(len);
                    self.err = Some(Error::Io(e));
                    return false;
                }
            }
        }
    }

    fn skip_white_space(&mut self) {
        if self.err.is_some() {
            return;
        }
        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                return;
            }
            if !matches!(c, b' ' | b'\n' | b'\r' | b'\t' | b'\x0c') {
                self.unread_byte();
                return;
            }
        }
    }

    /// Advances to the next token and classifies it.
    pub fn next(&mut self) -> TokenKind {
        self.raw.start = self.raw.end;
        self.data.start = self.raw.end;
        self.data.end = self.raw.end;
        if self.err.is_some() {
            self.kind = TokenKind::Error;
            return self.kind;
        }

        if !self.raw_tag.is_empty() {
            if self.raw_tag == "plaintext" {
                // Everything up to the end of stream is text.
                while self.err.is_none() {
                    self.read_byte();
                }
                self.data.end = self.raw.end;
                self.text_is_raw = true;
            } else {
                self.read_raw_or_rcdata();
            }
            if self.data.end > self.data.start {
                self.kind = TokenKind::Text;
                self.convert_nul = true;
                return self.kind;
            }
        }
        self.text_is_raw = false;
        self.convert_nul = false;

        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                break;
            }
            if c != b'<' {
                continue;
            }
            let c = self.read_byte();
            if self.err.is_some() {
                break;
            }

            // A `<` only opens markup before an ASCII letter, `/`, `!`, or
            // `?`; anything else stays text.
            let kind = match c {
                b'a'..=b'z' | b'A'..=b'Z' => TokenKind::StartTag,
                b'/' => TokenKind::EndTag,
                b'!' | b'?' => TokenKind::Comment,
                _ => {
                    self.unread_byte();
                    continue;
                }
            };

            // Text accumulated before this tag is its own token; rewind so
            // the tag is re-scanned on the following call.
            let x = self.raw.end - "<a".len();
            if self.raw.start < x {
                self.raw.end = x;
                self.data.end = x;
                self.kind = TokenKind::Text;
                return self.kind;
            }

            match kind {
                TokenKind::StartTag => {
                    self.kind = self.read_start_tag();
                    return self.kind;
                }
                TokenKind::EndTag => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    if c == b'>' {
                        // "</>" produces no tree content; surface it as an
                        // empty comment so `raw` still accounts for it.
                        self.kind = TokenKind::Comment;
                        return self.kind;
                    }
                    if c.is_ascii_alphabetic() {
                        self.read_tag(false);
                        self.kind = if self.err.is_some() {
                            TokenKind::Error
                        } else {
                            TokenKind::EndTag
                        };
                        return self.kind;
                    }
                    self.unread_byte();
                    self.read_until_close_angle();
                    self.kind = TokenKind::Comment;
                    return self.kind;
                }
                TokenKind::Comment => {
                    if c == b'!' {
                        self.kind = self.read_markup_declaration();
                        return self.kind;
                    }
                    self.unread_byte();
                    self.read_until_close_angle();
                    self.kind = TokenKind::Comment;
                    return self.kind;
                }
                _ => unreachable!("tag classification is exhaustive"),
            }
        }

        if self.raw.start < self.raw.end {
            self.data.end = self.raw.end;
            self.kind = TokenKind::Text;
            return self.kind;
        }
        self.kind = TokenKind::Error;
        self.kind
    }

    /// Consumes raw-text or RCDATA content up to the matching end tag.
    fn read_raw_or_rcdata(&mut self) {
        if self.raw_tag == "script" {
            self.read_script();
            self.text_is_raw = true;
            self.raw_tag.clear();
            return;
        }
        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                break;
            }
            if c != b'<' {
                continue;
            }
            let c = self.read_byte();
            if self.err.is_some() {
                break;
            }
            if c != b'/' {
                self.unread_byte();
                continue;
            }
            if self.read_raw_end_tag() || self.err.is_some() {
                break;
            }
        }
        self.data.end = self.raw.end;
        // RCDATA content still decodes character references.
        self.text_is_raw = self.raw_tag != "textarea" && self.raw_tag != "title";
        self.raw_tag.clear();
    }

    /// Tries to match `</` + `raw_tag` + terminator at the cursor. On a
    /// match the cursor rewinds to just before the `</` and true returns;
    /// otherwise the cursor is left after whatever failed to match.
    fn read_raw_end_tag(&mut self) -> bool {
        for i in 0..self.raw_tag.len() {
            let c = self.read_byte();
            if self.err.is_some() {
                return false;
            }
            let want = self.raw_tag.as_bytes()[i];
            if c != want && c != want.to_ascii_uppercase() {
                self.unread_byte();
                return false;
            }
        }
        let c = self.read_byte();
        if self.err.is_some() {
            return false;
        }
        match c {
            b' ' | b'\n' | b'\r' | b'\t' | b'\x0c' | b'/' | b'>' => {
                // Rewind the "</", the name, and the terminator.
                self.raw.end -= "</".len() + self.raw_tag.len() + 1;
                true
            }
            _ => {
                self.unread_byte();
                false
            }
        }
    }

    /// The script-data automaton, with its comment-escape and
    /// double-escape sub-modes.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#script-data-state
    fn read_script(&mut self) {
        use ScriptState::*;
        let mut state = Data;
        loop {
            if self.err.is_some() {
                break;
            }
            state = match state {
                Data => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    if c == b'<' {
                        LessThanSign
                    } else {
                        Data
                    }
                }
                LessThanSign => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    match c {
                        b'/' => EndTagOpen,
                        b'!' => EscapeStart,
                        _ => {
                            self.unread_byte();
                            Data
                        }
                    }
                }
                EndTagOpen => {
                    if self.read_raw_end_tag() || self.err.is_some() {
                        break;
                    }
                    Data
                }
                EscapeStart => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    if c == b'-' {
                        EscapeStartDash
                    } else {
                        self.unread_byte();
                        Data
                    }
                }
                EscapeStartDash => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    if c == b'-' {
                        EscapedDashDash
                    } else {
                        self.unread_byte();
                        Data
                    }
                }
                Escaped => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    match c {
                        b'-' => EscapedDash,
                        b'<' => EscapedLessThanSign,
                        _ => Escaped,
                    }
                }
                EscapedDash => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    match c {
                        b'-' => EscapedDashDash,
                        b'<' => EscapedLessThanSign,
                        _ => Escaped,
                    }
                }
                EscapedDashDash => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    match c {
                        b'-' => EscapedDashDash,
                        b'<' => EscapedLessThanSign,
                        b'>' => Data,
                        _ => Escaped,
                    }
                }
                EscapedLessThanSign => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    if c == b'/' {
                        EscapedEndTagOpen
                    } else if c.is_ascii_alphabetic() {
                        DoubleEscapeStart
                    } else {
                        self.unread_byte();
                        Escaped
                    }
                }
                EscapedEndTagOpen => {
                    if self.read_raw_end_tag() || self.err.is_some() {
                        break;
                    }
                    Escaped
                }
                DoubleEscapeStart => {
                    self.unread_byte();
                    let mut next = DoubleEscaped;
                    for i in 0.."script".len() {
                        let c = self.read_byte();
                        if self.err.is_some() {
                            break;
                        }
                        if c.to_ascii_lowercase() != b"script"[i] {
                            self.unread_byte();
                            next = Escaped;
                            break;
                        }
                    }
                    if self.err.is_some() {
                        break;
                    }
                    if next == DoubleEscaped {
                        let c = self.read_byte();
                        if self.err.is_some() {
                            break;
                        }
                        match c {
                            b' ' | b'\n' | b'\r' | b'\t' | b'\x0c' | b'/' | b'>' => {}
                            _ => {
                                self.unread_byte();
                                next = Escaped;
                            }
                        }
                    }
                    next
                }
                DoubleEscaped => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    match c {
                        b'-' => DoubleEscapedDash,
                        b'<' => DoubleEscapedLessThanSign,
                        _ => DoubleEscaped,
                    }
                }
                DoubleEscapedDash => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    match c {
                        b'-' => DoubleEscapedDashDash,
                        b'<' => DoubleEscapedLessThanSign,
                        _ => DoubleEscaped,
                    }
                }
                DoubleEscapedDashDash => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    match c {
                        b'-' => DoubleEscapedDashDash,
                        b'<' => DoubleEscapedLessThanSign,
                        b'>' => Data,
                        _ => DoubleEscaped,
                    }
                }
                DoubleEscapedLessThanSign => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        break;
                    }
                    if c == b'/' {
                        DoubleEscapeEnd
                    } else {
                        self.unread_byte();
                        DoubleEscaped
                    }
                }
                DoubleEscapeEnd => {
                    if self.read_raw_end_tag() {
                        // The "</script>" belongs to the double-escaped
                        // content; restore it.
                        self.raw.end += "</script>".len();
                        Escaped
                    } else if self.err.is_some() {
                        break;
                    } else {
                        DoubleEscaped
                    }
                }
            };
        }
        self.data.end = self.raw.end;
    }

    /// Reads everything through the next `>`, as comment data.
    fn read_until_close_angle(&mut self) {
        self.data.start = self.raw.end;
        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                self.data.end = self.raw.end;
                return;
            }
            if c == b'>' {
                self.data.end = self.raw.end - 1;
                return;
            }
        }
    }

    /// After `<!`: a comment, a doctype, a CDATA section (when allowed),
    /// or a bogus comment.
    fn read_markup_declaration(&mut self) -> TokenKind {
        self.data.start = self.raw.end;
        let mut c = [0u8; 2];
        for b in &mut c {
            *b = self.read_byte();
            if self.err.is_some() {
                self.data.end = self.raw.end;
                return TokenKind::Comment;
            }
        }
        if c == [b'-', b'-'] {
            self.read_comment();
            return TokenKind::Comment;
        }
        self.raw.end -= 2;
        if self.read_doctype() {
            return TokenKind::Doctype;
        }
        if self.allow_cdata && self.read_cdata() {
            self.convert_nul = true;
            return TokenKind::Text;
        }
        self.read_until_close_angle();
        TokenKind::Comment
    }

    /// Reads comment data after `<!--`. Accepts `-->`, the misnested
    /// `--!>`, and end of stream (discarding at most two trailing dashes).
    fn read_comment(&mut self) {
        self.data.start = self.raw.end;
        let mut dash_count = 0;
        let mut beginning = true;
        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                self.data.end = self.abrupt_comment_data_end();
                return;
            }
            match c {
                b'-' => {
                    dash_count += 1;
                    continue;
                }
                b'>' if dash_count >= 2 || beginning => {
                    self.data.end = self.raw.end - "-->".len();
                    if beginning {
                        // "<!-->" has no data at all.
                        self.data.end = self.data.start;
                    }
                    return;
                }
                b'!' if dash_count >= 2 => {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        self.data.end = self.abrupt_comment_data_end();
                        return;
                    }
                    if c == b'>' {
                        self.data.end = self.raw.end - "--!>".len();
                        return;
                    }
                    if c == b'-' {
                        dash_count = 1;
                        beginning = false;
                        continue;
                    }
                }
                _ => {}
            }
            dash_count = 0;
            beginning = false;
        }
    }

    /// Comment data end for a comment cut off by end of stream: a partial
    /// terminator (`--!`, `--`, or `-`) is dropped, at most two dashes.
    fn abrupt_comment_data_end(&self) -> usize {
        let body = &self.buf[self.data.start..self.raw.end];
        if body.ends_with(b"--!") {
            self.raw.end - 3
        } else if body.ends_with(b"--") {
            self.raw.end - 2
        } else if body.ends_with(b"-") {
            self.raw.end - 1
        } else {
            self.raw.end
        }
    }

    /// Matches `DOCTYPE` (any case) and takes the rest up to `>` as data.
    fn read_doctype(&mut self) -> bool {
        const NAME: &[u8] = b"DOCTYPE";
        for &want in NAME {
            let c = self.read_byte();
            if self.err.is_some() {
                self.data.end = self.raw.end;
                return false;
            }
            if c != want && c != want.to_ascii_lowercase() {
                // Rewind and let the bogus-comment path have these bytes.
                self.raw.end = self.data.start;
                return false;
            }
        }
        self.skip_white_space();
        if self.err.is_some() {
            self.data.start = self.raw.end;
            self.data.end = self.raw.end;
            return true;
        }
        self.read_until_close_angle();
        true
    }

    /// Matches `[CDATA[` and consumes through `]]>`.
    fn read_cdata(&mut self) -> bool {
        const OPEN: &[u8] = b"[CDATA[";
        for &want in OPEN {
            let c = self.read_byte();
            if self.err.is_some() {
                self.data.end = self.raw.end;
                return false;
            }
            if c != want {
                self.raw.end = self.data.start;
                return false;
            }
        }
        self.data.start = self.raw.end;
        let mut brackets = 0;
        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                self.data.end = self.raw.end;
                return true;
            }
            match c {
                b']' => brackets += 1,
                b'>' if brackets >= 2 => {
                    self.data.end = self.raw.end - "]]>".len();
                    return true;
                }
                _ => brackets = 0,
            }
        }
    }

    /// Whether the current tag name is one of `names` (ASCII
    /// case-insensitive).
    fn start_tag_in(&self, names: &[&str]) -> bool {
        let tag = &self.buf[self.data.start..self.data.end];
        names
            .iter()
            .any(|name| tag.eq_ignore_ascii_case(name.as_bytes()))
    }

    fn read_start_tag(&mut self) -> TokenKind {
        self.read_tag(true);
        if self.err.is_some() {
            return TokenKind::Error;
        }
        // The raw-text elements flip the tokenizer's next token to
        // raw-text mode. First-letter dispatch keeps the common case fast.
        let raw = match self.buf[self.data.start].to_ascii_lowercase() {
            b'i' => self.start_tag_in(&["iframe"]),
            b'n' => self.start_tag_in(&["noembed", "noframes", "noscript"]),
            b'p' => self.start_tag_in(&["plaintext"]),
            b's' => self.start_tag_in(&["script", "style"]),
            b't' => self.start_tag_in(&["textarea", "title"]),
            b'x' => self.start_tag_in(&["xmp"]),
            _ => false,
        };
        if raw {
            self.raw_tag = String::from_utf8_lossy(&self.buf[self.data.start..self.data.end])
                .to_ascii_lowercase();
        }
        if self.err.is_none() && self.buf[self.raw.end - 2] == b'/' {
            return TokenKind::SelfClosingTag;
        }
        TokenKind::StartTag
    }

    /// Scans the tag name and, for start tags, the attribute list.
    fn read_tag(&mut self, save_attr: bool) {
        self.attrs.clear();
        self.n_attr_returned = 0;
        self.read_tag_name();
        self.skip_white_space();
        if self.err.is_some() {
            return;
        }
        loop {
            let c = self.read_byte();
            if self.err.is_some() || c == b'>' {
                break;
            }
            self.unread_byte();
            self.read_tag_attr_key();
            self.read_tag_attr_val();
            if save_attr && self.pending_attr[0].start != self.pending_attr[0].end {
                self.attrs.push(self.pending_attr);
            }
            self.skip_white_space();
            if self.err.is_some() {
                break;
            }
        }
    }

    fn read_tag_name(&mut self) {
        self.data.start = self.raw.end - 1;
        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                self.data.end = self.raw.end;
                return;
            }
            match c {
                b' ' | b'\n' | b'\r' | b'\t' | b'\x0c' => {
                    self.data.end = self.raw.end - 1;
                    return;
                }
                b'/' | b'>' => {
                    self.unread_byte();
                    self.data.end = self.raw.end;
                    return;
                }
                _ => {}
            }
        }
    }

    /// Key ends at whitespace, `/`, `=`, or `>`. A leading `=` joins the
    /// key, per the before-attribute-name state.
    fn read_tag_attr_key(&mut self) {
        self.pending_attr[0].start = self.raw.end;
        loop {
            let c = self.read_byte();
            if self.err.is_some() {
                self.pending_attr[0].end = self.raw.end;
                return;
            }
            match c {
                b' ' | b'\n' | b'\r' | b'\t' | b'\x0c' | b'/' => {
                    self.pending_attr[0].end = self.raw.end - 1;
                    return;
                }
                b'=' if self.pending_attr[0].start + 1 == self.raw.end => {
                    // "=" as the first character becomes part of the key.
                    continue;
                }
                b'=' | b'>' => {
                    self.unread_byte();
                    self.pending_attr[0].end = self.raw.end;
                    return;
                }
                _ => {}
            }
        }
    }

    fn read_tag_attr_val(&mut self) {
        self.pending_attr[1].start = self.raw.end;
        self.pending_attr[1].end = self.raw.end;
        self.skip_white_space();
        if self.err.is_some() {
            return;
        }
        let c = self.read_byte();
        if self.err.is_some() {
            return;
        }
        if c != b'=' {
            self.unread_byte();
            return;
        }
        self.skip_white_space();
        if self.err.is_some() {
            return;
        }
        let quote = self.read_byte();
        if self.err.is_some() {
            return;
        }
        match quote {
            b'>' => {
                self.unread_byte();
            }
            b'\'' | b'"' => {
                self.pending_attr[1].start = self.raw.end;
                loop {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        self.pending_attr[1].end = self.raw.end;
                        return;
                    }
                    if c == quote {
                        self.pending_attr[1].end = self.raw.end - 1;
                        return;
                    }
                }
            }
            _ => {
                self.pending_attr[1].start = self.raw.end - 1;
                loop {
                    let c = self.read_byte();
                    if self.err.is_some() {
                        self.pending_attr[1].end = self.raw.end;
                        return;
                    }
                    match c {
                        b' ' | b'\n' | b'\r' | b'\t' | b'\x0c' => {
                            self.pending_attr[1].end = self.raw.end - 1;
                            return;
                        }
                        b'>' => {
                            self.unread_byte();
                            self.pending_attr[1].end = self.raw.end;
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Decoded text for the current text, comment, or doctype token.
    /// Consumes the span; call once per token.
    pub fn text(&mut self) -> Option<String> {
        match self.kind {
            TokenKind::Text | TokenKind::Comment | TokenKind::Doctype => {
                let mut s = self.buf[self.data.start..self.data.end].to_vec();
                self.data.start = self.raw.end;
                self.data.end = self.raw.end;
                convert_newlines(&mut s);
                if (self.convert_nul || self.kind == TokenKind::Comment)
                    && memchr::memchr(0, &s).is_some()
                {
                    s = replace_nul(&s);
                }
                if !self.text_is_raw {
                    let n = entities::unescape_in_place(&mut s, false);
                    s.truncate(n);
                }
                Some(String::from_utf8_lossy(&s).into_owned())
            }
            _ => None,
        }
    }

    /// Lowercased tag name and whether attributes remain to be read.
    /// Consumes the name span.
    pub fn tag_name(&mut self) -> Option<(String, bool)> {
        if self.data.start >= self.data.end {
            return None;
        }
        match self.kind {
            TokenKind::StartTag | TokenKind::SelfClosingTag | TokenKind::EndTag => {
                let s = &self.buf[self.data.start..self.data.end];
                let name = String::from_utf8_lossy(s).to_ascii_lowercase();
                self.data.start = self.raw.end;
                self.data.end = self.raw.end;
                Some((name, self.n_attr_returned < self.attrs.len()))
            }
            _ => None,
        }
    }

    /// The next attribute: lowercased key, unescaped value, and whether
    /// more attributes remain.
    pub fn tag_attr(&mut self) -> Option<(String, String, bool)> {
        if self.n_attr_returned >= self.attrs.len() {
            return None;
        }
        match self.kind {
            TokenKind::StartTag | TokenKind::SelfClosingTag => {
                let [k, v] = self.attrs[self.n_attr_returned];
                self.n_attr_returned += 1;
                let key = String::from_utf8_lossy(&self.buf[k.start..k.end]).to_ascii_lowercase();
                let mut val = self.buf[v.start..v.end].to_vec();
                convert_newlines(&mut val);
                let n = entities::unescape_in_place(&mut val, true);
                val.truncate(n);
                Some((
                    key,
                    String::from_utf8_lossy(&val).into_owned(),
                    self.n_attr_returned < self.attrs.len(),
                ))
            }
            _ => None,
        }
    }

    /// Materializes the current token as an owning [`Token`]. Duplicate
    /// attribute keys keep their first occurrence.
    pub fn token(&mut self) -> Token {
        let mut t = Token {
            kind: self.kind,
            ..Token::default()
        };
        match self.kind {
            TokenKind::Text | TokenKind::Comment | TokenKind::Doctype => {
                t.data = self.text().unwrap_or_default();
            }
            TokenKind::StartTag | TokenKind::SelfClosingTag | TokenKind::EndTag => {
                if let Some((name, more_attr)) = self.tag_name() {
                    let mut more_attr = more_attr;
                    let mut seen = FxHashSet::default();
                    while more_attr {
                        let Some((key, val, more)) = self.tag_attr() else {
                            break;
                        };
                        more_attr = more;
                        if seen.insert(key.clone()) {
                            t.attrs.push(Attribute::new(key, val));
                        }
                    }
                    t.atom = Atom::lookup(&name);
                    t.data = name;
                }
            }
            TokenKind::Error => {}
        }
        t
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScriptState {
    Data,
    LessThanSign,
    EndTagOpen,
    EscapeStart,
    EscapeStartDash,
    Escaped,
    EscapedDash,
    EscapedDashDash,
    EscapedLessThanSign,
    EscapedEndTagOpen,
    DoubleEscapeStart,
    DoubleEscaped,
    DoubleEscapedDash,
    DoubleEscapedDashDash,
    DoubleEscapedLessThanSign,
    DoubleEscapeEnd,
}

/// Rewrites CRLF and CR to LF, in place.
fn convert_newlines(s: &mut Vec<u8>) {
    let Some(first) = memchr::memchr(b'\r', s) else {
        return;
    };
    let mut dst = first;
    let mut src = first;
    while src < s.len() {
        let c = s[src];
        src += 1;
        if c == b'\r' {
            s[dst] = b'\n';
            if src < s.len() && s[src] == b'\n' {
                src += 1;
            }
        } else {
            s[dst] = c;
        }
        dst += 1;
    }
    s.truncate(dst);
}

fn replace_nul(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for &b in s {
        if b == 0 {
            out.extend_from_slice("\u{FFFD}".as_bytes());
        } else {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    /// Drains the tokenizer, returning `(kind, raw, token)` per token,
    /// including the terminal error token.
    fn drain(input: &str) -> Vec<(TokenKind, Vec<u8>, Token)> {
        drain_tokenizer(&mut Tokenizer::new(input.as_bytes()))
    }

    fn drain_tokenizer<R: Read>(z: &mut Tokenizer<R>) -> Vec<(TokenKind, Vec<u8>, Token)> {
        let mut out = Vec::new();
        loop {
            let kind = z.next();
            let raw = z.raw().to_vec();
            out.push((kind, raw, z.token()));
            if kind == TokenKind::Error {
                return out;
            }
        }
    }

    fn assert_reassembles(input: &str) {
        let mut z = Tokenizer::new(input.as_bytes());
        let mut raw = Vec::new();
        loop {
            let kind = z.next();
            raw.extend_from_slice(z.raw());
            if kind == TokenKind::Error {
                break;
            }
        }
        raw.extend_from_slice(z.buffered());
        assert_eq!(
            String::from_utf8_lossy(&raw),
            input,
            "raw reassembly diverged"
        );
    }

    #[test]
    fn self_closing_and_end_tags() {
        let tokens = drain("<a/>b<c/>d</e>");
        let kinds: Vec<_> = tokens.iter().map(|(k, _, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::SelfClosingTag,
                TokenKind::Text,
                TokenKind::SelfClosingTag,
                TokenKind::Text,
                TokenKind::EndTag,
                TokenKind::Error,
            ]
        );
        assert_eq!(tokens[0].2.data, "a");
        assert_eq!(tokens[1].2.data, "b");
        assert_eq!(tokens[4].2.data, "e");
        assert_reassembles("<a/>b<c/>d</e>");
    }

    #[test]
    fn raw_reassembly_on_assorted_inputs() {
        for input in [
            "",
            "plain text only",
            "<p>one</p><p>two</p>",
            "x < y, a then <b>bold</b>",
            "<!-- note --><!DOCTYPE html><?pi data?>",
            "<script>if (a < b) { c(); }</script>trailer",
            "<div unfinished",
            "<title>the &amp; title</title>",
            "broken & entity &nosuch; end",
            "<a href='q' CLASS=\"x\" checked>link</a>",
        ] {
            assert_reassembles(input);
        }
    }

    #[test]
    fn attributes_lowercase_keys_and_unescape_values() {
        let tokens = drain("<a HREF=\"/x?a=1&amp;b=2\" Title='t' disabled>");
        let tag = &tokens[0].2;
        assert_eq!(tag.kind, TokenKind::StartTag);
        assert_eq!(tag.attrs.len(), 3);
        assert_eq!(tag.attrs[0].key, "href");
        assert_eq!(tag.attrs[0].value, "/x?a=1&b=2");
        assert_eq!(tag.attrs[1].key, "title");
        assert_eq!(tag.attrs[1].value, "t");
        assert_eq!(tag.attrs[2].key, "disabled");
        assert_eq!(tag.attrs[2].value, "");
    }

    #[test]
    fn duplicate_attributes_keep_the_first() {
        let tokens = drain("<a id=one id=two ID=three>");
        let tag = &tokens[0].2;
        assert_eq!(tag.attrs.len(), 1);
        assert_eq!(tag.attrs[0].value, "one");
    }

    #[test]
    fn unquoted_attribute_values() {
        let tokens = drain("<input type=hidden value=a/b>");
        let tag = &tokens[0].2;
        assert_eq!(tag.attrs[0].value, "hidden");
        assert_eq!(tag.attrs[1].value, "a/b");
    }

    #[test]
    fn attribute_entity_legacy_mode() {
        let tokens = drain("<a b=\"q=z&amp=5&notice=hello&not;=world\">");
        let tag = &tokens[0].2;
        assert_eq!(tag.attrs[0].value, "q=z&amp=5&notice=hello\u{AC}=world");
    }

    #[test]
    fn text_decodes_entities_in_default_mode() {
        let tokens = drain("&notit;&notin;");
        assert_eq!(tokens[0].2.data, "\u{AC}it;\u{2209}");
    }

    #[test]
    fn stray_less_than_is_text() {
        let tokens = drain("a < b");
        assert_eq!(tokens[0].0, TokenKind::Text);
        assert_eq!(tokens[0].2.data, "a < b");
        assert_reassembles("a < b");
    }

    #[test]
    fn comment_forms() {
        let cases = [
            ("<!--x-->", "x"),
            ("<!---->", ""),
            ("<!-->", ""),
            ("<!--x--!>", "x"),
            ("<!--x-- >-->", "x-- >"),
            ("<?pi target?>", "?pi target?"),
            ("</ bogus>", " bogus"),
        ];
        for (input, want) in cases {
            let tokens = drain(input);
            assert_eq!(tokens[0].0, TokenKind::Comment, "kind for {input}");
            assert_eq!(tokens[0].2.data, want, "data for {input}");
            assert_reassembles(input);
        }
    }

    #[test]
    fn comment_cut_off_at_end_of_stream() {
        // At most two trailing dashes are dropped.
        let cases = [
            ("<!--x", "x"),
            ("<!--x-", "x"),
            ("<!--x--", "x"),
            ("<!--x---", "x-"),
        ];
        for (input, want) in cases {
            let tokens = drain(input);
            assert_eq!(tokens[0].2.data, want, "data for {input}");
            assert_reassembles(input);
        }
    }

    #[test]
    fn doctype_token() {
        let tokens = drain("<!DOCTYPE html PUBLIC \"-//x\" 'y'>");
        assert_eq!(tokens[0].0, TokenKind::Doctype);
        assert_eq!(tokens[0].2.data, "html PUBLIC \"-//x\" 'y'");
        assert_reassembles("<!doctype html>");
    }

    #[test]
    fn cdata_only_when_allowed() {
        let input = "<![CDATA[x<y]]>";
        let tokens = drain(input);
        assert_eq!(tokens[0].0, TokenKind::Comment);

        let mut z = Tokenizer::new(input.as_bytes());
        z.set_allow_cdata(true);
        assert_eq!(z.next(), TokenKind::Text);
        assert_eq!(z.token().data, "x<y");
    }

    #[test]
    fn rcdata_title_decodes_raw_script_does_not() {
        let tokens = drain("<title>a &amp; b</title>");
        assert_eq!(tokens[1].0, TokenKind::Text);
        assert_eq!(tokens[1].2.data, "a & b");

        let tokens = drain("<style>a &amp; b</style>");
        assert_eq!(tokens[1].2.data, "a &amp; b");
    }

    #[test]
    fn raw_text_runs_to_matching_end_tag() {
        let input = "<textarea><p>not a tag</textarea>";
        let tokens = drain(input);
        assert_eq!(tokens[1].0, TokenKind::Text);
        assert_eq!(tokens[1].2.data, "<p>not a tag");
        assert_eq!(tokens[2].0, TokenKind::EndTag);
        assert_reassembles(input);
    }

    #[test]
    fn script_escaped_state_still_honors_end_tag() {
        // A lone "<!--" opens the escaped state but "</script>" still
        // terminates it; only the double-escaped state swallows the closer.
        let input = "<script><!-- if (a</script>) -->";
        let tokens = drain(input);
        assert_eq!(tokens[1].0, TokenKind::Text);
        assert_eq!(tokens[1].2.data, "<!-- if (a");
        assert_eq!(tokens[2].0, TokenKind::EndTag);
        assert_eq!(tokens[3].2.data, ") -->");
        assert_reassembles(input);
    }

    #[test]
    fn script_double_escape() {
        let input = "<script><!--<script>x</script>--></script>done";
        let tokens = drain(input);
        assert_eq!(tokens[1].2.data, "<!--<script>x</script>-->");
        assert_eq!(tokens[2].0, TokenKind::EndTag);
        assert_eq!(tokens[3].2.data, "done");
        assert_reassembles(input);
    }

    #[test]
    fn plaintext_consumes_everything() {
        let input = "<plaintext></plaintext><b>";
        let tokens = drain(input);
        assert_eq!(tokens[1].0, TokenKind::Text);
        assert_eq!(tokens[1].2.data, "</plaintext><b>");
        assert_reassembles(input);
    }

    #[test]
    fn eof_inside_tag_preserves_raw() {
        let input = "before<div class='x";
        let mut z = Tokenizer::new(input.as_bytes());
        assert_eq!(z.next(), TokenKind::Text);
        assert_eq!(z.next(), TokenKind::Error);
        assert_eq!(z.raw(), b"<div class='x");
        assert!(z.err().unwrap().is_end_of_stream());
    }

    #[test]
    fn empty_end_tag_is_an_empty_comment() {
        let tokens = drain("a</>b");
        let kinds: Vec<_> = tokens.iter().map(|(k, _, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Text,
                TokenKind::Comment,
                TokenKind::Text,
                TokenKind::Error
            ]
        );
        assert_eq!(tokens[1].2.data, "");
        assert_reassembles("a</>b");
    }

    #[test]
    fn crlf_normalizes_to_lf() {
        let tokens = drain("a\r\nb\rc<d e='x\r\ny'>");
        assert_eq!(tokens[0].2.data, "a\nb\nc");
        assert_eq!(tokens[1].2.data, "d");
        assert_eq!(tokens[1].2.attrs[0].value, "x\ny");
    }

    #[test]
    fn max_buf_fails_with_buffer_exceeded() {
        let input = format!("<div title=\"{}\">", "x".repeat(256));
        let mut z = Tokenizer::new(input.as_bytes());
        z.set_max_buf(64);
        assert_eq!(z.next(), TokenKind::Error);
        assert!(matches!(z.err(), Some(Error::BufferExceeded)));
    }

    #[test]
    fn max_buf_allows_small_tokens() {
        let mut z = Tokenizer::new("<p>abc</p>".as_bytes());
        z.set_max_buf(64);
        assert_eq!(z.next(), TokenKind::StartTag);
        assert_eq!(z.next(), TokenKind::Text);
        assert_eq!(z.next(), TokenKind::EndTag);
        assert_eq!(z.next(), TokenKind::Error);
        assert!(z.err().unwrap().is_end_of_stream());
    }

    /// A reader that reports `Interrupted` forever.
    struct InterruptedReader;

    impl Read for InterruptedReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"))
        }
    }

    #[test]
    fn endless_interrupts_fail_with_no_progress() {
        let mut z = Tokenizer::new(InterruptedReader);
        assert_eq!(z.next(), TokenKind::Error);
        assert!(matches!(z.err(), Some(Error::NoProgress)));
    }

    /// Feeds one byte per read call, to exercise buffer refills and span
    /// rebasing mid-token.
    struct TrickleReader<'a> {
        data: &'a [u8],
        at: usize,
    }

    impl Read for TrickleReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.at >= self.data.len() {
                return Ok(0);
            }
            buf[0] = self.data[self.at];
            self.at += 1;
            Ok(1)
        }
    }

    #[test]
    fn trickled_input_tokenizes_identically() {
        let input = "<p id='x'>hi &amp; bye</p><!--c--><title>t</title>";
        let whole = drain(input);
        let mut z = Tokenizer::new(TrickleReader {
            data: input.as_bytes(),
            at: 0,
        });
        let trickled = drain_tokenizer(&mut z);
        assert_eq!(whole.len(), trickled.len());
        for (a, b) in whole.iter().zip(&trickled) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1);
            assert_eq!(a.2.data, b.2.data);
            assert_eq!(a.2.attrs, b.2.attrs);
        }
    }

    #[test]
    fn fragment_tokenizer_starts_in_context_raw_mode() {
        let mut z = Tokenizer::new_fragment("x</textarea>y".as_bytes(), "textarea");
        assert_eq!(z.next(), TokenKind::Text);
        assert_eq!(z.token().data, "x");
        assert_eq!(z.next(), TokenKind::EndTag);
    }

    #[test]
    fn nul_conversion_applies_to_raw_text() {
        let tokens = drain("<style>a\0b</style>");
        assert_eq!(tokens[1].2.data, "a\u{FFFD}b");
    }
}
