//! Interned codes for the known HTML tag and attribute vocabulary.
//!
//! An [`Atom`] packs `(offset << 8) | length` into a single concatenated
//! text of every known name, so equality is a `u32` compare and resolving a
//! code back to its spelling is a slice of static text. Zero is reserved
//! for "not a known name". Lookup is case-sensitive; HTML-namespace callers
//! are expected to lowercase first.

use lazy_static::lazy_static;

/// A 32-bit code identifying a known HTML tag or attribute name.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Atom(u32);

macro_rules! atoms {
    ($($konst:ident => $name:literal,)+) => {
        pub(crate) const ATOM_NAMES: &[&str] = &[$($name),+];

        #[allow(non_camel_case_types, dead_code)]
        #[repr(u32)]
        enum Index { $($konst),+ }

        $(
            pub const $konst: Atom = Atom(pack(Index::$konst as u32));
        )+
    };
}

/// Packs the table code for the name at `index`: the byte offset of the
/// name within the concatenated atom text, shifted left eight, or'd with
/// the name length.
const fn pack(index: u32) -> u32 {
    let mut offset = 0u32;
    let mut i = 0usize;
    while i < index as usize {
        offset += ATOM_NAMES[i].len() as u32;
        i += 1;
    }
    (offset << 8) | (ATOM_NAMES[index as usize].len() as u32)
}

const fn longest_name() -> usize {
    let mut max = 0usize;
    let mut i = 0usize;
    while i < ATOM_NAMES.len() {
        if ATOM_NAMES[i].len() > max {
            max = ATOM_NAMES[i].len();
        }
        i += 1;
    }
    max
}

const MAX_ATOM_LEN: usize = longest_name();

atoms! {
    A => "a",
    ABBR => "abbr",
    ADDRESS => "address",
    ALT => "alt",
    ANNOTATION_XML => "annotation-xml",
    APPLET => "applet",
    AREA => "area",
    ARTICLE => "article",
    ASIDE => "aside",
    AUDIO => "audio",
    B => "b",
    BASE => "base",
    BASEFONT => "basefont",
    BDI => "bdi",
    BDO => "bdo",
    BGSOUND => "bgsound",
    BIG => "big",
    BLOCKQUOTE => "blockquote",
    BODY => "body",
    BR => "br",
    BUTTON => "button",
    CANVAS => "canvas",
    CAPTION => "caption",
    CENTER => "center",
    CHARSET => "charset",
    CHECKED => "checked",
    CITE => "cite",
    CLASS => "class",
    CODE => "code",
    COL => "col",
    COLGROUP => "colgroup",
    COLOR => "color",
    COLS => "cols",
    COLSPAN => "colspan",
    CONTENT => "content",
    CONTROLS => "controls",
    DATA => "data",
    DATALIST => "datalist",
    DD => "dd",
    DEL => "del",
    DESC => "desc",
    DETAILS => "details",
    DFN => "dfn",
    DIALOG => "dialog",
    DIR => "dir",
    DISABLED => "disabled",
    DIV => "div",
    DL => "dl",
    DT => "dt",
    EM => "em",
    EMBED => "embed",
    ENCODING => "encoding",
    FACE => "face",
    FIELDSET => "fieldset",
    FIGCAPTION => "figcaption",
    FIGURE => "figure",
    FONT => "font",
    FOOTER => "footer",
    FOR => "for",
    FOREIGNOBJECT => "foreignobject",
    FOREIGN_OBJECT => "foreignObject",
    FORM => "form",
    FRAME => "frame",
    FRAMESET => "frameset",
    H1 => "h1",
    H2 => "h2",
    H3 => "h3",
    H4 => "h4",
    H5 => "h5",
    H6 => "h6",
    HEAD => "head",
    HEADER => "header",
    HEIGHT => "height",
    HGROUP => "hgroup",
    HIDDEN => "hidden",
    HR => "hr",
    HREF => "href",
    HTML => "html",
    HTTP_EQUIV => "http-equiv",
    I => "i",
    ID => "id",
    IFRAME => "iframe",
    IMAGE => "image",
    IMG => "img",
    INPUT => "input",
    INS => "ins",
    KBD => "kbd",
    KEYGEN => "keygen",
    LABEL => "label",
    LANG => "lang",
    LEGEND => "legend",
    LI => "li",
    LINK => "link",
    LISTING => "listing",
    MAIN => "main",
    MALIGNMARK => "malignmark",
    MAP => "map",
    MARK => "mark",
    MARQUEE => "marquee",
    MATH => "math",
    MAXLENGTH => "maxlength",
    MEDIA => "media",
    MENU => "menu",
    META => "meta",
    METER => "meter",
    MGLYPH => "mglyph",
    MI => "mi",
    MN => "mn",
    MO => "mo",
    MS => "ms",
    MTEXT => "mtext",
    MULTIPLE => "multiple",
    NAME => "name",
    NAV => "nav",
    NOBR => "nobr",
    NOEMBED => "noembed",
    NOFRAMES => "noframes",
    NOSCRIPT => "noscript",
    OBJECT => "object",
    OL => "ol",
    OPTGROUP => "optgroup",
    OPTION => "option",
    OUTPUT => "output",
    P => "p",
    PARAM => "param",
    PICTURE => "picture",
    PLACEHOLDER => "placeholder",
    PLAINTEXT => "plaintext",
    POSTER => "poster",
    PRE => "pre",
    PROGRESS => "progress",
    Q => "q",
    RB => "rb",
    READONLY => "readonly",
    REL => "rel",
    REQUIRED => "required",
    ROWS => "rows",
    ROWSPAN => "rowspan",
    RP => "rp",
    RT => "rt",
    RTC => "rtc",
    RUBY => "ruby",
    S => "s",
    SAMP => "samp",
    SCRIPT => "script",
    SECTION => "section",
    SELECT => "select",
    SELECTED => "selected",
    SIZE => "size",
    SIZES => "sizes",
    SLOT => "slot",
    SMALL => "small",
    SOURCE => "source",
    SPAN => "span",
    SRC => "src",
    SRCSET => "srcset",
    STRIKE => "strike",
    STRONG => "strong",
    STYLE => "style",
    SUB => "sub",
    SUMMARY => "summary",
    SUP => "sup",
    SVG => "svg",
    TABINDEX => "tabindex",
    TABLE => "table",
    TARGET => "target",
    TBODY => "tbody",
    TD => "td",
    TEMPLATE => "template",
    TEXTAREA => "textarea",
    TFOOT => "tfoot",
    TH => "th",
    THEAD => "thead",
    TIME => "time",
    TITLE => "title",
    TR => "tr",
    TRACK => "track",
    TT => "tt",
    TYPE => "type",
    U => "u",
    UL => "ul",
    USEMAP => "usemap",
    VALUE => "value",
    VAR => "var",
    VIDEO => "video",
    WBR => "wbr",
    WIDTH => "width",
    WRAP => "wrap",
    XMP => "xmp",
}

struct AtomSet {
    text: String,
    table: Vec<u32>,
    mask: u32,
    seed: u32,
}

impl AtomSet {
    /// Derives the dual-slot open-addressed table. Every name must land in
    /// one of the two slots selected by the halves of its hash; the seed is
    /// advanced (and on exhaustion the table doubled) until they all fit.
    fn build() -> AtomSet {
        let mut text = String::new();
        for name in ATOM_NAMES {
            text.push_str(name);
        }

        let mut size = (ATOM_NAMES.len() * 2).next_power_of_two();
        loop {
            let mask = size as u32 - 1;
            'seed: for seed in 0..50_000u32 {
                let mut table = vec![0u32; size];
                for (i, name) in ATOM_NAMES.iter().enumerate() {
                    let code = pack(i as u32);
                    let h = fnv(seed, name.as_bytes());
                    let lo = (h & mask) as usize;
                    let hi = ((h >> 16) & mask) as usize;
                    if table[lo] == 0 {
                        table[lo] = code;
                    } else if table[hi] == 0 && hi != lo {
                        table[hi] = code;
                    } else {
                        continue 'seed;
                    }
                }
                return AtomSet {
                    text,
                    table,
                    mask,
                    seed,
                };
            }
            size *= 2;
        }
    }

    fn name_of(&self, code: u32) -> &str {
        let start = (code >> 8) as usize;
        &self.text[start..start + (code & 0xFF) as usize]
    }
}

lazy_static! {
    static ref ATOMS: AtomSet = AtomSet::build();
}

/// FNV-1a over `s`, starting from `basis`.
fn fnv(basis: u32, s: &[u8]) -> u32 {
    let mut h = basis;
    for &b in s {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    h
}

impl Atom {
    /// The zero code: not a known name.
    pub const NONE: Atom = Atom(0);

    /// Finds the atom for `name`, or [`Atom::NONE`] when it is not in the
    /// table. Matching is case-sensitive.
    pub fn lookup(name: &str) -> Atom {
        Atom::lookup_bytes(name.as_bytes())
    }

    pub fn lookup_bytes(s: &[u8]) -> Atom {
        if s.is_empty() || s.len() > MAX_ATOM_LEN {
            return Atom::NONE;
        }
        let set = &*ATOMS;
        let h = fnv(set.seed, s);
        let code = set.table[(h & set.mask) as usize];
        if code != 0 && set.name_of(code).as_bytes() == s {
            return Atom(code);
        }
        let code = set.table[((h >> 16) & set.mask) as usize];
        if code != 0 && set.name_of(code).as_bytes() == s {
            return Atom(code);
        }
        Atom::NONE
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The spelling this code stands for; empty for [`Atom::NONE`].
    pub fn as_str(self) -> &'static str {
        if self.0 == 0 {
            return "";
        }
        ATOMS.name_of(self.0)
    }

    /// The raw packed code.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 == 0 {
            f.write_str("Atom(none)")
        } else {
            write!(f, "Atom({})", self.as_str())
        }
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_name_round_trips() {
        for name in ATOM_NAMES {
            let atom = Atom::lookup(name);
            assert!(!atom.is_none(), "{name} missing from the table");
            assert_eq!(atom.as_str(), *name);
        }
    }

    #[test]
    fn consts_agree_with_lookup() {
        assert_eq!(Atom::lookup("a"), A);
        assert_eq!(Atom::lookup("table"), TABLE);
        assert_eq!(Atom::lookup("annotation-xml"), ANNOTATION_XML);
        assert_eq!(Atom::lookup("foreignObject"), FOREIGN_OBJECT);
        assert_eq!(TEMPLATE.as_str(), "template");
    }

    #[test]
    fn unknown_names_miss() {
        for name in ["", "x-custom", "tabel", "DIV", "scripts", "zzzzzz"] {
            assert!(Atom::lookup(name).is_none(), "{name} should not resolve");
        }
        // Longer than any table entry.
        assert!(Atom::lookup("a-name-longer-than-any-table-entry").is_none());
    }

    #[test]
    fn collision_adversaries_miss() {
        // Same length and close spelling to table entries; these probe the
        // second hash slot path.
        for name in ["tabla", "tboby", "heed", "ttile", "stlye", "b1", "h7"] {
            assert!(Atom::lookup(name).is_none(), "{name} should not resolve");
        }
    }

    #[test]
    fn codes_pack_offset_and_length() {
        for name in ATOM_NAMES {
            let atom = Atom::lookup(name);
            assert_eq!((atom.get() & 0xFF) as usize, name.len());
        }
    }

    #[test]
    fn names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for name in ATOM_NAMES {
            assert!(seen.insert(*name), "{name} listed twice");
        }
    }
}
