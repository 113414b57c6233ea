//! DOCTYPE declaration parsing and quirks-mode determination.
//!
//! A DOCTYPE comprises a name and optional public/system identifiers.
//! Legacy identifier values switch the document into quirks mode, which
//! relaxes the `<p>`-closing rule around tables during tree construction.
//!
//! @see https://html.spec.whatwg.org/multipage/parsing.html#the-initial-insertion-mode

use crate::macros::strcspn;

const WHITESPACE: &[char] = &[' ', '\t', '\r', '\n', '\x0c'];

/// Public identifier prefixes that force quirks mode, compared ASCII
/// case-insensitively against the lowercased identifier.
static QUIRKY_PUBLIC_ID_PREFIXES: &[&str] = &[
    "+//silmaril//dtd html pro v0r11 19970101//",
    "-//advasoft ltd//dtd html 3.0 aswedit + extensions//",
    "-//as//dtd html 3.0 aswedit + extensions//",
    "-//ietf//dtd html 2.0 level 1//",
    "-//ietf//dtd html 2.0 level 2//",
    "-//ietf//dtd html 2.0 strict level 1//",
    "-//ietf//dtd html 2.0 strict level 2//",
    "-//ietf//dtd html 2.0 strict//",
    "-//ietf//dtd html 2.0//",
    "-//ietf//dtd html 2.1e//",
    "-//ietf//dtd html 3.0//",
    "-//ietf//dtd html 3.2 final//",
    "-//ietf//dtd html 3.2//",
    "-//ietf//dtd html 3//",
    "-//ietf//dtd html level 0//",
    "-//ietf//dtd html level 1//",
    "-//ietf//dtd html level 2//",
    "-//ietf//dtd html level 3//",
    "-//ietf//dtd html strict level 0//",
    "-//ietf//dtd html strict level 1//",
    "-//ietf//dtd html strict level 2//",
    "-//ietf//dtd html strict level 3//",
    "-//ietf//dtd html strict//",
    "-//ietf//dtd html//",
    "-//metrius//dtd metrius presentational//",
    "-//microsoft//dtd internet explorer 2.0 html strict//",
    "-//microsoft//dtd internet explorer 2.0 html//",
    "-//microsoft//dtd internet explorer 2.0 tables//",
    "-//microsoft//dtd internet explorer 3.0 html strict//",
    "-//microsoft//dtd internet explorer 3.0 html//",
    "-//microsoft//dtd internet explorer 3.0 tables//",
    "-//netscape comm. corp.//dtd html//",
    "-//netscape comm. corp.//dtd strict html//",
    "-//o'reilly and associates//dtd html 2.0//",
    "-//o'reilly and associates//dtd html extended 1.0//",
    "-//o'reilly and associates//dtd html extended relaxed 1.0//",
    "-//softquad software//dtd hotmetal pro 6.0::19990601::extensions to html 4.0//",
    "-//softquad//dtd hotmetal pro 4.0::19971010::extensions to html 4.0//",
    "-//spyglass//dtd html 2.0 extended//",
    "-//sq//dtd html 2.0 hotmetal + extensions//",
    "-//sun microsystems corp.//dtd hotjava html//",
    "-//sun microsystems corp.//dtd hotjava strict html//",
    "-//w3c//dtd html 3 1995-03-24//",
    "-//w3c//dtd html 3.2 draft//",
    "-//w3c//dtd html 3.2 final//",
    "-//w3c//dtd html 3.2//",
    "-//w3c//dtd html 3.2s draft//",
    "-//w3c//dtd html 4.0 frameset//",
    "-//w3c//dtd html 4.0 transitional//",
    "-//w3c//dtd html experimental 19960712//",
    "-//w3c//dtd html experimental 970421//",
    "-//w3c//dtd w3 html//",
    "-//w3o//dtd w3 html 3.0//",
    "-//webtechs//dtd mozilla html 2.0//",
    "-//webtechs//dtd mozilla html//",
];

/// These two public identifiers force quirks mode only when no system
/// identifier accompanies them.
static QUIRKY_WITHOUT_SYSTEM_ID: &[&str] = &[
    "-//w3c//dtd html 4.01 frameset//",
    "-//w3c//dtd html 4.01 transitional//",
];

const QUIRKY_SYSTEM_ID: &str = "http://www.ibm.com/data/dtd/v11/ibmxhtml1-transitional.dtd";

/// A parsed DOCTYPE declaration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DoctypeInfo {
    /// Lowercased name; "html" for conforming documents.
    pub name: String,
    pub public_identifier: Option<String>,
    pub system_identifier: Option<String>,
    /// Whether this declaration switches the document into quirks mode.
    pub quirks: bool,
}

/// Splits the raw declaration data (everything between `<!DOCTYPE` and `>`)
/// into name and identifiers and derives the quirks flag.
pub fn parse_doctype(data: &str) -> DoctypeInfo {
    let mut info = DoctypeInfo::default();

    let s = data.trim_start_matches(WHITESPACE);
    let space = strcspn!(s.as_bytes(), b' ' | b'\t' | b'\r' | b'\n' | b'\x0c');
    info.name = s[..space].to_ascii_lowercase();
    info.quirks = info.name != "html";
    let mut s = s[space..].trim_start_matches(WHITESPACE);

    if s.len() < 6 {
        // Too short to carry "PUBLIC" or "SYSTEM"; trailing junk still
        // counts against the declaration.
        info.quirks = info.quirks || !s.is_empty();
        return info;
    }

    let keyword = s[..6].to_ascii_lowercase();
    s = &s[6..];
    if keyword != "public" && keyword != "system" {
        info.quirks = true;
        return info;
    }

    // After a PUBLIC identifier the system identifier may follow bare,
    // with no SYSTEM keyword; `key` tracks which identifier a quoted
    // string would be.
    let mut key = keyword.as_str();
    let mut keyword_pending = true;
    while key == "public" || key == "system" {
        s = s.trim_start_matches(WHITESPACE);
        if s.is_empty() {
            if keyword_pending {
                // A literal keyword with no identifier forces quirks.
                info.quirks = true;
            }
            key = "";
            break;
        }
        let quote = s.as_bytes()[0];
        if quote != b'"' && quote != b'\'' {
            info.quirks = true;
            key = "";
            break;
        }
        s = &s[1..];
        let id = match memchr::memchr(quote, s.as_bytes()) {
            Some(q) => {
                let id = &s[..q];
                s = &s[q + 1..];
                id
            }
            None => {
                let id = s;
                s = "";
                id
            }
        };
        if key == "public" {
            info.public_identifier = Some(id.to_string());
            key = "system";
        } else {
            info.system_identifier = Some(id.to_string());
            key = "";
        }
        keyword_pending = false;
    }

    if !s.trim_start_matches(WHITESPACE).is_empty() {
        info.quirks = true;
        return info;
    }
    if info.quirks {
        return info;
    }

    if let Some(public) = &info.public_identifier {
        let public = public.to_ascii_lowercase();
        match public.as_str() {
            "-//w3o//dtd w3 html strict 3.0//en//" | "-/w3d/dtd html 4.0 transitional/en"
            | "html" => info.quirks = true,
            _ => {
                if QUIRKY_PUBLIC_ID_PREFIXES
                    .iter()
                    .any(|prefix| public.starts_with(prefix))
                {
                    info.quirks = true;
                }
            }
        }
        if info.system_identifier.is_none()
            && QUIRKY_WITHOUT_SYSTEM_ID
                .iter()
                .any(|prefix| public.starts_with(prefix))
        {
            info.quirks = true;
        }
    }
    if let Some(system) = &info.system_identifier {
        if system.eq_ignore_ascii_case(QUIRKY_SYSTEM_ID) {
            info.quirks = true;
        }
    }

    info
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modern_doctype_is_not_quirky() {
        let info = parse_doctype("html");
        assert_eq!(info.name, "html");
        assert!(!info.quirks);
        assert!(info.public_identifier.is_none());
        assert!(info.system_identifier.is_none());

        // The name is matched after lowercasing.
        assert!(!parse_doctype("HTML").quirks);
    }

    #[test]
    fn non_html_names_are_quirky() {
        assert!(parse_doctype("svg").quirks);
        assert!(parse_doctype("").quirks);
    }

    #[test]
    fn public_and_system_identifiers_parse() {
        let info = parse_doctype(
            "html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \
             \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\"",
        );
        assert_eq!(
            info.public_identifier.as_deref(),
            Some("-//W3C//DTD XHTML 1.0 Strict//EN")
        );
        assert_eq!(
            info.system_identifier.as_deref(),
            Some("http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd")
        );
        assert!(!info.quirks);

        let info = parse_doctype("html SYSTEM 'about:legacy-compat'");
        assert_eq!(info.system_identifier.as_deref(), Some("about:legacy-compat"));
        assert!(info.public_identifier.is_none());
        assert!(!info.quirks);

        // A lone unlisted public identifier does not force quirks.
        let info = parse_doctype("html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\"");
        assert!(!info.quirks);
    }

    #[test]
    fn quirky_public_identifier_prefixes() {
        let info =
            parse_doctype("html PUBLIC \"-//W3C//DTD HTML 4.0 Transitional//EN\"");
        assert!(info.quirks);

        let info = parse_doctype("html PUBLIC \"-//IETF//DTD HTML 2.0//EN\"");
        assert!(info.quirks);
    }

    #[test]
    fn html_401_variants_depend_on_system_identifier() {
        let with_system = parse_doctype(
            "html PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\" \
             \"http://www.w3.org/TR/html4/loose.dtd\"",
        );
        assert!(!with_system.quirks);

        let without_system =
            parse_doctype("html PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\"");
        assert!(without_system.quirks);
    }

    #[test]
    fn ibm_system_identifier_is_quirky() {
        let info = parse_doctype(
            "html SYSTEM \"http://www.ibm.com/data/dtd/v11/ibmxhtml1-transitional.dtd\"",
        );
        assert!(info.quirks);
    }

    #[test]
    fn malformed_identifier_sections_are_quirky() {
        assert!(parse_doctype("html PUBLIC").quirks);
        assert!(parse_doctype("html junk").quirks);
        assert!(parse_doctype("html PUBLIC \"x\" trailing").quirks);
    }
}
