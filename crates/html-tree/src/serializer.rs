//! Tree serialization back to HTML text.
//!
//! The output re-parses to the same tree for trees this crate built:
//! text and attribute values are escaped, raw-text element content is
//! emitted verbatim, and `pre`/`listing`/`textarea` regain the leading
//! newline their parse dropped.

use crate::atoms;
use crate::node::{NodeArena, NodeId, NodeKind};

/// Elements with no content model and no closing tag.
static VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Elements whose text children render without escaping.
static RAW_TEXT_CHILDREN: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "xmp",
];

/// Renders the subtree at `id`. A Document node renders as its children.
///
/// Error and ScopeMarker nodes cannot be rendered; finding one is a bug in
/// the tree's producer.
pub fn render(arena: &NodeArena, id: NodeId) -> String {
    let mut out = String::new();
    render_into(&mut out, arena, id);
    out
}

/// Appends the rendering of `id` to `out`. Returns false when rendering
/// must stop (after `<plaintext>`, which swallows the rest of the file).
pub(crate) fn render_into(out: &mut String, arena: &NodeArena, id: NodeId) -> bool {
    let n = arena.get(id);
    match n.kind {
        NodeKind::Error => panic!("cannot render an Error node"),
        NodeKind::ScopeMarker => panic!("cannot render a ScopeMarker node"),
        NodeKind::Text => {
            entities::escape_into(out, &n.data);
            return true;
        }
        NodeKind::Document => {
            for child in arena.children(id) {
                if !render_into(out, arena, child) {
                    return false;
                }
            }
            return true;
        }
        NodeKind::Comment => {
            out.push_str("<!--");
            out.push_str(&n.data);
            out.push_str("-->");
            return true;
        }
        NodeKind::Doctype => {
            out.push_str("<!DOCTYPE ");
            out.push_str(&n.data);
            let public = n.attrs.iter().find(|a| a.key == "public");
            let system = n.attrs.iter().find(|a| a.key == "system");
            if let Some(public) = public {
                out.push_str(" PUBLIC ");
                push_quoted(out, &public.value);
                if let Some(system) = system {
                    out.push(' ');
                    push_quoted(out, &system.value);
                }
            } else if let Some(system) = system {
                out.push_str(" SYSTEM ");
                push_quoted(out, &system.value);
            }
            out.push('>');
            return true;
        }
        NodeKind::Raw => {
            out.push_str(&n.data);
            return true;
        }
        NodeKind::Element => {}
    }

    // The opening tag, attribute values escaped.
    out.push('<');
    out.push_str(&n.data);
    for attr in &n.attrs {
        out.push(' ');
        if !attr.namespace.is_empty() {
            out.push_str(&attr.namespace);
            out.push(':');
        }
        out.push_str(&attr.key);
        out.push_str("=\"");
        entities::escape_into(out, &attr.value);
        out.push('"');
    }
    if VOID_ELEMENTS.contains(&n.data.as_str()) {
        assert!(
            arena.first_child(id).is_none(),
            "void element <{}> has child nodes",
            n.data
        );
        out.push_str("/>");
        return true;
    }
    out.push('>');

    // Restore the leading newline these elements drop on parse, so the
    // output re-parses to the same text.
    if matches!(n.atom, a if a == atoms::PRE || a == atoms::LISTING || a == atoms::TEXTAREA) {
        if let Some(first) = arena.first_child(id) {
            let c = arena.get(first);
            if c.kind == NodeKind::Text && c.data.starts_with('\n') {
                out.push('\n');
            }
        }
    }

    if RAW_TEXT_CHILDREN.contains(&n.data.as_str()) {
        for child in arena.children(id) {
            let c = arena.get(child);
            if c.kind == NodeKind::Text {
                out.push_str(&c.data);
            } else if !render_into(out, arena, child) {
                return false;
            }
        }
        if n.data == "plaintext" {
            // <plaintext> runs to the end of the file with no closing tag.
            return false;
        }
    } else {
        for child in arena.children(id) {
            if !render_into(out, arena, child) {
                return false;
            }
        }
    }

    out.push_str("</");
    out.push_str(&n.data);
    out.push('>');
    true
}

/// Quotes an identifier with `"`, falling back to `'` when the value
/// itself contains a double quote.
fn push_quoted(out: &mut String, s: &str) {
    let quote = if s.contains('"') { '\'' } else { '"' };
    out.push(quote);
    out.push_str(s);
    out.push(quote);
}
