//! The tree constructor: an insertion-mode state machine that consumes
//! tokens and builds the document tree, repairing malformed markup along
//! the way.
//!
//! Each mode handler consumes the current token and reports whether it did
//! so; an unconsumed token is re-dispatched under the (possibly changed)
//! mode. Tokens arising inside foreign content go through the foreign
//! dispatcher first.
//!
//! @see https://html.spec.whatwg.org/multipage/parsing.html#tree-construction

mod active_formatting_elements;
mod foreign;
mod insertion_mode;
mod stack_of_open_elements;

use std::io::Read;

use log::{debug, trace};
use rustc_hash::FxHashSet;

use crate::atoms::{self, Atom};
use crate::doctype::parse_doctype;
use crate::errors::Error;
use crate::macros::strspn;
use crate::node::{Attribute, Namespace, Node, NodeArena, NodeId, NodeKind};
use crate::tokenizer::{Token, TokenKind, Tokenizer};
use crate::ParseOptions;
use active_formatting_elements::{ActiveFormattingElements, AfeEntry};
use foreign::{
    adjust_attribute_names, adjust_foreign_attributes, is_breakout_tag, svg_tag_name_adjustment,
    MATHML_ATTRIBUTE_ADJUSTMENTS, SVG_ATTRIBUTE_ADJUSTMENTS,
};
use insertion_mode::InsertionMode;
use stack_of_open_elements::StackOfOpenElements;

/// Elements in the "special" category, which bound "any other end tag"
/// handling and the adoption agency's furthest-block search.
///
/// @see https://html.spec.whatwg.org/multipage/parsing.html#special
static SPECIAL_ELEMENTS: &[Atom] = &[
    atoms::ADDRESS,
    atoms::APPLET,
    atoms::AREA,
    atoms::ARTICLE,
    atoms::ASIDE,
    atoms::BASE,
    atoms::BASEFONT,
    atoms::BGSOUND,
    atoms::BLOCKQUOTE,
    atoms::BODY,
    atoms::BR,
    atoms::BUTTON,
    atoms::CAPTION,
    atoms::CENTER,
    atoms::COL,
    atoms::COLGROUP,
    atoms::DD,
    atoms::DETAILS,
    atoms::DIR,
    atoms::DIV,
    atoms::DL,
    atoms::DT,
    atoms::EMBED,
    atoms::FIELDSET,
    atoms::FIGCAPTION,
    atoms::FIGURE,
    atoms::FOOTER,
    atoms::FORM,
    atoms::FRAME,
    atoms::FRAMESET,
    atoms::H1,
    atoms::H2,
    atoms::H3,
    atoms::H4,
    atoms::H5,
    atoms::H6,
    atoms::HEAD,
    atoms::HEADER,
    atoms::HGROUP,
    atoms::HR,
    atoms::HTML,
    atoms::IFRAME,
    atoms::IMG,
    atoms::INPUT,
    atoms::KEYGEN,
    atoms::LI,
    atoms::LINK,
    atoms::LISTING,
    atoms::MAIN,
    atoms::MARQUEE,
    atoms::MENU,
    atoms::META,
    atoms::NAV,
    atoms::NOEMBED,
    atoms::NOFRAMES,
    atoms::NOSCRIPT,
    atoms::OBJECT,
    atoms::OL,
    atoms::P,
    atoms::PARAM,
    atoms::PLAINTEXT,
    atoms::PRE,
    atoms::SCRIPT,
    atoms::SECTION,
    atoms::SELECT,
    atoms::SOURCE,
    atoms::STYLE,
    atoms::SUMMARY,
    atoms::TABLE,
    atoms::TBODY,
    atoms::TD,
    atoms::TEMPLATE,
    atoms::TEXTAREA,
    atoms::TFOOT,
    atoms::TH,
    atoms::THEAD,
    atoms::TITLE,
    atoms::TR,
    atoms::TRACK,
    atoms::UL,
    atoms::WBR,
    atoms::XMP,
];

/// Formatting elements whose end tags invoke the adoption agency.
static FORMATTING_END_TAGS: &[Atom] = &[
    atoms::A,
    atoms::B,
    atoms::BIG,
    atoms::CODE,
    atoms::EM,
    atoms::FONT,
    atoms::I,
    atoms::NOBR,
    atoms::S,
    atoms::SMALL,
    atoms::STRIKE,
    atoms::STRONG,
    atoms::TT,
    atoms::U,
];

/// Scope variants for stack containment checks. Each variant adds its own
/// stop set on top of the match tags.
///
/// @see https://html.spec.whatwg.org/multipage/parsing.html#has-an-element-in-scope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Default,
    ListItem,
    Button,
    Table,
    TableRow,
    TableBody,
    Select,
}

fn trim_leading_whitespace(s: &str) -> &str {
    let n = strspn!(s.as_bytes(), b' ' | b'\t' | b'\n' | b'\x0c' | b'\r');
    &s[n..]
}

fn trim_leading_whitespace_or_nul(s: &str) -> &str {
    let n = strspn!(s.as_bytes(), b' ' | b'\t' | b'\n' | b'\x0c' | b'\r' | b'\0');
    &s[n..]
}

fn whitespace_only(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, ' ' | '\t' | '\n' | '\x0c' | '\r'))
        .collect()
}

pub(crate) struct TreeBuilder<R: Read> {
    tokenizer: Tokenizer<R>,
    arena: NodeArena,
    /// The root Document node.
    doc: NodeId,
    /// The token being processed.
    tok: Token,
    has_self_closing_token: bool,
    /// The stack of open elements.
    oe: StackOfOpenElements,
    /// The list of active formatting elements.
    afe: ActiveFormattingElements,
    /// The head element, once created.
    head: Option<NodeId>,
    /// The form element pointer; forms are not nested.
    form: Option<NodeId>,
    scripting: bool,
    frameset_ok: bool,
    pub(crate) quirks: bool,
    fragment: bool,
    /// The context element when parsing a fragment.
    context: Option<NodeId>,
    im: InsertionMode,
    /// The mode to return to once text mode completes.
    original_im: Option<InsertionMode>,
    foster_parenting: bool,
    /// Stack of template insertion modes.
    template_stack: Vec<InsertionMode>,
}

impl<R: Read> TreeBuilder<R> {
    pub(crate) fn new(reader: R, options: &ParseOptions) -> TreeBuilder<R> {
        let mut tokenizer = Tokenizer::new(reader);
        if options.max_buf > 0 {
            tokenizer.set_max_buf(options.max_buf);
        }
        let mut arena = NodeArena::new();
        let doc = arena.alloc(Node::new(NodeKind::Document));
        TreeBuilder {
            tokenizer,
            arena,
            doc,
            tok: Token::default(),
            has_self_closing_token: false,
            oe: StackOfOpenElements::new(),
            afe: ActiveFormattingElements::new(),
            head: None,
            form: None,
            scripting: options.scripting,
            frameset_ok: options.frameset_ok,
            quirks: false,
            fragment: false,
            context: None,
            im: InsertionMode::Initial,
            original_im: None,
            foster_parenting: false,
            template_stack: Vec::new(),
        }
    }

    /// A parser prepared for fragment parsing: a synthetic `<html>` root is
    /// pre-installed, the open-elements stack pre-populated, and the
    /// insertion mode reset against the context element.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#html-fragment-parsing-algorithm
    pub(crate) fn new_fragment(
        reader: R,
        context: Option<Node>,
        options: &ParseOptions,
    ) -> Result<TreeBuilder<R>, Error> {
        let context_tag = match &context {
            Some(ctx) => {
                if ctx.kind != NodeKind::Element || ctx.atom != Atom::lookup(&ctx.data) {
                    return Err(Error::InconsistentNode);
                }
                ctx.atom.as_str().to_string()
            }
            None => String::new(),
        };

        let mut tokenizer = Tokenizer::new_fragment(reader, &context_tag);
        if options.max_buf > 0 {
            tokenizer.set_max_buf(options.max_buf);
        }
        let mut arena = NodeArena::new();
        let doc = arena.alloc(Node::new(NodeKind::Document));
        let context_id = context.map(|ctx| arena.alloc(ctx));
        let root = arena.alloc(Node {
            kind: NodeKind::Element,
            atom: atoms::HTML,
            data: "html".to_string(),
            ..Node::default()
        });
        arena.append_child(doc, root);

        let mut p = TreeBuilder {
            tokenizer,
            arena,
            doc,
            tok: Token::default(),
            has_self_closing_token: false,
            oe: StackOfOpenElements::new(),
            afe: ActiveFormattingElements::new(),
            head: None,
            form: None,
            scripting: options.scripting,
            frameset_ok: options.frameset_ok,
            quirks: false,
            fragment: true,
            context: context_id,
            im: InsertionMode::Initial,
            original_im: None,
            foster_parenting: false,
            template_stack: Vec::new(),
        };
        p.oe.push(root);
        if let Some(ctx) = context_id {
            if p.arena.get(ctx).atom == atoms::TEMPLATE {
                p.template_stack.push(InsertionMode::InTemplate);
            }
        }
        p.reset_insertion_mode();
        if let Some(ctx) = context_id {
            if p.arena.get(ctx).atom == atoms::FORM {
                p.form = Some(ctx);
            }
        }
        Ok(p)
    }

    /// Runs the parse loop until the tokenizer reports end of stream. The
    /// terminal error token is itself dispatched, driving the per-mode
    /// end-of-file handling.
    pub(crate) fn run(&mut self) -> Result<(), Error> {
        loop {
            // CDATA sections are allowed only in foreign content.
            let allow_cdata = self
                .oe
                .top()
                .is_some_and(|id| self.arena.get(id).namespace != Namespace::Html);
            self.tokenizer.set_allow_cdata(allow_cdata);

            let kind = self.tokenizer.next();
            self.tok = self.tokenizer.token();
            if kind == TokenKind::Error {
                let end = self.tokenizer.err().is_some_and(Error::is_end_of_stream);
                if !end {
                    return Err(self
                        .tokenizer
                        .take_err()
                        .expect("an error token implies a stored error"));
                }
                self.parse_current_token();
                return Ok(());
            }
            self.parse_current_token();
        }
    }

    pub(crate) fn into_document(self) -> (NodeArena, NodeId, bool) {
        (self.arena, self.doc, self.quirks)
    }

    /// Detaches and returns the children parsed under the synthetic root.
    pub(crate) fn into_fragment(mut self) -> (NodeArena, Vec<NodeId>) {
        let mut root = None;
        let mut child = self.arena.first_child(self.doc);
        while let Some(id) = child {
            if self.arena.kind(id) == NodeKind::Element && self.arena.get(id).atom == atoms::HTML {
                root = Some(id);
                break;
            }
            child = self.arena.next_sibling(id);
        }
        let mut nodes = Vec::new();
        if let Some(root) = root {
            while let Some(c) = self.arena.first_child(root) {
                self.arena.detach(c);
                nodes.push(c);
            }
        }
        (self.arena, nodes)
    }

    fn parse_current_token(&mut self) {
        if self.tok.kind == TokenKind::SelfClosingTag {
            self.has_self_closing_token = true;
            self.tok.kind = TokenKind::StartTag;
        }

        let mut consumed = false;
        while !consumed {
            consumed = if self.in_foreign_content() {
                self.parse_foreign_content()
            } else {
                self.dispatch(self.im)
            };
        }

        if self.has_self_closing_token {
            // A self-closing flag nothing acknowledged is a parse error;
            // drop it.
            self.has_self_closing_token = false;
        }
    }

    fn dispatch(&mut self, im: InsertionMode) -> bool {
        trace!("dispatch {:?} token {:?}", im, self.tok.kind);
        match im {
            InsertionMode::Initial => self.initial_im(),
            InsertionMode::BeforeHtml => self.before_html_im(),
            InsertionMode::BeforeHead => self.before_head_im(),
            InsertionMode::InHead => self.in_head_im(),
            InsertionMode::InHeadNoscript => self.in_head_noscript_im(),
            InsertionMode::AfterHead => self.after_head_im(),
            InsertionMode::InBody => self.in_body_im(),
            InsertionMode::Text => self.text_im(),
            InsertionMode::InTable => self.in_table_im(),
            InsertionMode::InCaption => self.in_caption_im(),
            InsertionMode::InColumnGroup => self.in_column_group_im(),
            InsertionMode::InTableBody => self.in_table_body_im(),
            InsertionMode::InRow => self.in_row_im(),
            InsertionMode::InCell => self.in_cell_im(),
            InsertionMode::InSelect => self.in_select_im(),
            InsertionMode::InSelectInTable => self.in_select_in_table_im(),
            InsertionMode::InTemplate => self.in_template_im(),
            InsertionMode::AfterBody => self.after_body_im(),
            InsertionMode::InFrameset => self.in_frameset_im(),
            InsertionMode::AfterFrameset => self.after_frameset_im(),
            InsertionMode::AfterAfterBody => self.after_after_body_im(),
            InsertionMode::AfterAfterFrameset => self.after_after_frameset_im(),
        }
    }

    fn set_mode(&mut self, im: InsertionMode) {
        trace!("insertion mode {:?} -> {:?}", self.im, im);
        self.im = im;
    }

    /// The current node, or the document when the stack is empty.
    fn top(&self) -> NodeId {
        self.oe.top().unwrap_or(self.doc)
    }

    fn atom_of(&self, id: NodeId) -> Atom {
        self.arena.get(id).atom
    }

    fn top_atom(&self) -> Atom {
        self.atom_of(self.top())
    }

    /// Whether the stack holds an HTML element with this atom.
    fn oe_contains(&self, atom: Atom) -> bool {
        self.oe.iter().any(|id| {
            let n = self.arena.get(id);
            n.atom == atom && n.namespace == Namespace::Html
        })
    }

    fn is_special_element(&self, id: NodeId) -> bool {
        let n = self.arena.get(id);
        match n.namespace {
            Namespace::Html => SPECIAL_ELEMENTS.contains(&n.atom),
            Namespace::Math => [
                atoms::MI,
                atoms::MO,
                atoms::MN,
                atoms::MS,
                atoms::MTEXT,
                atoms::ANNOTATION_XML,
            ]
            .contains(&n.atom),
            Namespace::Svg => {
                [atoms::FOREIGN_OBJECT, atoms::DESC, atoms::TITLE].contains(&n.atom)
            }
        }
    }

    /// Walks the stack from the current node downward looking for one of
    /// `match_atoms`, stopping early at the scope's stop set.
    fn index_of_element_in_scope(&self, scope: Scope, match_atoms: &[Atom]) -> Option<usize> {
        for i in (0..self.oe.len()).rev() {
            let id = self.oe.get(i);
            let n = self.arena.get(id);
            let tag = n.atom;
            if n.namespace == Namespace::Html {
                if match_atoms.contains(&tag) {
                    return Some(i);
                }
                match scope {
                    Scope::Default => {}
                    Scope::ListItem => {
                        if tag == atoms::OL || tag == atoms::UL {
                            return None;
                        }
                    }
                    Scope::Button => {
                        if tag == atoms::BUTTON {
                            return None;
                        }
                    }
                    Scope::Table => {
                        if [atoms::HTML, atoms::TABLE, atoms::TEMPLATE].contains(&tag) {
                            return None;
                        }
                    }
                    Scope::TableRow => {
                        if [atoms::HTML, atoms::TR, atoms::TEMPLATE].contains(&tag) {
                            return None;
                        }
                    }
                    Scope::TableBody => {
                        if [
                            atoms::HTML,
                            atoms::TBODY,
                            atoms::TFOOT,
                            atoms::THEAD,
                            atoms::TEMPLATE,
                        ]
                        .contains(&tag)
                        {
                            return None;
                        }
                    }
                    Scope::Select => {
                        if tag != atoms::OPTGROUP && tag != atoms::OPTION {
                            return None;
                        }
                    }
                }
                if matches!(scope, Scope::Default | Scope::ListItem | Scope::Button)
                    && [
                        atoms::APPLET,
                        atoms::CAPTION,
                        atoms::HTML,
                        atoms::TABLE,
                        atoms::TD,
                        atoms::TH,
                        atoms::MARQUEE,
                        atoms::OBJECT,
                        atoms::TEMPLATE,
                    ]
                    .contains(&tag)
                {
                    return None;
                }
            } else if matches!(scope, Scope::Default | Scope::ListItem | Scope::Button) {
                // MathML and SVG scope stops always apply to these variants.
                match n.namespace {
                    Namespace::Math => {
                        if [
                            atoms::MI,
                            atoms::MO,
                            atoms::MN,
                            atoms::MS,
                            atoms::MTEXT,
                            atoms::ANNOTATION_XML,
                        ]
                        .contains(&tag)
                        {
                            return None;
                        }
                    }
                    Namespace::Svg => {
                        if [atoms::FOREIGN_OBJECT, atoms::DESC, atoms::TITLE].contains(&tag) {
                            return None;
                        }
                    }
                    Namespace::Html => unreachable!("handled above"),
                }
            }
        }
        None
    }

    fn element_in_scope(&self, scope: Scope, atom: Atom) -> bool {
        self.index_of_element_in_scope(scope, &[atom]).is_some()
    }

    /// Pops elements until one of `match_atoms` (inclusive), if such an
    /// element is in the given scope. Reports whether anything was popped.
    fn pop_until(&mut self, scope: Scope, match_atoms: &[Atom]) -> bool {
        if let Some(i) = self.index_of_element_in_scope(scope, match_atoms) {
            self.oe.truncate(i);
            return true;
        }
        false
    }

    /// Pops back to the nearest table-context boundary for the scope.
    fn clear_stack_to_context(&mut self, scope: Scope) {
        for i in (0..self.oe.len()).rev() {
            let tag = self.atom_of(self.oe.get(i));
            let stop = match scope {
                Scope::Table => [atoms::HTML, atoms::TABLE, atoms::TEMPLATE].contains(&tag),
                Scope::TableRow => [atoms::HTML, atoms::TR, atoms::TEMPLATE].contains(&tag),
                Scope::TableBody => [
                    atoms::HTML,
                    atoms::TBODY,
                    atoms::TFOOT,
                    atoms::THEAD,
                    atoms::TEMPLATE,
                ]
                .contains(&tag),
                _ => unreachable!("clear_stack_to_context is only used with table scopes"),
            };
            if stop {
                self.oe.truncate(i + 1);
                return;
            }
        }
    }

    /// Pops elements whose end tags are implied, except the named ones.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#generate-implied-end-tags
    fn generate_implied_end_tags(&mut self, exceptions: &[&str]) {
        while let Some(top) = self.oe.top() {
            let n = self.arena.get(top);
            let implied = [
                atoms::DD,
                atoms::DT,
                atoms::LI,
                atoms::OPTGROUP,
                atoms::OPTION,
                atoms::P,
                atoms::RB,
                atoms::RP,
                atoms::RT,
                atoms::RTC,
            ]
            .contains(&n.atom);
            if implied && !exceptions.contains(&n.data.as_str()) {
                self.oe.pop();
            } else {
                return;
            }
        }
    }

    /// Appends under the current node, or foster-parents when the flag
    /// demands it; open elements are pushed onto the stack.
    fn add_child(&mut self, n: NodeId) {
        if self.should_foster_parent() {
            self.foster_parent(n);
        } else {
            let top = self.top();
            self.arena.append_child(top, n);
        }
        if self.arena.kind(n) == NodeKind::Element {
            self.oe.push(n);
        }
    }

    /// Whether a node about to be inserted would land in a table-family
    /// element while foster parenting is on.
    fn should_foster_parent(&self) -> bool {
        if !self.foster_parenting {
            return false;
        }
        [
            atoms::TABLE,
            atoms::TBODY,
            atoms::TFOOT,
            atoms::THEAD,
            atoms::TR,
        ]
        .contains(&self.top_atom())
    }

    /// Redirects a node away from a table: into an open template above the
    /// table, or before the table in its parent.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#foster-parent
    fn foster_parent(&mut self, n: NodeId) {
        debug!("foster parenting a {:?} node", self.arena.kind(n));
        let mut table_i = None;
        for i in (0..self.oe.len()).rev() {
            if self.atom_of(self.oe.get(i)) == atoms::TABLE {
                table_i = Some(i);
                break;
            }
        }
        let mut template_i = None;
        for j in (0..self.oe.len()).rev() {
            if self.atom_of(self.oe.get(j)) == atoms::TEMPLATE {
                template_i = Some(j);
                break;
            }
        }

        if let Some(j) = template_i {
            if table_i.map_or(true, |i| j > i) {
                let template = self.oe.get(j);
                self.arena.append_child(template, n);
                return;
            }
        }

        let table = table_i.map(|i| self.oe.get(i));
        let parent = match (table, table_i) {
            (None, _) => self.oe.get(0),
            (Some(t), Some(i)) => match self.arena.parent(t) {
                Some(p) => p,
                // A parentless table: append to the element below it.
                None => self.oe.get(i - 1),
            },
            (Some(_), None) => unreachable!("table implies an index"),
        };

        let prev = match table {
            Some(t) if self.arena.parent(t).is_some() => self.arena.prev_sibling(t),
            _ => self.arena.last_child(parent),
        };
        if let Some(prev) = prev {
            // Adjacent text siblings coalesce.
            if self.arena.kind(prev) == NodeKind::Text && self.arena.kind(n) == NodeKind::Text {
                let text = std::mem::take(&mut self.arena.get_mut(n).data);
                self.arena.get_mut(prev).data.push_str(&text);
                return;
            }
        }

        let before = table.filter(|&t| self.arena.parent(t) == Some(parent));
        self.arena.insert_before(parent, n, before);
    }

    /// Adds text under the current node, coalescing with a trailing text
    /// sibling.
    fn add_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if self.should_foster_parent() {
            let t = self.arena.alloc(Node::text(text));
            self.foster_parent(t);
            return;
        }
        let top = self.top();
        if let Some(last) = self.arena.last_child(top) {
            if self.arena.kind(last) == NodeKind::Text {
                self.arena.get_mut(last).data.push_str(&text);
                return;
            }
        }
        let t = self.arena.alloc(Node::text(text));
        self.add_child(t);
    }

    /// Creates an element for the current token and inserts it.
    fn add_element(&mut self) {
        let n = self.arena.alloc(Node {
            kind: NodeKind::Element,
            atom: self.tok.atom,
            data: self.tok.data.clone(),
            namespace: Namespace::Html,
            attrs: self.tok.attrs.clone(),
            ..Node::default()
        });
        self.add_child(n);
    }

    fn add_comment(&mut self, parent: Option<NodeId>) {
        let n = self.arena.alloc(Node {
            kind: NodeKind::Comment,
            data: std::mem::take(&mut self.tok.data),
            ..Node::default()
        });
        match parent {
            Some(p) => self.arena.append_child(p, n),
            None => {
                // Comments never open elements, so this cannot push.
                if self.should_foster_parent() {
                    self.foster_parent(n);
                } else {
                    let top = self.top();
                    self.arena.append_child(top, n);
                }
            }
        }
    }

    /// Adds the token's element and records it in the active formatting
    /// list, honoring the Noah's Ark clause (at most three identical
    /// entries per marker segment).
    fn add_formatting_element(&mut self) {
        let tag_atom = self.tok.atom;
        let attrs = self.tok.attrs.clone();
        self.add_element();

        let mut identical = 0;
        let mut drop = None;
        for i in (0..self.afe.len()).rev() {
            let id = match self.afe.get(i) {
                AfeEntry::Marker => break,
                AfeEntry::Element(id) => id,
            };
            let n = self.arena.get(id);
            if n.namespace != Namespace::Html || n.atom != tag_atom || n.attrs.len() != attrs.len()
            {
                continue;
            }
            let same = n.attrs.iter().all(|t0| {
                attrs.iter().any(|t1| {
                    t0.key == t1.key && t0.namespace == t1.namespace && t0.value == t1.value
                })
            });
            if !same {
                continue;
            }
            identical += 1;
            if identical >= 3 {
                drop = Some(id);
            }
        }
        if let Some(id) = drop {
            self.afe.remove(id);
        }

        let top = self.top();
        self.afe.push_element(top);
    }

    /// Clones formatting entries back open after they were closed by other
    /// content.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#reconstruct-the-active-formatting-elements
    fn reconstruct_active_formatting_elements(&mut self) {
        let Some(last) = self.afe.last() else {
            return;
        };
        match last {
            AfeEntry::Marker => return,
            AfeEntry::Element(n) => {
                if self.oe.index_of(n).is_some() {
                    return;
                }
            }
        }

        let mut i = self.afe.len() as isize - 1;
        loop {
            let stop = match self.afe.get(i as usize) {
                AfeEntry::Marker => true,
                AfeEntry::Element(n) => self.oe.index_of(n).is_some(),
            };
            if stop {
                break;
            }
            if i == 0 {
                i = -1;
                break;
            }
            i -= 1;
        }

        loop {
            i += 1;
            let orig = match self.afe.get(i as usize) {
                AfeEntry::Element(n) => n,
                AfeEntry::Marker => unreachable!("markers cannot follow the rebuild point"),
            };
            let clone = self.arena.clone_node(orig);
            self.add_child(clone);
            self.afe.set(i as usize, AfeEntry::Element(clone));
            if i as usize == self.afe.len() - 1 {
                break;
            }
        }
    }

    fn acknowledge_self_closing_tag(&mut self) {
        self.has_self_closing_token = false;
    }

    /// Remembers the mode to return to from text mode. Setting it twice is
    /// a bug in the mode handlers.
    fn set_original_im(&mut self) {
        assert!(
            self.original_im.is_none(),
            "bad parser state: original insertion mode was set twice"
        );
        self.original_im = Some(self.im);
    }

    /// Runs a fabricated token through the machine, then restores the real
    /// one. Used to materialize implied tags (`<html>`, `<head>`, ...).
    fn parse_implied_token(&mut self, kind: TokenKind, atom: Atom, data: &str) {
        let real_tok = std::mem::take(&mut self.tok);
        let real_self_closing = self.has_self_closing_token;
        self.tok = Token {
            kind,
            atom,
            data: data.to_string(),
            attrs: Vec::new(),
        };
        self.has_self_closing_token = false;
        self.parse_current_token();
        self.tok = real_tok;
        self.has_self_closing_token = real_self_closing;
    }

    /// Enters text mode for a generic raw-text element; the tokenizer is
    /// already in raw-text mode from seeing the start tag.
    fn parse_generic_raw_text_element(&mut self) {
        self.add_element();
        self.set_original_im();
        self.set_mode(InsertionMode::Text);
    }

    /// Copies the token's attributes onto `dst`, keeping existing ones.
    fn copy_attributes(&mut self, dst: NodeId) {
        if self.tok.attrs.is_empty() {
            return;
        }
        let mut present: FxHashSet<String> = self
            .arena
            .get(dst)
            .attrs
            .iter()
            .map(|a| a.key.clone())
            .collect();
        let attrs = self.tok.attrs.clone();
        for attr in attrs {
            if present.insert(attr.key.clone()) {
                self.arena.get_mut(dst).attrs.push(attr);
            }
        }
    }

    /// Re-derives the insertion mode from the stack, after templates and
    /// table teardowns.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#reset-the-insertion-mode-appropriately
    fn reset_insertion_mode(&mut self) {
        for i in (0..self.oe.len()).rev() {
            let last = i == 0;
            let n = if last && self.context.is_some() {
                self.context.unwrap()
            } else {
                self.oe.get(i)
            };
            let node = self.arena.get(n);
            let tag = node.atom;
            let mode = if tag == atoms::SELECT {
                if !last {
                    let mut mode = InsertionMode::InSelect;
                    for j in (0..i).rev() {
                        let ancestor = self.atom_of(self.oe.get(j));
                        if ancestor == atoms::TEMPLATE {
                            break;
                        }
                        if ancestor == atoms::TABLE {
                            mode = InsertionMode::InSelectInTable;
                            break;
                        }
                    }
                    mode
                } else {
                    InsertionMode::InSelect
                }
            } else if tag == atoms::TD || tag == atoms::TH {
                InsertionMode::InCell
            } else if tag == atoms::TR {
                InsertionMode::InRow
            } else if [atoms::TBODY, atoms::THEAD, atoms::TFOOT].contains(&tag) {
                InsertionMode::InTableBody
            } else if tag == atoms::CAPTION {
                InsertionMode::InCaption
            } else if tag == atoms::COLGROUP {
                InsertionMode::InColumnGroup
            } else if tag == atoms::TABLE {
                InsertionMode::InTable
            } else if tag == atoms::TEMPLATE {
                if node.namespace != Namespace::Html {
                    continue;
                }
                *self
                    .template_stack
                    .last()
                    .expect("a template on the stack implies a template mode")
            } else if tag == atoms::HEAD {
                InsertionMode::InHead
            } else if tag == atoms::BODY {
                InsertionMode::InBody
            } else if tag == atoms::FRAMESET {
                InsertionMode::InFrameset
            } else if tag == atoms::HTML {
                if self.head.is_none() {
                    InsertionMode::BeforeHead
                } else {
                    InsertionMode::AfterHead
                }
            } else if last {
                InsertionMode::InBody
            } else {
                continue;
            };
            self.set_mode(mode);
            return;
        }
    }

    // 8<-------- insertion mode handlers -------->8

    fn initial_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text => {
                self.tok.data = trim_leading_whitespace(&self.tok.data).to_string();
                if self.tok.data.is_empty() {
                    // It was all whitespace.
                    return true;
                }
            }
            TokenKind::Comment => {
                self.add_comment(Some(self.doc));
                return true;
            }
            TokenKind::Doctype => {
                let info = parse_doctype(&self.tok.data);
                let mut attrs = Vec::new();
                if let Some(public) = &info.public_identifier {
                    attrs.push(Attribute::new("public", public.clone()));
                }
                if let Some(system) = &info.system_identifier {
                    attrs.push(Attribute::new("system", system.clone()));
                }
                let n = self.arena.alloc(Node {
                    kind: NodeKind::Doctype,
                    data: info.name.clone(),
                    attrs,
                    ..Node::default()
                });
                let doc = self.doc;
                self.arena.append_child(doc, n);
                self.quirks = info.quirks;
                self.set_mode(InsertionMode::BeforeHtml);
                return true;
            }
            _ => {}
        }
        self.quirks = true;
        self.set_mode(InsertionMode::BeforeHtml);
        false
    }

    fn before_html_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            TokenKind::Text => {
                self.tok.data = trim_leading_whitespace(&self.tok.data).to_string();
                if self.tok.data.is_empty() {
                    return true;
                }
            }
            TokenKind::StartTag => {
                if self.tok.atom == atoms::HTML {
                    self.add_element();
                    self.set_mode(InsertionMode::BeforeHead);
                    return true;
                }
            }
            TokenKind::EndTag => {
                if ![atoms::HEAD, atoms::BODY, atoms::HTML, atoms::BR].contains(&self.tok.atom) {
                    // Ignore the token.
                    return true;
                }
            }
            TokenKind::Comment => {
                self.add_comment(Some(self.doc));
                return true;
            }
            _ => {}
        }
        self.parse_implied_token(TokenKind::StartTag, atoms::HTML, "html");
        false
    }

    fn before_head_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text => {
                self.tok.data = trim_leading_whitespace(&self.tok.data).to_string();
                if self.tok.data.is_empty() {
                    return true;
                }
            }
            TokenKind::StartTag => {
                if self.tok.atom == atoms::HEAD {
                    self.add_element();
                    self.head = Some(self.top());
                    self.set_mode(InsertionMode::InHead);
                    return true;
                }
                if self.tok.atom == atoms::HTML {
                    return self.in_body_im();
                }
            }
            TokenKind::EndTag => {
                if ![atoms::HEAD, atoms::BODY, atoms::HTML, atoms::BR].contains(&self.tok.atom) {
                    // Ignore the token.
                    return true;
                }
            }
            TokenKind::Comment => {
                self.add_comment(None);
                return true;
            }
            TokenKind::Doctype => {
                return true;
            }
            _ => {}
        }
        self.parse_implied_token(TokenKind::StartTag, atoms::HEAD, "head");
        false
    }

    fn in_head_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text => {
                let rest = trim_leading_whitespace(&self.tok.data).to_string();
                if rest.len() < self.tok.data.len() {
                    // The leading whitespace joins the current node.
                    let ws_len = self.tok.data.len() - rest.len();
                    let ws = self.tok.data[..ws_len].to_string();
                    self.add_text(ws);
                    if rest.is_empty() {
                        return true;
                    }
                    self.tok.data = rest;
                }
            }
            TokenKind::Comment => {
                self.add_comment(None);
                return true;
            }
            TokenKind::StartTag => match self.tok.atom {
                a if a == atoms::HTML => return self.in_body_im(),
                a if [
                    atoms::BASE,
                    atoms::BASEFONT,
                    atoms::BGSOUND,
                    atoms::LINK,
                    atoms::META,
                ]
                .contains(&a) =>
                {
                    self.add_element();
                    self.oe.pop();
                    self.acknowledge_self_closing_tag();
                    return true;
                }
                a if a == atoms::NOSCRIPT => {
                    if self.scripting {
                        self.parse_generic_raw_text_element();
                        return true;
                    }
                    self.add_element();
                    self.set_mode(InsertionMode::InHeadNoscript);
                    // The content of a scripting-disabled noscript is real
                    // markup, not raw text.
                    self.tokenizer.next_is_not_raw_text();
                    return true;
                }
                a if a == atoms::SCRIPT || a == atoms::TITLE => {
                    self.add_element();
                    self.set_original_im();
                    self.set_mode(InsertionMode::Text);
                    return true;
                }
                a if a == atoms::STYLE || a == atoms::NOFRAMES => {
                    self.parse_generic_raw_text_element();
                    return true;
                }
                a if a == atoms::HEAD => {
                    // Ignore the token.
                    return true;
                }
                a if a == atoms::TEMPLATE => {
                    self.add_element();
                    self.afe.insert_marker();
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::InTemplate);
                    self.template_stack.push(InsertionMode::InTemplate);
                    return true;
                }
                _ => {}
            },
            TokenKind::EndTag => match self.tok.atom {
                a if a == atoms::HEAD => {
                    self.oe.pop();
                    self.set_mode(InsertionMode::AfterHead);
                    return true;
                }
                a if [atoms::BODY, atoms::HTML, atoms::BR].contains(&a) => {
                    self.parse_implied_token(TokenKind::EndTag, atoms::HEAD, "head");
                    return false;
                }
                a if a == atoms::TEMPLATE => {
                    if !self.oe_contains(atoms::TEMPLATE) {
                        return true;
                    }
                    self.generate_implied_end_tags(&[]);
                    for i in (0..self.oe.len()).rev() {
                        let n = self.arena.get(self.oe.get(i));
                        if n.namespace == Namespace::Html && n.atom == atoms::TEMPLATE {
                            self.oe.truncate(i);
                            break;
                        }
                    }
                    self.afe.clear_up_to_last_marker();
                    self.template_stack.pop();
                    self.reset_insertion_mode();
                    return true;
                }
                _ => {
                    // Ignore the token.
                    return true;
                }
            },
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            _ => {}
        }
        self.parse_implied_token(TokenKind::EndTag, atoms::HEAD, "head");
        false
    }

    fn in_head_noscript_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            TokenKind::StartTag => match self.tok.atom {
                a if a == atoms::HTML => return self.in_body_im(),
                a if [
                    atoms::BASEFONT,
                    atoms::BGSOUND,
                    atoms::LINK,
                    atoms::META,
                    atoms::NOFRAMES,
                    atoms::STYLE,
                ]
                .contains(&a) =>
                {
                    return self.in_head_im();
                }
                a if a == atoms::HEAD || a == atoms::NOSCRIPT => {
                    // Ignore the token.
                    return true;
                }
                _ => {}
            },
            TokenKind::EndTag => {
                if self.tok.atom != atoms::NOSCRIPT && self.tok.atom != atoms::BR {
                    // Ignore the token.
                    return true;
                }
            }
            TokenKind::Text => {
                if trim_leading_whitespace(&self.tok.data).is_empty() {
                    // It was all whitespace.
                    return self.in_head_im();
                }
            }
            TokenKind::Comment => {
                return self.in_head_im();
            }
            _ => {}
        }
        self.oe.pop();
        assert_eq!(
            self.top_atom(),
            atoms::HEAD,
            "bad parser state: the new current node must be a head element"
        );
        self.set_mode(InsertionMode::InHead);
        self.tok.atom == atoms::NOSCRIPT
    }

    fn after_head_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text => {
                let rest = trim_leading_whitespace(&self.tok.data).to_string();
                if rest.len() < self.tok.data.len() {
                    let ws_len = self.tok.data.len() - rest.len();
                    let ws = self.tok.data[..ws_len].to_string();
                    self.add_text(ws);
                    if rest.is_empty() {
                        return true;
                    }
                    self.tok.data = rest;
                }
            }
            TokenKind::StartTag => match self.tok.atom {
                a if a == atoms::HTML => return self.in_body_im(),
                a if a == atoms::BODY => {
                    self.add_element();
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::InBody);
                    return true;
                }
                a if a == atoms::FRAMESET => {
                    self.add_element();
                    self.set_mode(InsertionMode::InFrameset);
                    return true;
                }
                a if [
                    atoms::BASE,
                    atoms::BASEFONT,
                    atoms::BGSOUND,
                    atoms::LINK,
                    atoms::META,
                    atoms::NOFRAMES,
                    atoms::SCRIPT,
                    atoms::STYLE,
                    atoms::TEMPLATE,
                    atoms::TITLE,
                ]
                .contains(&a) =>
                {
                    let head = self.head.expect("head must exist after the in-head mode");
                    self.oe.push(head);
                    let consumed = self.in_head_im();
                    self.oe.remove(head);
                    return consumed;
                }
                a if a == atoms::HEAD => {
                    // Ignore the token.
                    return true;
                }
                _ => {}
            },
            TokenKind::EndTag => match self.tok.atom {
                a if [atoms::BODY, atoms::HTML, atoms::BR].contains(&a) => {
                    // Drop down to fabricating the implied <body>.
                }
                a if a == atoms::TEMPLATE => return self.in_head_im(),
                _ => {
                    // Ignore the token.
                    return true;
                }
            },
            TokenKind::Comment => {
                self.add_comment(None);
                return true;
            }
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            _ => {}
        }
        self.parse_implied_token(TokenKind::StartTag, atoms::BODY, "body");
        self.frameset_ok = true;
        false
    }

    fn in_body_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text => {
                let mut d = std::mem::take(&mut self.tok.data);
                let top = self.top();
                if (self.atom_of(top) == atoms::PRE || self.atom_of(top) == atoms::LISTING)
                    && self.arena.first_child(top).is_none()
                {
                    // Ignore a newline at the start of the block.
                    if d.starts_with('\r') {
                        d.remove(0);
                    }
                    if d.starts_with('\n') {
                        d.remove(0);
                    }
                }
                d = d.replace('\0', "");
                if d.is_empty() {
                    return true;
                }
                self.reconstruct_active_formatting_elements();
                let has_non_ws = !trim_leading_whitespace(&d).is_empty();
                self.add_text(d);
                if self.frameset_ok && has_non_ws {
                    // Non-whitespace content commits the document to body
                    // layout.
                    self.frameset_ok = false;
                }
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::HTML {
                    if self.oe_contains(atoms::TEMPLATE) {
                        return true;
                    }
                    // New attributes land on the root; existing ones win.
                    let root = self.oe.get(0);
                    self.copy_attributes(root);
                } else if [
                    atoms::BASE,
                    atoms::BASEFONT,
                    atoms::BGSOUND,
                    atoms::LINK,
                    atoms::META,
                    atoms::NOFRAMES,
                    atoms::SCRIPT,
                    atoms::STYLE,
                    atoms::TEMPLATE,
                    atoms::TITLE,
                ]
                .contains(&a)
                {
                    return self.in_head_im();
                } else if a == atoms::BODY {
                    if self.oe_contains(atoms::TEMPLATE) {
                        return true;
                    }
                    if self.oe.len() >= 2 {
                        let body = self.oe.get(1);
                        if self.arena.kind(body) == NodeKind::Element
                            && self.atom_of(body) == atoms::BODY
                        {
                            self.frameset_ok = false;
                            self.copy_attributes(body);
                        }
                    }
                } else if a == atoms::FRAMESET {
                    if !self.frameset_ok
                        || self.oe.len() < 2
                        || self.atom_of(self.oe.get(1)) != atoms::BODY
                    {
                        // Ignore the token.
                        return true;
                    }
                    let body = self.oe.get(1);
                    if self.arena.parent(body).is_some() {
                        self.arena.detach(body);
                    }
                    self.oe.truncate(1);
                    self.add_element();
                    self.set_mode(InsertionMode::InFrameset);
                    return true;
                } else if [
                    atoms::ADDRESS,
                    atoms::ARTICLE,
                    atoms::ASIDE,
                    atoms::BLOCKQUOTE,
                    atoms::CENTER,
                    atoms::DETAILS,
                    atoms::DIALOG,
                    atoms::DIR,
                    atoms::DIV,
                    atoms::DL,
                    atoms::FIELDSET,
                    atoms::FIGCAPTION,
                    atoms::FIGURE,
                    atoms::FOOTER,
                    atoms::HEADER,
                    atoms::HGROUP,
                    atoms::MAIN,
                    atoms::MENU,
                    atoms::NAV,
                    atoms::OL,
                    atoms::P,
                    atoms::SECTION,
                    atoms::SUMMARY,
                    atoms::UL,
                ]
                .contains(&a)
                {
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.add_element();
                } else if [
                    atoms::H1,
                    atoms::H2,
                    atoms::H3,
                    atoms::H4,
                    atoms::H5,
                    atoms::H6,
                ]
                .contains(&a)
                {
                    self.pop_until(Scope::Button, &[atoms::P]);
                    if [
                        atoms::H1,
                        atoms::H2,
                        atoms::H3,
                        atoms::H4,
                        atoms::H5,
                        atoms::H6,
                    ]
                    .contains(&self.top_atom())
                    {
                        self.oe.pop();
                    }
                    self.add_element();
                } else if a == atoms::PRE || a == atoms::LISTING {
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.add_element();
                    // The leading newline, if any, is handled by the text
                    // case.
                    self.frameset_ok = false;
                } else if a == atoms::FORM {
                    if self.form.is_some() && !self.oe_contains(atoms::TEMPLATE) {
                        // Ignore the token.
                        return true;
                    }
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.add_element();
                    if !self.oe_contains(atoms::TEMPLATE) {
                        self.form = Some(self.top());
                    }
                } else if a == atoms::LI {
                    self.frameset_ok = false;
                    for i in (0..self.oe.len()).rev() {
                        let node = self.oe.get(i);
                        let tag = self.atom_of(node);
                        if tag == atoms::LI {
                            self.oe.truncate(i);
                        } else if [atoms::ADDRESS, atoms::DIV, atoms::P].contains(&tag)
                            || !self.is_special_element(node)
                        {
                            continue;
                        }
                        break;
                    }
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.add_element();
                } else if a == atoms::DD || a == atoms::DT {
                    self.frameset_ok = false;
                    for i in (0..self.oe.len()).rev() {
                        let node = self.oe.get(i);
                        let tag = self.atom_of(node);
                        if tag == atoms::DD || tag == atoms::DT {
                            self.oe.truncate(i);
                        } else if [atoms::ADDRESS, atoms::DIV, atoms::P].contains(&tag)
                            || !self.is_special_element(node)
                        {
                            continue;
                        }
                        break;
                    }
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.add_element();
                } else if a == atoms::PLAINTEXT {
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.add_element();
                } else if a == atoms::BUTTON {
                    self.pop_until(Scope::Default, &[atoms::BUTTON]);
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                    self.frameset_ok = false;
                } else if a == atoms::A {
                    let mut existing = None;
                    for i in (0..self.afe.len()).rev() {
                        match self.afe.get(i) {
                            AfeEntry::Marker => break,
                            AfeEntry::Element(n) => {
                                if self.atom_of(n) == atoms::A {
                                    existing = Some(n);
                                    break;
                                }
                            }
                        }
                    }
                    if let Some(n) = existing {
                        // A previous in-scope <a> closes through the
                        // adoption agency before the new one opens.
                        self.in_body_end_tag_formatting(atoms::A, "a");
                        self.oe.remove(n);
                        self.afe.remove(n);
                    }
                    self.reconstruct_active_formatting_elements();
                    self.add_formatting_element();
                } else if [
                    atoms::B,
                    atoms::BIG,
                    atoms::CODE,
                    atoms::EM,
                    atoms::FONT,
                    atoms::I,
                    atoms::S,
                    atoms::SMALL,
                    atoms::STRIKE,
                    atoms::STRONG,
                    atoms::TT,
                    atoms::U,
                ]
                .contains(&a)
                {
                    self.reconstruct_active_formatting_elements();
                    self.add_formatting_element();
                } else if a == atoms::NOBR {
                    self.reconstruct_active_formatting_elements();
                    if self.element_in_scope(Scope::Default, atoms::NOBR) {
                        self.in_body_end_tag_formatting(atoms::NOBR, "nobr");
                        self.reconstruct_active_formatting_elements();
                    }
                    self.add_formatting_element();
                } else if [atoms::APPLET, atoms::MARQUEE, atoms::OBJECT].contains(&a) {
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                    self.afe.insert_marker();
                    self.frameset_ok = false;
                } else if a == atoms::TABLE {
                    if !self.quirks {
                        // In quirks mode the table nests inside an open <p>.
                        self.pop_until(Scope::Button, &[atoms::P]);
                    }
                    self.add_element();
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::InTable);
                    return true;
                } else if [
                    atoms::AREA,
                    atoms::BR,
                    atoms::EMBED,
                    atoms::IMG,
                    atoms::INPUT,
                    atoms::KEYGEN,
                    atoms::WBR,
                ]
                .contains(&a)
                {
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                    self.oe.pop();
                    self.acknowledge_self_closing_tag();
                    if a == atoms::INPUT
                        && self.tok.attrs.iter().any(|t| {
                            t.key == "type" && t.value.eq_ignore_ascii_case("hidden")
                        })
                    {
                        // A hidden input keeps frameset_ok.
                        return true;
                    }
                    self.frameset_ok = false;
                } else if [atoms::PARAM, atoms::SOURCE, atoms::TRACK].contains(&a) {
                    self.add_element();
                    self.oe.pop();
                    self.acknowledge_self_closing_tag();
                } else if a == atoms::HR {
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.add_element();
                    self.oe.pop();
                    self.acknowledge_self_closing_tag();
                    self.frameset_ok = false;
                } else if a == atoms::IMAGE {
                    // "Don't ask." (the token is reprocessed as <img>)
                    self.tok.atom = atoms::IMG;
                    self.tok.data = "img".to_string();
                    return false;
                } else if a == atoms::TEXTAREA {
                    self.add_element();
                    self.set_original_im();
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::Text);
                } else if a == atoms::XMP {
                    self.pop_until(Scope::Button, &[atoms::P]);
                    self.reconstruct_active_formatting_elements();
                    self.frameset_ok = false;
                    self.parse_generic_raw_text_element();
                } else if a == atoms::IFRAME {
                    self.frameset_ok = false;
                    self.parse_generic_raw_text_element();
                } else if a == atoms::NOEMBED {
                    self.parse_generic_raw_text_element();
                } else if a == atoms::NOSCRIPT {
                    if self.scripting {
                        self.parse_generic_raw_text_element();
                        return true;
                    }
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                    // With scripting off the noscript content is markup.
                    self.tokenizer.next_is_not_raw_text();
                } else if a == atoms::SELECT {
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::InSelect);
                    return true;
                } else if a == atoms::OPTGROUP || a == atoms::OPTION {
                    if self.top_atom() == atoms::OPTION {
                        self.oe.pop();
                    }
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                } else if a == atoms::RB || a == atoms::RTC {
                    if self.element_in_scope(Scope::Default, atoms::RUBY) {
                        self.generate_implied_end_tags(&[]);
                    }
                    self.add_element();
                } else if a == atoms::RP || a == atoms::RT {
                    if self.element_in_scope(Scope::Default, atoms::RUBY) {
                        self.generate_implied_end_tags(&["rtc"]);
                    }
                    self.add_element();
                } else if a == atoms::MATH || a == atoms::SVG {
                    self.reconstruct_active_formatting_elements();
                    if a == atoms::MATH {
                        adjust_attribute_names(&mut self.tok.attrs, MATHML_ATTRIBUTE_ADJUSTMENTS);
                    } else {
                        adjust_attribute_names(&mut self.tok.attrs, SVG_ATTRIBUTE_ADJUSTMENTS);
                    }
                    adjust_foreign_attributes(&mut self.tok.attrs);
                    self.add_element();
                    let ns = if a == atoms::MATH {
                        Namespace::Math
                    } else {
                        Namespace::Svg
                    };
                    let top = self.top();
                    self.arena.get_mut(top).namespace = ns;
                    if self.has_self_closing_token {
                        self.oe.pop();
                        self.acknowledge_self_closing_tag();
                    }
                    return true;
                } else if [
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::FRAME,
                    atoms::HEAD,
                    atoms::TBODY,
                    atoms::TD,
                    atoms::TFOOT,
                    atoms::TH,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    // Ignore the token.
                } else {
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if a == atoms::BODY {
                    if self.element_in_scope(Scope::Default, atoms::BODY) {
                        self.set_mode(InsertionMode::AfterBody);
                    }
                } else if a == atoms::HTML {
                    if self.element_in_scope(Scope::Default, atoms::BODY) {
                        self.parse_implied_token(TokenKind::EndTag, atoms::BODY, "body");
                        return false;
                    }
                    return true;
                } else if [
                    atoms::ADDRESS,
                    atoms::ARTICLE,
                    atoms::ASIDE,
                    atoms::BLOCKQUOTE,
                    atoms::BUTTON,
                    atoms::CENTER,
                    atoms::DETAILS,
                    atoms::DIALOG,
                    atoms::DIR,
                    atoms::DIV,
                    atoms::DL,
                    atoms::FIELDSET,
                    atoms::FIGCAPTION,
                    atoms::FIGURE,
                    atoms::FOOTER,
                    atoms::HEADER,
                    atoms::HGROUP,
                    atoms::LISTING,
                    atoms::MAIN,
                    atoms::MENU,
                    atoms::NAV,
                    atoms::OL,
                    atoms::PRE,
                    atoms::SECTION,
                    atoms::SUMMARY,
                    atoms::UL,
                ]
                .contains(&a)
                {
                    self.pop_until(Scope::Default, &[a]);
                } else if a == atoms::FORM {
                    if self.oe_contains(atoms::TEMPLATE) {
                        let Some(i) =
                            self.index_of_element_in_scope(Scope::Default, &[atoms::FORM])
                        else {
                            // Ignore the token.
                            return true;
                        };
                        self.generate_implied_end_tags(&[]);
                        if self.atom_of(self.oe.get(i)) != atoms::FORM {
                            // Ignore the token.
                            return true;
                        }
                        self.pop_until(Scope::Default, &[atoms::FORM]);
                    } else {
                        let node = self.form.take();
                        let i = self.index_of_element_in_scope(Scope::Default, &[atoms::FORM]);
                        let (node, i) = match (node, i) {
                            (Some(node), Some(i)) if self.oe.get(i) == node => (node, i),
                            _ => {
                                // Ignore the token.
                                return true;
                            }
                        };
                        let _ = i;
                        self.generate_implied_end_tags(&[]);
                        self.oe.remove(node);
                    }
                } else if a == atoms::P {
                    if !self.element_in_scope(Scope::Button, atoms::P) {
                        self.parse_implied_token(TokenKind::StartTag, atoms::P, "p");
                    }
                    self.pop_until(Scope::Button, &[atoms::P]);
                } else if a == atoms::LI {
                    self.pop_until(Scope::ListItem, &[atoms::LI]);
                } else if a == atoms::DD || a == atoms::DT {
                    self.pop_until(Scope::Default, &[a]);
                } else if [
                    atoms::H1,
                    atoms::H2,
                    atoms::H3,
                    atoms::H4,
                    atoms::H5,
                    atoms::H6,
                ]
                .contains(&a)
                {
                    self.pop_until(
                        Scope::Default,
                        &[
                            atoms::H1,
                            atoms::H2,
                            atoms::H3,
                            atoms::H4,
                            atoms::H5,
                            atoms::H6,
                        ],
                    );
                } else if FORMATTING_END_TAGS.contains(&a) {
                    let name = self.tok.data.clone();
                    self.in_body_end_tag_formatting(a, &name);
                } else if [atoms::APPLET, atoms::MARQUEE, atoms::OBJECT].contains(&a) {
                    if self.pop_until(Scope::Default, &[a]) {
                        self.afe.clear_up_to_last_marker();
                    }
                } else if a == atoms::BR {
                    // </br> reprocesses as a start tag.
                    self.tok.kind = TokenKind::StartTag;
                    return false;
                } else if a == atoms::TEMPLATE {
                    return self.in_head_im();
                } else {
                    let name = self.tok.data.clone();
                    self.in_body_end_tag_other(a, &name);
                }
            }
            TokenKind::Comment => {
                self.add_comment(None);
            }
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            TokenKind::Error => {
                if !self.template_stack.is_empty() {
                    self.set_mode(InsertionMode::InTemplate);
                    return false;
                }
                return true;
            }
            _ => {}
        }
        true
    }

    /// The adoption agency algorithm, repairing misnested formatting
    /// elements.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#adoption-agency-algorithm
    fn in_body_end_tag_formatting(&mut self, tag_atom: Atom, tag_name: &str) {
        debug!("adoption agency for </{tag_name}>");

        // Steps 1-2: the no-repair fast path.
        if let Some(current) = self.oe.top() {
            if self.arena.get(current).data == tag_name && self.afe.index_of(current).is_none() {
                self.oe.pop();
                return;
            }
        }

        // Steps 3-5: the outer loop runs at most eight times.
        for _ in 0..8 {
            // Step 6: find the formatting element, stopping at a marker.
            let mut formatting_element = None;
            for j in (0..self.afe.len()).rev() {
                match self.afe.get(j) {
                    AfeEntry::Marker => break,
                    AfeEntry::Element(n) => {
                        if self.atom_of(n) == tag_atom {
                            formatting_element = Some(n);
                            break;
                        }
                    }
                }
            }
            let Some(formatting_element) = formatting_element else {
                self.in_body_end_tag_other(tag_atom, tag_name);
                return;
            };

            // Step 7: gone from the open stack means a stale list entry.
            let Some(fe_index) = self.oe.index_of(formatting_element) else {
                self.afe.remove(formatting_element);
                return;
            };
            // Step 8: out of scope, ignore the tag.
            if self
                .index_of_element_in_scope(Scope::Default, &[tag_atom])
                .is_none()
            {
                return;
            }

            // Steps 10-11: the furthest block is the nearest special
            // element deeper than the formatting element.
            let mut furthest_block = None;
            for i in fe_index..self.oe.len() {
                let e = self.oe.get(i);
                if self.is_special_element(e) {
                    furthest_block = Some(e);
                    break;
                }
            }
            let Some(furthest_block) = furthest_block else {
                loop {
                    let e = self
                        .oe
                        .pop()
                        .expect("the formatting element is on the stack");
                    if e == formatting_element {
                        self.afe.remove(e);
                        break;
                    }
                }
                return;
            };

            // Steps 12-13: common ancestor and list bookmark.
            let common_ancestor = self.oe.get(fe_index - 1);
            let mut bookmark = self
                .afe
                .index_of(formatting_element)
                .expect("the formatting element is in the list")
                as isize;

            // Step 14: the inner loop walks upward from the furthest
            // block, cloning intermediate formatting ancestors.
            let mut last_node = furthest_block;
            let mut node = furthest_block;
            let mut x = self
                .oe
                .index_of(node)
                .expect("the furthest block is on the stack") as isize;
            let mut inner_count = 0;
            loop {
                inner_count += 1;
                x -= 1;
                node = self.oe.get(x as usize);
                if node == formatting_element {
                    break;
                }
                if let Some(ni) = self.afe.index_of(node) {
                    if inner_count > 3 {
                        self.afe.remove(node);
                        // The bookmark trails any removal beneath it.
                        if (ni as isize) <= bookmark {
                            bookmark -= 1;
                        }
                        continue;
                    }
                } else {
                    self.oe.remove(node);
                    continue;
                }
                let clone = self.arena.clone_node(node);
                let afe_i = self.afe.index_of(node).expect("checked above");
                self.afe.set(afe_i, AfeEntry::Element(clone));
                let oe_i = self.oe.index_of(node).expect("node is on the stack");
                self.oe.set(oe_i, clone);
                node = clone;
                if last_node == furthest_block {
                    bookmark = self.afe.index_of(node).expect("clone was just inserted") as isize
                        + 1;
                }
                if self.arena.parent(last_node).is_some() {
                    self.arena.detach(last_node);
                }
                self.arena.append_child(node, last_node);
                last_node = node;
            }

            // Step 15: hang the chain under the common ancestor, foster
            // parenting around table parts.
            if self.arena.parent(last_node).is_some() {
                self.arena.detach(last_node);
            }
            if [
                atoms::TABLE,
                atoms::TBODY,
                atoms::TFOOT,
                atoms::THEAD,
                atoms::TR,
            ]
            .contains(&self.atom_of(common_ancestor))
            {
                self.foster_parent(last_node);
            } else {
                self.arena.append_child(common_ancestor, last_node);
            }

            // Steps 16-18: move the furthest block's children into a fresh
            // clone of the formatting element.
            let clone = self.arena.clone_node(formatting_element);
            self.arena.reparent_children(clone, furthest_block);
            self.arena.append_child(furthest_block, clone);

            // Step 19: swap the clone into the list at the bookmark.
            if let Some(old_loc) = self.afe.index_of(formatting_element) {
                if (old_loc as isize) < bookmark {
                    bookmark -= 1;
                }
            }
            self.afe.remove(formatting_element);
            self.afe.insert(bookmark as usize, AfeEntry::Element(clone));

            // Step 20: and into the stack, right above the furthest block.
            self.oe.remove(formatting_element);
            let fb_i = self
                .oe
                .index_of(furthest_block)
                .expect("the furthest block is on the stack");
            self.oe.insert(fb_i + 1, clone);
        }
    }

    /// The "any other end tag" rule.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inbody
    fn in_body_end_tag_other(&mut self, tag_atom: Atom, tag_name: &str) {
        for i in (0..self.oe.len()).rev() {
            let id = self.oe.get(i);
            let node = self.arena.get(id);
            // Unknown tags carry a zero atom and compare by name.
            if node.atom == tag_atom && (!tag_atom.is_none() || node.data == tag_name) {
                self.oe.truncate(i);
                break;
            }
            if self.is_special_element(id) {
                break;
            }
        }
    }

    fn text_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Error => {
                self.oe.pop();
            }
            TokenKind::Text => {
                let mut d = std::mem::take(&mut self.tok.data);
                let top = self.top();
                if self.atom_of(top) == atoms::TEXTAREA && self.arena.first_child(top).is_none() {
                    // Ignore a newline at the start of a <textarea> block.
                    if d.starts_with('\r') {
                        d.remove(0);
                    }
                    if d.starts_with('\n') {
                        d.remove(0);
                    }
                }
                if d.is_empty() {
                    return true;
                }
                self.add_text(d);
                return true;
            }
            TokenKind::EndTag => {
                self.oe.pop();
            }
            _ => {}
        }
        let original = self
            .original_im
            .take()
            .expect("text mode requires a saved insertion mode");
        self.set_mode(original);
        self.tok.kind == TokenKind::EndTag
    }

    fn in_table_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Error => {
                return self.in_body_im();
            }
            TokenKind::Text => {
                self.tok.data = self.tok.data.replace('\0', "");
                if [
                    atoms::TABLE,
                    atoms::TBODY,
                    atoms::TFOOT,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&self.top_atom())
                    && trim_leading_whitespace(&self.tok.data).is_empty()
                {
                    let d = std::mem::take(&mut self.tok.data);
                    self.add_text(d);
                    return true;
                }
            }
            TokenKind::Comment => {
                self.add_comment(None);
                return true;
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::CAPTION {
                    self.clear_stack_to_context(Scope::Table);
                    self.afe.insert_marker();
                    self.add_element();
                    self.set_mode(InsertionMode::InCaption);
                    return true;
                } else if a == atoms::COLGROUP {
                    self.clear_stack_to_context(Scope::Table);
                    self.add_element();
                    self.set_mode(InsertionMode::InColumnGroup);
                    return true;
                } else if a == atoms::COL {
                    self.parse_implied_token(TokenKind::StartTag, atoms::COLGROUP, "colgroup");
                    return false;
                } else if [atoms::TBODY, atoms::TFOOT, atoms::THEAD].contains(&a) {
                    self.clear_stack_to_context(Scope::Table);
                    self.add_element();
                    self.set_mode(InsertionMode::InTableBody);
                    return true;
                } else if [atoms::TD, atoms::TH, atoms::TR].contains(&a) {
                    self.parse_implied_token(TokenKind::StartTag, atoms::TBODY, "tbody");
                    return false;
                } else if a == atoms::TABLE {
                    if self.pop_until(Scope::Table, &[atoms::TABLE]) {
                        self.reset_insertion_mode();
                        return false;
                    }
                    // Ignore the token.
                    return true;
                } else if [atoms::STYLE, atoms::SCRIPT, atoms::TEMPLATE].contains(&a) {
                    return self.in_head_im();
                } else if a == atoms::INPUT {
                    if self.tok.attrs.iter().any(|t| {
                        t.key == "type" && t.value.eq_ignore_ascii_case("hidden")
                    }) {
                        self.add_element();
                        self.oe.pop();
                        return true;
                    }
                    // Otherwise fall through to the foster-parenting path.
                } else if a == atoms::FORM {
                    if self.oe_contains(atoms::TEMPLATE) || self.form.is_some() {
                        // Ignore the token.
                        return true;
                    }
                    self.add_element();
                    self.form = self.oe.pop();
                    return true;
                } else if a == atoms::SELECT {
                    self.reconstruct_active_formatting_elements();
                    if [
                        atoms::TABLE,
                        atoms::TBODY,
                        atoms::TFOOT,
                        atoms::THEAD,
                        atoms::TR,
                    ]
                    .contains(&self.top_atom())
                    {
                        self.foster_parenting = true;
                    }
                    self.add_element();
                    self.foster_parenting = false;
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::InSelectInTable);
                    return true;
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if a == atoms::TABLE {
                    if self.pop_until(Scope::Table, &[atoms::TABLE]) {
                        self.reset_insertion_mode();
                    }
                    return true;
                } else if [
                    atoms::BODY,
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::HTML,
                    atoms::TBODY,
                    atoms::TD,
                    atoms::TFOOT,
                    atoms::TH,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    // Ignore the token.
                    return true;
                } else if a == atoms::TEMPLATE {
                    return self.in_head_im();
                }
            }
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            _ => {}
        }

        // Anything else is foster-parented through the in-body rules.
        self.foster_parenting = true;
        let consumed = self.in_body_im();
        self.foster_parenting = false;
        consumed
    }

    fn in_caption_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if [
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::TBODY,
                    atoms::TD,
                    atoms::TFOOT,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    if !self.pop_until(Scope::Table, &[atoms::CAPTION]) {
                        // Ignore the token.
                        return true;
                    }
                    self.afe.clear_up_to_last_marker();
                    self.set_mode(InsertionMode::InTable);
                    return false;
                } else if a == atoms::SELECT {
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::InSelectInTable);
                    return true;
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if a == atoms::CAPTION {
                    if self.pop_until(Scope::Table, &[atoms::CAPTION]) {
                        self.afe.clear_up_to_last_marker();
                        self.set_mode(InsertionMode::InTable);
                    }
                    return true;
                } else if a == atoms::TABLE {
                    if !self.pop_until(Scope::Table, &[atoms::CAPTION]) {
                        // Ignore the token.
                        return true;
                    }
                    self.afe.clear_up_to_last_marker();
                    self.set_mode(InsertionMode::InTable);
                    return false;
                } else if [
                    atoms::BODY,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::HTML,
                    atoms::TBODY,
                    atoms::TD,
                    atoms::TFOOT,
                    atoms::TH,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    // Ignore the token.
                    return true;
                }
            }
            _ => {}
        }
        self.in_body_im()
    }

    fn in_column_group_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text => {
                let rest = trim_leading_whitespace(&self.tok.data).to_string();
                if rest.len() < self.tok.data.len() {
                    let ws_len = self.tok.data.len() - rest.len();
                    let ws = self.tok.data[..ws_len].to_string();
                    self.add_text(ws);
                    if rest.is_empty() {
                        return true;
                    }
                    self.tok.data = rest;
                }
            }
            TokenKind::Comment => {
                self.add_comment(None);
                return true;
            }
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::HTML {
                    return self.in_body_im();
                } else if a == atoms::COL {
                    self.add_element();
                    self.oe.pop();
                    self.acknowledge_self_closing_tag();
                    return true;
                } else if a == atoms::TEMPLATE {
                    return self.in_head_im();
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if a == atoms::COLGROUP {
                    if self.top_atom() == atoms::COLGROUP {
                        self.oe.pop();
                        self.set_mode(InsertionMode::InTable);
                    }
                    return true;
                } else if a == atoms::COL {
                    // Ignore the token.
                    return true;
                } else if a == atoms::TEMPLATE {
                    return self.in_head_im();
                }
            }
            TokenKind::Error => {
                return self.in_body_im();
            }
            _ => {}
        }
        if self.top_atom() != atoms::COLGROUP {
            return true;
        }
        self.oe.pop();
        self.set_mode(InsertionMode::InTable);
        false
    }

    fn in_table_body_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::TR {
                    self.clear_stack_to_context(Scope::TableBody);
                    self.add_element();
                    self.set_mode(InsertionMode::InRow);
                    return true;
                } else if a == atoms::TD || a == atoms::TH {
                    self.parse_implied_token(TokenKind::StartTag, atoms::TR, "tr");
                    return false;
                } else if [
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::TBODY,
                    atoms::TFOOT,
                    atoms::THEAD,
                ]
                .contains(&a)
                {
                    if self.pop_until(
                        Scope::Table,
                        &[atoms::TBODY, atoms::THEAD, atoms::TFOOT],
                    ) {
                        self.set_mode(InsertionMode::InTable);
                        return false;
                    }
                    // Ignore the token.
                    return true;
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if [atoms::TBODY, atoms::TFOOT, atoms::THEAD].contains(&a) {
                    if self.element_in_scope(Scope::Table, a) {
                        self.clear_stack_to_context(Scope::TableBody);
                        self.oe.pop();
                        self.set_mode(InsertionMode::InTable);
                    }
                    return true;
                } else if a == atoms::TABLE {
                    if self.pop_until(
                        Scope::Table,
                        &[atoms::TBODY, atoms::THEAD, atoms::TFOOT],
                    ) {
                        self.set_mode(InsertionMode::InTable);
                        return false;
                    }
                    // Ignore the token.
                    return true;
                } else if [
                    atoms::BODY,
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::HTML,
                    atoms::TD,
                    atoms::TH,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    // Ignore the token.
                    return true;
                }
            }
            TokenKind::Comment => {
                self.add_comment(None);
                return true;
            }
            _ => {}
        }
        self.in_table_im()
    }

    fn in_row_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::TD || a == atoms::TH {
                    self.clear_stack_to_context(Scope::TableRow);
                    self.add_element();
                    self.afe.insert_marker();
                    self.set_mode(InsertionMode::InCell);
                    return true;
                } else if [
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::TBODY,
                    atoms::TFOOT,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    if self.pop_until(Scope::Table, &[atoms::TR]) {
                        self.set_mode(InsertionMode::InTableBody);
                        return false;
                    }
                    // Ignore the token.
                    return true;
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if a == atoms::TR {
                    if self.pop_until(Scope::Table, &[atoms::TR]) {
                        self.set_mode(InsertionMode::InTableBody);
                    }
                    return true;
                } else if a == atoms::TABLE {
                    if self.pop_until(Scope::Table, &[atoms::TR]) {
                        self.set_mode(InsertionMode::InTableBody);
                        return false;
                    }
                    // Ignore the token.
                    return true;
                } else if [atoms::TBODY, atoms::TFOOT, atoms::THEAD].contains(&a) {
                    if self.element_in_scope(Scope::Table, a) {
                        self.parse_implied_token(TokenKind::EndTag, atoms::TR, "tr");
                        return false;
                    }
                    // Ignore the token.
                    return true;
                } else if [
                    atoms::BODY,
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::HTML,
                    atoms::TD,
                    atoms::TH,
                ]
                .contains(&a)
                {
                    // Ignore the token.
                    return true;
                }
            }
            _ => {}
        }
        self.in_table_im()
    }

    fn in_cell_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if [
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::TBODY,
                    atoms::TD,
                    atoms::TFOOT,
                    atoms::TH,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    if self.pop_until(Scope::Table, &[atoms::TD, atoms::TH]) {
                        // Close the cell and reprocess.
                        self.afe.clear_up_to_last_marker();
                        self.set_mode(InsertionMode::InRow);
                        return false;
                    }
                    // Ignore the token.
                    return true;
                } else if a == atoms::SELECT {
                    self.reconstruct_active_formatting_elements();
                    self.add_element();
                    self.frameset_ok = false;
                    self.set_mode(InsertionMode::InSelectInTable);
                    return true;
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if a == atoms::TD || a == atoms::TH {
                    if !self.pop_until(Scope::Table, &[a]) {
                        // Ignore the token.
                        return true;
                    }
                    self.afe.clear_up_to_last_marker();
                    self.set_mode(InsertionMode::InRow);
                    return true;
                } else if [
                    atoms::BODY,
                    atoms::CAPTION,
                    atoms::COL,
                    atoms::COLGROUP,
                    atoms::HTML,
                ]
                .contains(&a)
                {
                    // Ignore the token.
                    return true;
                } else if [
                    atoms::TABLE,
                    atoms::TBODY,
                    atoms::TFOOT,
                    atoms::THEAD,
                    atoms::TR,
                ]
                .contains(&a)
                {
                    if !self.element_in_scope(Scope::Table, a) {
                        // Ignore the token.
                        return true;
                    }
                    // Close the cell and reprocess.
                    self.pop_until(Scope::Table, &[atoms::TD, atoms::TH]);
                    self.afe.clear_up_to_last_marker();
                    self.set_mode(InsertionMode::InRow);
                    return false;
                }
            }
            _ => {}
        }
        self.in_body_im()
    }

    fn in_select_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Error => {
                // Stop parsing.
                return true;
            }
            TokenKind::Text => {
                let d = std::mem::take(&mut self.tok.data).replace('\0', "");
                self.add_text(d);
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::HTML {
                    return self.in_body_im();
                } else if a == atoms::OPTION {
                    if self.top_atom() == atoms::OPTION {
                        self.oe.pop();
                    }
                    self.add_element();
                } else if a == atoms::OPTGROUP {
                    if self.top_atom() == atoms::OPTION {
                        self.oe.pop();
                    }
                    if self.top_atom() == atoms::OPTGROUP {
                        self.oe.pop();
                    }
                    self.add_element();
                } else if a == atoms::SELECT {
                    if !self.pop_until(Scope::Select, &[atoms::SELECT]) {
                        // Ignore the token.
                        return true;
                    }
                    self.reset_insertion_mode();
                } else if [atoms::INPUT, atoms::KEYGEN, atoms::TEXTAREA].contains(&a) {
                    if self.element_in_scope(Scope::Select, atoms::SELECT) {
                        self.parse_implied_token(TokenKind::EndTag, atoms::SELECT, "select");
                        return false;
                    }
                    // Properly ignoring <textarea> needs the tokenizer out
                    // of raw-text mode.
                    self.tokenizer.next_is_not_raw_text();
                    // Ignore the token.
                    return true;
                } else if a == atoms::SCRIPT || a == atoms::TEMPLATE {
                    return self.in_head_im();
                } else if [
                    atoms::IFRAME,
                    atoms::NOEMBED,
                    atoms::NOFRAMES,
                    atoms::NOSCRIPT,
                    atoms::PLAINTEXT,
                    atoms::STYLE,
                    atoms::TITLE,
                    atoms::XMP,
                ]
                .contains(&a)
                {
                    // Ignored raw-text openers must not leave the
                    // tokenizer in raw-text mode.
                    self.tokenizer.next_is_not_raw_text();
                    // Ignore the token.
                    return true;
                }
            }
            TokenKind::EndTag => {
                let a = self.tok.atom;
                if a == atoms::OPTION {
                    if self.top_atom() == atoms::OPTION {
                        self.oe.pop();
                    }
                } else if a == atoms::OPTGROUP {
                    let mut i = self.oe.len() - 1;
                    if self.atom_of(self.oe.get(i)) == atoms::OPTION {
                        i -= 1;
                    }
                    if self.atom_of(self.oe.get(i)) == atoms::OPTGROUP {
                        self.oe.truncate(i);
                    }
                } else if a == atoms::SELECT {
                    if !self.pop_until(Scope::Select, &[atoms::SELECT]) {
                        // Ignore the token.
                        return true;
                    }
                    self.reset_insertion_mode();
                } else if a == atoms::TEMPLATE {
                    return self.in_head_im();
                }
            }
            TokenKind::Comment => {
                self.add_comment(None);
            }
            TokenKind::Doctype => {
                // Ignore the token.
                return true;
            }
            _ => {}
        }
        true
    }

    fn in_select_in_table_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::StartTag | TokenKind::EndTag => {
                let a = self.tok.atom;
                if [
                    atoms::CAPTION,
                    atoms::TABLE,
                    atoms::TBODY,
                    atoms::TFOOT,
                    atoms::THEAD,
                    atoms::TR,
                    atoms::TD,
                    atoms::TH,
                ]
                .contains(&a)
                {
                    if self.tok.kind == TokenKind::EndTag
                        && !self.element_in_scope(Scope::Table, a)
                    {
                        // Ignore the token.
                        return true;
                    }
                    // Pop back to the nearest select, whatever its
                    // namespace, matching what browsers do.
                    for i in (0..self.oe.len()).rev() {
                        if self.atom_of(self.oe.get(i)) == atoms::SELECT {
                            self.oe.truncate(i);
                            break;
                        }
                    }
                    self.reset_insertion_mode();
                    return false;
                }
            }
            _ => {}
        }
        self.in_select_im()
    }

    fn in_template_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text | TokenKind::Comment | TokenKind::Doctype => {
                return self.in_body_im();
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if [
                    atoms::BASE,
                    atoms::BASEFONT,
                    atoms::BGSOUND,
                    atoms::LINK,
                    atoms::META,
                    atoms::NOFRAMES,
                    atoms::SCRIPT,
                    atoms::STYLE,
                    atoms::TEMPLATE,
                    atoms::TITLE,
                ]
                .contains(&a)
                {
                    return self.in_head_im();
                }
                // The mode stack's top rewrites to the mode implied by the
                // tag's table context, then the token reprocesses.
                let mode = if [
                    atoms::CAPTION,
                    atoms::COLGROUP,
                    atoms::TBODY,
                    atoms::TFOOT,
                    atoms::THEAD,
                ]
                .contains(&a)
                {
                    InsertionMode::InTable
                } else if a == atoms::COL {
                    InsertionMode::InColumnGroup
                } else if a == atoms::TR {
                    InsertionMode::InTableBody
                } else if a == atoms::TD || a == atoms::TH {
                    InsertionMode::InRow
                } else {
                    InsertionMode::InBody
                };
                self.template_stack.pop();
                self.template_stack.push(mode);
                self.set_mode(mode);
                return false;
            }
            TokenKind::EndTag => {
                if self.tok.atom == atoms::TEMPLATE {
                    return self.in_head_im();
                }
                // Ignore the token.
                return true;
            }
            TokenKind::Error => {
                if !self.oe_contains(atoms::TEMPLATE) {
                    // Stop parsing.
                    return true;
                }
                self.generate_implied_end_tags(&[]);
                for i in (0..self.oe.len()).rev() {
                    let n = self.arena.get(self.oe.get(i));
                    if n.namespace == Namespace::Html && n.atom == atoms::TEMPLATE {
                        self.oe.truncate(i);
                        break;
                    }
                }
                self.afe.clear_up_to_last_marker();
                self.template_stack.pop();
                self.reset_insertion_mode();
                return false;
            }
            _ => {}
        }
        false
    }

    fn after_body_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Error => {
                // Stop parsing.
                return true;
            }
            TokenKind::Text => {
                if trim_leading_whitespace(&self.tok.data).is_empty() {
                    // It was all whitespace.
                    return self.in_body_im();
                }
            }
            TokenKind::StartTag => {
                if self.tok.atom == atoms::HTML {
                    return self.in_body_im();
                }
            }
            TokenKind::EndTag => {
                if self.tok.atom == atoms::HTML {
                    if !self.fragment {
                        self.set_mode(InsertionMode::AfterAfterBody);
                    }
                    return true;
                }
            }
            TokenKind::Comment => {
                // The comment attaches to the <html> element.
                assert!(
                    !self.oe.is_empty() && self.atom_of(self.oe.get(0)) == atoms::HTML,
                    "bad parser state: <html> element not found in the after-body mode"
                );
                let root = self.oe.get(0);
                self.add_comment(Some(root));
                return true;
            }
            _ => {}
        }
        self.set_mode(InsertionMode::InBody);
        false
    }

    fn in_frameset_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Comment => {
                self.add_comment(None);
            }
            TokenKind::Text => {
                // Everything except whitespace is dropped.
                let s = whitespace_only(&self.tok.data);
                if !s.is_empty() {
                    self.add_text(s);
                }
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::HTML {
                    return self.in_body_im();
                } else if a == atoms::FRAMESET {
                    self.add_element();
                } else if a == atoms::FRAME {
                    self.add_element();
                    self.oe.pop();
                    self.acknowledge_self_closing_tag();
                } else if a == atoms::NOFRAMES {
                    return self.in_head_im();
                }
            }
            TokenKind::EndTag => {
                if self.tok.atom == atoms::FRAMESET && self.top_atom() != atoms::HTML {
                    self.oe.pop();
                    if self.top_atom() != atoms::FRAMESET {
                        self.set_mode(InsertionMode::AfterFrameset);
                        return true;
                    }
                }
            }
            _ => {
                // Ignore the token.
            }
        }
        true
    }

    fn after_frameset_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Comment => {
                self.add_comment(None);
            }
            TokenKind::Text => {
                let s = whitespace_only(&self.tok.data);
                if !s.is_empty() {
                    self.add_text(s);
                }
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::HTML {
                    return self.in_body_im();
                } else if a == atoms::NOFRAMES {
                    return self.in_head_im();
                }
            }
            TokenKind::EndTag => {
                if self.tok.atom == atoms::HTML {
                    self.set_mode(InsertionMode::AfterAfterFrameset);
                    return true;
                }
            }
            _ => {
                // Ignore the token.
            }
        }
        true
    }

    fn after_after_body_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Error => {
                // Stop parsing.
                return true;
            }
            TokenKind::Text => {
                if trim_leading_whitespace(&self.tok.data).is_empty() {
                    return self.in_body_im();
                }
            }
            TokenKind::StartTag => {
                if self.tok.atom == atoms::HTML {
                    return self.in_body_im();
                }
            }
            TokenKind::Comment => {
                self.add_comment(Some(self.doc));
                return true;
            }
            TokenKind::Doctype => {
                return self.in_body_im();
            }
            _ => {}
        }
        self.set_mode(InsertionMode::InBody);
        false
    }

    fn after_after_frameset_im(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Comment => {
                self.add_comment(Some(self.doc));
            }
            TokenKind::Text => {
                let s = whitespace_only(&self.tok.data);
                if !s.is_empty() {
                    self.tok.data = s;
                    return self.in_body_im();
                }
            }
            TokenKind::StartTag => {
                let a = self.tok.atom;
                if a == atoms::HTML {
                    return self.in_body_im();
                } else if a == atoms::NOFRAMES {
                    return self.in_head_im();
                }
            }
            TokenKind::Doctype => {
                return self.in_body_im();
            }
            _ => {
                // Ignore the token.
            }
        }
        true
    }

    // 8<-------- foreign content -------->8

    /// The adjusted current node: the context element when the fragment
    /// parser is at its synthetic root, the current node otherwise.
    fn adjusted_current_node(&self) -> Option<NodeId> {
        if self.oe.len() == 1 && self.fragment && self.context.is_some() {
            return self.context;
        }
        self.oe.top()
    }

    /// Whether the token must go through the foreign-content rules.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#tree-construction-dispatcher
    fn in_foreign_content(&self) -> bool {
        if self.oe.is_empty() {
            return false;
        }
        let Some(id) = self.adjusted_current_node() else {
            return false;
        };
        let n = self.arena.get(id);
        if n.namespace == Namespace::Html {
            return false;
        }
        if self.mathml_text_integration_point(id) {
            if self.tok.kind == TokenKind::StartTag
                && self.tok.atom != atoms::MGLYPH
                && self.tok.atom != atoms::MALIGNMARK
            {
                return false;
            }
            if self.tok.kind == TokenKind::Text {
                return false;
            }
        }
        if n.namespace == Namespace::Math
            && n.atom == atoms::ANNOTATION_XML
            && self.tok.kind == TokenKind::StartTag
            && self.tok.atom == atoms::SVG
        {
            return false;
        }
        if self.html_integration_point(id)
            && matches!(self.tok.kind, TokenKind::StartTag | TokenKind::Text)
        {
            return false;
        }
        if self.tok.kind == TokenKind::Error {
            return false;
        }
        true
    }

    fn mathml_text_integration_point(&self, id: NodeId) -> bool {
        let n = self.arena.get(id);
        n.namespace == Namespace::Math
            && [atoms::MI, atoms::MO, atoms::MN, atoms::MS, atoms::MTEXT].contains(&n.atom)
    }

    fn html_integration_point(&self, id: NodeId) -> bool {
        let n = self.arena.get(id);
        match n.namespace {
            Namespace::Html => false,
            Namespace::Svg => {
                [atoms::DESC, atoms::FOREIGN_OBJECT, atoms::TITLE].contains(&n.atom)
            }
            Namespace::Math => {
                n.atom == atoms::ANNOTATION_XML
                    && n.attrs.iter().any(|attr| {
                        attr.key == "encoding"
                            && (attr.value.eq_ignore_ascii_case("text/html")
                                || attr.value.eq_ignore_ascii_case("application/xhtml+xml"))
                    })
            }
        }
    }

    /// Section "The rules for parsing tokens in foreign content".
    fn parse_foreign_content(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::Text => {
                if self.frameset_ok {
                    self.frameset_ok =
                        trim_leading_whitespace_or_nul(&self.tok.data).is_empty();
                }
                let d = std::mem::take(&mut self.tok.data).replace('\0', "\u{FFFD}");
                self.add_text(d);
            }
            TokenKind::Comment => {
                self.add_comment(None);
            }
            TokenKind::StartTag => {
                if !self.fragment {
                    let breaks_out = if self.tok.atom == atoms::FONT {
                        self.tok
                            .attrs
                            .iter()
                            .any(|t| matches!(t.key.as_str(), "color" | "face" | "size"))
                    } else {
                        is_breakout_tag(&self.tok.data)
                    };
                    if breaks_out {
                        debug!("foreign content breakout on <{}>", self.tok.data);
                        for i in (0..self.oe.len()).rev() {
                            let id = self.oe.get(i);
                            if self.arena.get(id).namespace == Namespace::Html
                                || self.html_integration_point(id)
                                || self.mathml_text_integration_point(id)
                            {
                                self.oe.truncate(i + 1);
                                break;
                            }
                        }
                        return false;
                    }
                }
                let current = self
                    .adjusted_current_node()
                    .expect("foreign content implies a current node");
                let ns = self.arena.get(current).namespace;
                match ns {
                    Namespace::Math => {
                        adjust_attribute_names(&mut self.tok.attrs, MATHML_ATTRIBUTE_ADJUSTMENTS);
                    }
                    Namespace::Svg => {
                        if let Some(adjusted) = svg_tag_name_adjustment(&self.tok.data) {
                            self.tok.atom = Atom::lookup(adjusted);
                            self.tok.data = adjusted.to_string();
                        }
                        adjust_attribute_names(&mut self.tok.attrs, SVG_ATTRIBUTE_ADJUSTMENTS);
                    }
                    Namespace::Html => {
                        unreachable!("bad parser state: HTML namespace in foreign content")
                    }
                }
                adjust_foreign_attributes(&mut self.tok.attrs);
                self.add_element();
                let top = self.top();
                self.arena.get_mut(top).namespace = ns;
                if ns != Namespace::Html {
                    // An SVG <title> must not flip the tokenizer into
                    // raw-text mode.
                    self.tokenizer.next_is_not_raw_text();
                }
                if self.has_self_closing_token {
                    self.oe.pop();
                    self.acknowledge_self_closing_tag();
                }
            }
            TokenKind::EndTag => {
                for i in (0..self.oe.len()).rev() {
                    let id = self.oe.get(i);
                    if self.arena.get(id).namespace == Namespace::Html {
                        return self.dispatch(self.im);
                    }
                    if self
                        .arena
                        .get(id)
                        .data
                        .eq_ignore_ascii_case(&self.tok.data)
                    {
                        self.oe.truncate(i);
                        break;
                    }
                }
            }
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn builder() -> TreeBuilder<&'static [u8]> {
        TreeBuilder::new(b"", &ParseOptions::default())
    }

    fn push_element(p: &mut TreeBuilder<&'static [u8]>, name: &str) -> NodeId {
        let id = p.arena.alloc(Node::element(name));
        p.oe.push(id);
        id
    }

    #[test]
    fn scope_checks_stop_at_boundaries() {
        let mut p = builder();
        push_element(&mut p, "html");
        push_element(&mut p, "body");
        push_element(&mut p, "p");
        push_element(&mut p, "button");
        push_element(&mut p, "b");

        assert!(p.element_in_scope(Scope::Default, atoms::P));
        // Button scope cannot see past the button.
        assert!(!p.element_in_scope(Scope::Button, atoms::P));
        assert!(p.element_in_scope(Scope::Button, atoms::B));
    }

    #[test]
    fn table_scope_stops_at_table() {
        let mut p = builder();
        push_element(&mut p, "html");
        push_element(&mut p, "body");
        push_element(&mut p, "div");
        push_element(&mut p, "table");
        push_element(&mut p, "tr");

        assert!(!p.element_in_scope(Scope::Table, atoms::DIV));
        assert!(p.element_in_scope(Scope::Table, atoms::TR));
        assert!(p.element_in_scope(Scope::Default, atoms::TR));
        // The table is itself a default-scope stop.
        assert!(!p.element_in_scope(Scope::Default, atoms::DIV));
    }

    #[test]
    fn implied_end_tags_pop_through_the_list() {
        let mut p = builder();
        push_element(&mut p, "html");
        push_element(&mut p, "body");
        push_element(&mut p, "ul");
        push_element(&mut p, "li");
        push_element(&mut p, "p");

        p.generate_implied_end_tags(&[]);
        assert_eq!(p.top_atom(), atoms::UL);
    }

    #[test]
    fn implied_end_tags_respect_exceptions() {
        let mut p = builder();
        push_element(&mut p, "html");
        push_element(&mut p, "body");
        push_element(&mut p, "li");
        push_element(&mut p, "p");

        p.generate_implied_end_tags(&["li"]);
        assert_eq!(p.top_atom(), atoms::LI);
    }

    #[test]
    fn reset_insertion_mode_from_stack() {
        let mut p = builder();
        push_element(&mut p, "html");
        p.head = Some(p.top());
        push_element(&mut p, "body");
        push_element(&mut p, "table");
        push_element(&mut p, "tbody");
        p.reset_insertion_mode();
        assert_eq!(p.im, InsertionMode::InTableBody);

        let mut p = builder();
        push_element(&mut p, "html");
        push_element(&mut p, "body");
        p.reset_insertion_mode();
        assert_eq!(p.im, InsertionMode::InBody);
    }

    #[test]
    fn foster_parent_inserts_before_the_table() {
        let mut p = builder();
        let html = push_element(&mut p, "html");
        let body = push_element(&mut p, "body");
        let _ = html;
        let table = push_element(&mut p, "table");
        // The table must be in the tree for before-table insertion.
        p.arena.detach(table);
        p.arena.append_child(body, table);

        let text = p.arena.alloc(Node::text("misplaced"));
        p.foster_parent(text);
        assert_eq!(p.arena.parent(text), Some(body));
        assert_eq!(p.arena.next_sibling(text), Some(table));
    }
}
