//! An HTML5 tokenizer and tree-construction parser.
//!
//! The parser follows the WHATWG HTML parsing algorithm: a byte stream is
//! tokenized, an insertion-mode state machine builds the document tree,
//! and malformed markup is repaired rather than rejected. The resulting
//! tree matches what a conforming user agent would build, including
//! implicitly-inserted elements, foster-parented content, and adoption
//! agency repairs of misnested formatting elements.
//!
//! ```no_run
//! use html_tree::{parse, ParseOptions};
//!
//! let doc = parse("<p>Hello</p>".as_bytes(), ParseOptions::default())?;
//! println!("{}", doc.render());
//! # Ok::<(), html_tree::Error>(())
//! ```
//!
//! @see https://html.spec.whatwg.org/multipage/parsing.html

mod macros;

pub mod atoms;
mod doctype;
mod errors;
mod node;
mod serializer;
mod tokenizer;
mod tree_builder;

use std::io::Read;

pub use atoms::Atom;
pub use doctype::{parse_doctype, DoctypeInfo};
pub use errors::Error;
pub use node::{Attribute, Children, Namespace, Node, NodeArena, NodeId, NodeKind};
pub use serializer::render;
pub use tokenizer::{Token, TokenKind, Tokenizer};

use tree_builder::TreeBuilder;

/// Knobs for a parse. The defaults match a scripting-enabled user agent.
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Whether the scripting flag is set; this only alters
    /// tree-construction decisions (`<noscript>` handling), no script
    /// runs.
    pub scripting: bool,
    pub frameset_ok: bool,
    /// Set by [`parse_fragment`]; has no effect on [`parse`].
    pub fragment: bool,
    /// Cap on the bytes a single token may span; zero means unbounded.
    /// Exceeding it fails the parse with [`Error::BufferExceeded`].
    pub max_buf: usize,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            scripting: true,
            frameset_ok: true,
            fragment: false,
            max_buf: 0,
        }
    }
}

/// A parsed document: the node arena plus the root Document node.
#[derive(Debug)]
pub struct Document {
    arena: NodeArena,
    root: NodeId,
    quirks: bool,
}

impl Document {
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Mutable arena access, for detaching subtrees and similar surgery.
    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    /// The root node, of kind [`NodeKind::Document`].
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Whether the doctype put the document in quirks mode.
    pub fn quirks(&self) -> bool {
        self.quirks
    }

    /// Serializes the document back to HTML.
    pub fn render(&self) -> String {
        serializer::render(&self.arena, self.root)
    }
}

/// A parsed fragment: the arena plus the top-level nodes, in order.
#[derive(Debug)]
pub struct Fragment {
    arena: NodeArena,
    nodes: Vec<NodeId>,
}

impl Fragment {
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for &id in &self.nodes {
            serializer::render_into(&mut out, &self.arena, id);
        }
        out
    }
}

/// Parses a complete document from a UTF-8 byte reader.
///
/// Malformed HTML never fails the parse; the error paths are the reader
/// failing or a token outgrowing `max_buf`.
pub fn parse<R: Read>(reader: R, options: ParseOptions) -> Result<Document, Error> {
    let mut builder = TreeBuilder::new(reader, &options);
    builder.run()?;
    let (arena, root, quirks) = builder.into_document();
    Ok(Document {
        arena,
        root,
        quirks,
    })
}

/// Parses a fragment the way it would parse inside `context` (commonly a
/// `<body>` element). Without a context the fragment parses as if inside
/// nothing in particular, which mirrors an unknown element.
///
/// Fails with [`Error::InconsistentNode`] when the context's atom
/// disagrees with its tag name.
pub fn parse_fragment<R: Read>(
    reader: R,
    context: Option<Node>,
    mut options: ParseOptions,
) -> Result<Fragment, Error> {
    options.fragment = true;
    let mut builder = TreeBuilder::new_fragment(reader, context, &options)?;
    builder.run()?;
    let (arena, nodes) = builder.into_fragment();
    Ok(Fragment { arena, nodes })
}
