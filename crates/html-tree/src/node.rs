//! The document tree: typed nodes in an arena, linked by ids.
//!
//! Parent/child/sibling relations form a cyclic graph, so nodes live in a
//! [`NodeArena`] (a flat vector) and refer to each other with [`NodeId`]
//! handles. Tree mutations are index rewrites; subtree ownership follows
//! the links, not Rust ownership.

use crate::atoms::Atom;

/// Handle to a node within its [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a [`Node`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Error,
    Text,
    Document,
    Element,
    Comment,
    Doctype,
    /// Pre-rendered markup carried through verbatim.
    Raw,
    /// Sentinel for the active-formatting list; never part of a tree.
    ScopeMarker,
}

/// Element namespace. `Html` is the default and serializes as the empty
/// string (XHTML is implied).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Namespace {
    #[default]
    Html,
    Math,
    Svg,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Html => "",
            Namespace::Math => "math",
            Namespace::Svg => "svg",
        }
    }
}

/// One attribute of an element: `(namespace, key, value)`.
///
/// The namespace is empty except for foreign attributes (`xml:`, `xlink:`,
/// `xmlns:`) adjusted during foreign-content insertion. Keys are lowercased
/// on ingestion; values are fully unescaped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: String,
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Attribute {
        Attribute {
            namespace: String::new(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single node. `data` holds the tag name for elements and doctypes and
/// the text for text, comment, and raw nodes.
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub kind: NodeKind,
    pub atom: Atom,
    pub data: String,
    pub namespace: Namespace,
    pub attrs: Vec<Attribute>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Text
    }
}

impl Node {
    pub fn new(kind: NodeKind) -> Node {
        Node {
            kind,
            ..Node::default()
        }
    }

    /// A detached element node. The atom is looked up from the name.
    pub fn element(name: impl Into<String>) -> Node {
        let data = name.into();
        Node {
            kind: NodeKind::Element,
            atom: Atom::lookup(&data),
            data,
            ..Node::default()
        }
    }

    pub fn text(data: impl Into<String>) -> Node {
        Node {
            kind: NodeKind::Text,
            data: data.into(),
            ..Node::default()
        }
    }

    fn detached_copy(&self) -> Node {
        Node {
            kind: self.kind,
            atom: self.atom,
            data: self.data.clone(),
            namespace: self.namespace,
            attrs: self.attrs.clone(),
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }
}

/// Flat storage for a document's nodes.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> NodeArena {
        NodeArena::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.get(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).last_child
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).prev_sibling
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).next_sibling
    }

    /// Iterates `id`'s children front to back.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            arena: self,
            next: self.first_child(id),
        }
    }

    fn assert_detached(&self, id: NodeId, op: &str) {
        let n = self.get(id);
        assert!(
            n.parent.is_none() && n.prev_sibling.is_none() && n.next_sibling.is_none(),
            "{op}: node is already attached"
        );
    }

    /// Appends `child` as the last child of `parent`.
    ///
    /// `child` must be detached; attaching an attached node is a bug in the
    /// caller, not a recoverable condition.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.assert_detached(child, "append_child");
        assert!(parent != child, "append_child: node appended to itself");

        match self.get(parent).last_child {
            Some(last) => {
                self.get_mut(last).next_sibling = Some(child);
                self.get_mut(child).prev_sibling = Some(last);
            }
            None => self.get_mut(parent).first_child = Some(child),
        }
        self.get_mut(parent).last_child = Some(child);
        self.get_mut(child).parent = Some(parent);
    }

    /// Inserts `child` under `parent`, immediately before `before`. A
    /// `None` target appends.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        let Some(before) = before else {
            self.append_child(parent, child);
            return;
        };
        self.assert_detached(child, "insert_before");
        assert_eq!(
            self.get(before).parent,
            Some(parent),
            "insert_before: target is not a child of parent"
        );

        match self.get(before).prev_sibling {
            Some(prev) => {
                self.get_mut(prev).next_sibling = Some(child);
                self.get_mut(child).prev_sibling = Some(prev);
            }
            None => self.get_mut(parent).first_child = Some(child),
        }
        self.get_mut(before).prev_sibling = Some(child);
        self.get_mut(child).next_sibling = Some(before);
        self.get_mut(child).parent = Some(parent);
    }

    /// Detaches `id` (and its subtree) from its parent and siblings.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let n = self.get(id);
            (n.parent, n.prev_sibling, n.next_sibling)
        };

        match prev {
            Some(prev) => self.get_mut(prev).next_sibling = next,
            None => {
                if let Some(parent) = parent {
                    self.get_mut(parent).first_child = next;
                }
            }
        }
        match next {
            Some(next) => self.get_mut(next).prev_sibling = prev,
            None => {
                if let Some(parent) = parent {
                    self.get_mut(parent).last_child = prev;
                }
            }
        }

        let n = self.get_mut(id);
        n.parent = None;
        n.prev_sibling = None;
        n.next_sibling = None;
    }

    /// Detaches every child of `from` and re-appends them, in order, under
    /// `to`.
    pub fn reparent_children(&mut self, to: NodeId, from: NodeId) {
        while let Some(child) = self.first_child(from) {
            self.detach(child);
            self.append_child(to, child);
        }
    }

    /// Allocates a detached shallow copy: same kind, atom, data, namespace,
    /// and attributes; no relations.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let copy = self.get(id).detached_copy();
        self.alloc(copy)
    }

    /// Walks the subtree under `root` checking the link invariants. Panics
    /// with a description on the first violation. Test support.
    pub fn assert_consistent(&self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let n = self.get(id);
            assert_eq!(
                n.first_child.is_none(),
                n.last_child.is_none(),
                "half-set child pointers on {id:?}"
            );
            if let Some(p) = n.parent {
                assert!(p != id, "node {id:?} is its own parent");
            }

            let mut forward = Vec::new();
            let mut child = n.first_child;
            while let Some(c) = child {
                let cn = self.get(c);
                assert_eq!(cn.parent, Some(id), "child {c:?} disowns {id:?}");
                if let Some(prev) = cn.prev_sibling {
                    assert_eq!(
                        self.get(prev).next_sibling,
                        Some(c),
                        "broken prev link at {c:?}"
                    );
                }
                if let Some(next) = cn.next_sibling {
                    assert_eq!(
                        self.get(next).prev_sibling,
                        Some(c),
                        "broken next link at {c:?}"
                    );
                }
                assert!(!forward.contains(&c), "child {c:?} repeats under {id:?}");
                forward.push(c);
                child = cn.next_sibling;
            }

            let mut backward = Vec::new();
            let mut child = n.last_child;
            while let Some(c) = child {
                backward.push(c);
                child = self.get(c).prev_sibling;
            }
            backward.reverse();
            assert_eq!(forward, backward, "sibling traversals disagree under {id:?}");

            // Acyclic: no ancestor may reappear below itself.
            let mut ancestor = n.parent;
            while let Some(a) = ancestor {
                assert!(a != id, "node {id:?} is its own ancestor");
                ancestor = self.get(a).parent;
            }

            stack.extend(forward);
        }
    }
}

pub struct Children<'a> {
    arena: &'a NodeArena,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.arena.next_sibling(id);
        Some(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn element(arena: &mut NodeArena, name: &str) -> NodeId {
        arena.alloc(Node::element(name))
    }

    #[test]
    fn append_and_walk() {
        let mut arena = NodeArena::new();
        let doc = arena.alloc(Node::new(NodeKind::Document));
        let a = element(&mut arena, "a");
        let b = element(&mut arena, "b");
        let c = element(&mut arena, "c");
        arena.append_child(doc, a);
        arena.append_child(doc, b);
        arena.append_child(doc, c);

        let kids: Vec<_> = arena.children(doc).collect();
        assert_eq!(kids, vec![a, b, c]);
        assert_eq!(arena.first_child(doc), Some(a));
        assert_eq!(arena.last_child(doc), Some(c));
        assert_eq!(arena.prev_sibling(b), Some(a));
        assert_eq!(arena.next_sibling(b), Some(c));
        arena.assert_consistent(doc);
    }

    #[test]
    fn insert_before_links_both_ways() {
        let mut arena = NodeArena::new();
        let doc = arena.alloc(Node::new(NodeKind::Document));
        let a = element(&mut arena, "a");
        let c = element(&mut arena, "c");
        arena.append_child(doc, a);
        arena.append_child(doc, c);

        let b = element(&mut arena, "b");
        arena.insert_before(doc, b, Some(c));
        let kids: Vec<_> = arena.children(doc).collect();
        assert_eq!(kids, vec![a, b, c]);

        let front = element(&mut arena, "front");
        arena.insert_before(doc, front, Some(a));
        assert_eq!(arena.first_child(doc), Some(front));
        arena.assert_consistent(doc);
    }

    #[test]
    fn detach_clears_all_links() {
        let mut arena = NodeArena::new();
        let doc = arena.alloc(Node::new(NodeKind::Document));
        let a = element(&mut arena, "a");
        let b = element(&mut arena, "b");
        let c = element(&mut arena, "c");
        arena.append_child(doc, a);
        arena.append_child(doc, b);
        arena.append_child(doc, c);

        arena.detach(b);
        let n = arena.get(b);
        assert!(n.parent.is_none() && n.prev_sibling.is_none() && n.next_sibling.is_none());
        let kids: Vec<_> = arena.children(doc).collect();
        assert_eq!(kids, vec![a, c]);
        arena.assert_consistent(doc);

        // Detached subtrees can be re-attached elsewhere.
        arena.append_child(a, b);
        assert_eq!(arena.parent(b), Some(a));
        arena.assert_consistent(doc);
    }

    #[test]
    fn clone_node_is_shallow_and_detached() {
        let mut arena = NodeArena::new();
        let a = element(&mut arena, "a");
        arena.get_mut(a).attrs.push(Attribute::new("href", "x"));
        let child = element(&mut arena, "b");
        arena.append_child(a, child);

        let copy = arena.clone_node(a);
        let n = arena.get(copy);
        assert_eq!(n.kind, NodeKind::Element);
        assert_eq!(n.data, "a");
        assert_eq!(n.attrs.len(), 1);
        assert!(n.parent.is_none() && n.first_child.is_none() && n.last_child.is_none());
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn double_append_is_a_bug() {
        let mut arena = NodeArena::new();
        let doc = arena.alloc(Node::new(NodeKind::Document));
        let other = arena.alloc(Node::new(NodeKind::Document));
        let a = element(&mut arena, "a");
        arena.append_child(doc, a);
        arena.append_child(other, a);
    }

    #[test]
    fn reparent_children_preserves_order() {
        let mut arena = NodeArena::new();
        let from = element(&mut arena, "from");
        let to = element(&mut arena, "to");
        let a = element(&mut arena, "a");
        let b = element(&mut arena, "b");
        arena.append_child(from, a);
        arena.append_child(from, b);

        arena.reparent_children(to, from);
        assert!(arena.first_child(from).is_none());
        let kids: Vec<_> = arena.children(to).collect();
        assert_eq!(kids, vec![a, b]);
    }
}
