//! Host Tree Nodes
//!
//! A minimal in-memory live tree: elements, text nodes, comments and
//! fragments. Nodes are shared handles; cloning a [`Node`] clones the handle,
//! never the subtree.
//!
//! Inserting a fragment moves its children into the target and leaves the
//! fragment empty, the way a document fragment behaves. Inserting a node
//! that already has a parent detaches it from that parent first.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::reactive::Subscription;

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a tag name. Holds children.
    Element(String),

    /// A text leaf.
    Text,

    /// A comment leaf. Anchors use comments as sentinels.
    Comment,

    /// A detached container whose children move out on insertion.
    Fragment,
}

struct NodeData {
    id: NodeId,
    kind: NodeKind,
    text: RefCell<String>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,

    /// Child-list edits applied to this node so far.
    mutations: Cell<u64>,

    /// Reactive bindings released when the node is dropped.
    bindings: RefCell<Vec<Subscription>>,

    /// Set on the comments that bound an anchor's range.
    sentinel: Cell<bool>,
}

impl Drop for NodeData {
    fn drop(&mut self) {
        for binding in self.bindings.get_mut().drain(..) {
            binding.unsubscribe();
        }
    }
}

/// A handle to a node of the live tree.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

/// A non-owning handle to a node.
#[derive(Clone)]
pub struct WeakNode(Weak<NodeData>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl Node {
    fn with_kind(kind: NodeKind, text: String) -> Self {
        Self(Rc::new(NodeData {
            id: NodeId::new(),
            kind,
            text: RefCell::new(text),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            mutations: Cell::new(0),
            bindings: RefCell::new(Vec::new()),
            sentinel: Cell::new(false),
        }))
    }

    /// Create an element node.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Element(tag.into()), String::new())
    }

    /// Create a text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Text, content.into())
    }

    /// Create a comment node.
    pub fn comment(content: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Comment, content.into())
    }

    /// Create an anchor sentinel comment.
    pub(crate) fn sentinel(content: impl Into<String>) -> Self {
        let node = Self::comment(content);
        node.0.sentinel.set(true);
        node
    }

    /// Whether this comment bounds an anchor's range.
    pub fn is_sentinel(&self) -> bool {
        self.0.sentinel.get()
    }

    /// Create an empty fragment.
    pub fn fragment() -> Self {
        Self::with_kind(NodeKind::Fragment, String::new())
    }

    /// Create a fragment holding `nodes`, in order.
    pub fn fragment_of(nodes: &[Node]) -> Self {
        let fragment = Self::fragment();
        fragment.replace_children(nodes);
        fragment
    }

    /// Builder helper appending a text child.
    pub fn with_text(self, content: impl Into<String>) -> Self {
        self.append_child(&Node::text(content));
        self
    }

    /// Builder helper appending a child.
    pub fn with_child(self, child: &Node) -> Self {
        self.append_child(child);
        self
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Tag name, for elements.
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.0.kind == NodeKind::Fragment
    }

    pub fn is_comment(&self) -> bool {
        self.0.kind == NodeKind::Comment
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot of the children.
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn child_at(&self, index: usize) -> Option<Node> {
        self.0.children.borrow().get(index).cloned()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.0.children.borrow().first().cloned()
    }

    pub fn last_child(&self) -> Option<Node> {
        self.0.children.borrow().last().cloned()
    }

    /// Position of `child` among this node's children.
    pub fn index_of(&self, child: &Node) -> Option<usize> {
        self.0
            .children
            .borrow()
            .iter()
            .position(|candidate| candidate.ptr_eq(child))
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = parent.index_of(self)?;
        parent.child_at(index + 1)
    }

    pub fn previous_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = parent.index_of(self)?;
        index.checked_sub(1).and_then(|i| parent.child_at(i))
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Text of a leaf, or the concatenated text of every text descendant.
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text | NodeKind::Comment => self.0.text.borrow().clone(),
            NodeKind::Element(_) | NodeKind::Fragment => {
                let mut out = String::new();
                self.collect_text(&mut out);
                out
            }
        }
    }

    fn collect_text(&self, out: &mut String) {
        for child in self.0.children.borrow().iter() {
            match child.0.kind {
                NodeKind::Text => out.push_str(&child.0.text.borrow()),
                NodeKind::Comment => {}
                _ => child.collect_text(out),
            }
        }
    }

    /// Overwrite the text of a text or comment node.
    pub fn set_text(&self, content: impl Into<String>) {
        match self.0.kind {
            NodeKind::Text | NodeKind::Comment => *self.0.text.borrow_mut() = content.into(),
            _ => warn!(node = self.0.id.raw(), "set_text on a container node ignored"),
        }
    }

    /// Keep `subscription` alive for as long as this node exists.
    pub fn bind(&self, subscription: Subscription) {
        self.0.bindings.borrow_mut().push(subscription);
    }

    /// Number of child-list edits applied to this node.
    ///
    /// One call to `append_child`, `insert_before`, `remove_child` or
    /// `replace_children` counts as one edit, however many nodes it moves.
    pub fn mutation_count(&self) -> u64 {
        self.0.mutations.get()
    }

    fn record_mutation(&self) {
        self.0.mutations.set(self.0.mutations.get() + 1);
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Detach `node` from wherever it is and return what actually moves:
    /// the children of a fragment, or the node itself.
    fn take_for_insert(node: &Node) -> Vec<Node> {
        if node.is_fragment() {
            let moved = std::mem::take(&mut *node.0.children.borrow_mut());
            for child in &moved {
                *child.0.parent.borrow_mut() = Weak::new();
            }
            if !moved.is_empty() {
                node.record_mutation();
            }
            moved
        } else {
            node.remove();
            vec![node.clone()]
        }
    }

    fn adopt(&self, nodes: &[Node]) {
        for node in nodes {
            *node.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        }
    }

    /// Append `child` at the end.
    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None`. A reference that is not a child of this node falls back to
    /// appending.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if child.ptr_eq(self) || reference.is_some_and(|r| r.ptr_eq(child)) {
            return;
        }

        let incoming = Self::take_for_insert(child);
        if incoming.is_empty() {
            return;
        }
        self.adopt(&incoming);

        let mut children = self.0.children.borrow_mut();
        let at = match reference {
            Some(reference) => match children.iter().position(|c| c.ptr_eq(reference)) {
                Some(at) => at,
                None => {
                    warn!(
                        parent = self.0.id.raw(),
                        reference = reference.0.id.raw(),
                        "insert_before reference is not a child, appending"
                    );
                    children.len()
                }
            },
            None => children.len(),
        };
        children.splice(at..at, incoming);
        drop(children);
        self.record_mutation();
    }

    /// Remove `child` from this node. Returns whether it was a child.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut children = self.0.children.borrow_mut();
            match children.iter().position(|c| c.ptr_eq(child)) {
                Some(index) => {
                    children.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            *child.0.parent.borrow_mut() = Weak::new();
            self.record_mutation();
        }
        removed
    }

    /// Detach this node from its parent, if any.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Replace every child with `nodes` in a single edit.
    ///
    /// `nodes` may include current children; they are kept and reordered.
    pub fn replace_children(&self, nodes: &[Node]) {
        let old = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in &old {
            *child.0.parent.borrow_mut() = Weak::new();
        }

        let mut incoming = Vec::with_capacity(nodes.len());
        for node in nodes {
            if node.ptr_eq(self) {
                continue;
            }
            incoming.extend(Self::take_for_insert(node));
        }
        self.adopt(&incoming);
        *self.0.children.borrow_mut() = incoming;
        self.record_mutation();
    }

    /// Exchange the tree positions of this node and `other`.
    pub fn swap_with(&self, other: &Node) {
        if self.ptr_eq(other) {
            return;
        }
        let (Some(parent), Some(other_parent)) = (self.parent(), other.parent()) else {
            warn!(a = self.0.id.raw(), b = other.0.id.raw(), "swap of a detached node ignored");
            return;
        };
        let marker = Node::comment("");
        parent.insert_before(&marker, Some(self));
        other_parent.insert_before(self, Some(other));
        parent.insert_before(other, Some(&marker));
        marker.remove();
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Element(tag) => f
                .debug_struct("Element")
                .field("tag", tag)
                .field("children", &self.child_count())
                .finish(),
            NodeKind::Text => f.debug_tuple("Text").field(&*self.0.text.borrow()).finish(),
            NodeKind::Comment => f.debug_tuple("Comment").field(&*self.0.text.borrow()).finish(),
            NodeKind::Fragment => f
                .debug_struct("Fragment")
                .field("children", &self.child_count())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(node: &Node) -> Vec<String> {
        node.children().iter().map(Node::text_content).collect()
    }

    #[test]
    fn node_ids_are_unique() {
        assert_ne!(Node::text("a").id(), Node::text("a").id());
    }

    #[test]
    fn append_and_insert_before() {
        let list = Node::element("ul");
        let a = Node::text("a");
        let c = Node::text("c");
        list.append_child(&a);
        list.append_child(&c);
        list.insert_before(&Node::text("b"), Some(&c));

        assert_eq!(texts(&list), vec!["a", "b", "c"]);
        assert!(a.parent().unwrap().ptr_eq(&list));
        assert_eq!(list.mutation_count(), 3);
    }

    #[test]
    fn inserting_moves_from_old_parent() {
        let first = Node::element("div");
        let second = Node::element("div");
        let child = Node::text("x");

        first.append_child(&child);
        second.append_child(&child);

        assert_eq!(first.child_count(), 0);
        assert!(child.parent().unwrap().ptr_eq(&second));
    }

    #[test]
    fn fragment_insertion_moves_children() {
        let fragment = Node::fragment_of(&[Node::text("a"), Node::text("b")]);
        let host = Node::element("div");
        host.append_child(&fragment);

        assert_eq!(texts(&host), vec!["a", "b"]);
        assert_eq!(fragment.child_count(), 0);
        assert_eq!(host.mutation_count(), 1);
    }

    #[test]
    fn siblings_and_text_content() {
        let host = Node::element("p")
            .with_text("hello ")
            .with_child(&Node::comment("ignored"))
            .with_child(&Node::element("b").with_text("world"));

        assert_eq!(host.text_content(), "hello world");
        let middle = host.child_at(1).unwrap();
        assert_eq!(middle.previous_sibling().unwrap().text_content(), "hello ");
        assert_eq!(middle.next_sibling().unwrap().tag(), Some("b"));
    }

    #[test]
    fn replace_children_keeps_reused_nodes() {
        let host = Node::element("ul");
        let a = Node::text("a");
        let b = Node::text("b");
        host.append_child(&a);
        host.append_child(&b);

        host.replace_children(&[b.clone(), Node::text("c"), a.clone()]);

        assert_eq!(texts(&host), vec!["b", "c", "a"]);
        assert!(a.parent().unwrap().ptr_eq(&host));
    }

    #[test]
    fn swap_exchanges_positions() {
        let host = Node::element("ul");
        let nodes: Vec<Node> = ["a", "b", "c"].iter().map(|t| Node::text(*t)).collect();
        for node in &nodes {
            host.append_child(node);
        }

        nodes[0].swap_with(&nodes[2]);
        assert_eq!(texts(&host), vec!["c", "b", "a"]);

        nodes[1].swap_with(&nodes[0]);
        assert_eq!(texts(&host), vec!["c", "a", "b"]);
    }

    #[test]
    fn foreign_reference_falls_back_to_append() {
        let host = Node::element("div");
        host.append_child(&Node::text("a"));
        host.insert_before(&Node::text("b"), Some(&Node::text("stranger")));
        assert_eq!(texts(&host), vec!["a", "b"]);
    }
}
