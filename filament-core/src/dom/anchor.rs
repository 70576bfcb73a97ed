//! Region Anchors
//!
//! An [`Anchor`] bounds a mutable range of a parent's children with two
//! comment sentinels. All content edits happen strictly between them.
//!
//! # Lifecycle
//!
//! A fresh anchor parks its sentinels in a holding fragment. Inserting
//! [`Anchor::fragment`] into a parent mounts the range there. [`Anchor::remove`]
//! parks the range (sentinels and content) back in the holding fragment, so
//! inserting the fragment again restores it.
//!
//! # Bulk Path
//!
//! When the sentinels are the first and last children of their parent, the
//! range is the whole child list. Clearing or replacing content then goes
//! through a single [`Node::replace_children`] instead of one edit per node.

use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::{trace, warn};

use super::node::Node;

struct AnchorInner {
    name: String,
    start: Node,
    end: Node,
    holding: Node,
}

/// A pair of sentinels bounding a sub-range of the tree.
#[derive(Clone)]
pub struct Anchor {
    inner: Rc<AnchorInner>,
}

impl Anchor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let start = Node::sentinel(format!("Anchor start: {}", name));
        let end = Node::sentinel(format!("Anchor end: {}", name));
        let holding = Node::fragment_of(&[start.clone(), end.clone()]);
        Self {
            inner: Rc::new(AnchorInner {
                name,
                start,
                end,
                holding,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The holding fragment. Insert it into a parent to mount the range.
    pub fn fragment(&self) -> Node {
        self.inner.holding.clone()
    }

    pub fn start(&self) -> &Node {
        &self.inner.start
    }

    pub fn end(&self) -> &Node {
        &self.inner.end
    }

    /// The node currently holding the sentinels. This is the holding fragment
    /// while the range is not mounted.
    pub fn parent(&self) -> Option<Node> {
        self.inner.start.parent()
    }

    /// Whether the range sits in a real parent.
    pub fn is_mounted(&self) -> bool {
        self.parent()
            .is_some_and(|parent| !parent.ptr_eq(&self.inner.holding))
    }

    pub fn ptr_eq(&self, other: &Anchor) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn host(&self) -> Option<Node> {
        let parent = self.parent();
        if parent.is_none() {
            warn!(anchor = %self.inner.name, "anchor sentinels are detached");
        }
        parent
    }

    /// Whether the sentinels are the parent's first and last children.
    fn spans_parent(&self, parent: &Node) -> bool {
        parent
            .first_child()
            .is_some_and(|first| first.ptr_eq(&self.inner.start))
            && parent
                .last_child()
                .is_some_and(|last| last.ptr_eq(&self.inner.end))
    }

    /// Content nodes, in order.
    pub fn children(&self) -> Vec<Node> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        let siblings = parent.children();
        let start = siblings.iter().position(|n| n.ptr_eq(&self.inner.start));
        let end = siblings.iter().position(|n| n.ptr_eq(&self.inner.end));
        match (start, end) {
            (Some(start), Some(end)) if start < end => siblings[start + 1..end].to_vec(),
            _ => Vec::new(),
        }
    }

    /// Number of content nodes.
    pub fn len(&self) -> usize {
        self.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .start
            .next_sibling()
            .map_or(true, |next| next.ptr_eq(&self.inner.end))
    }

    /// Content node at position `index`.
    pub fn get_by_index(&self, index: usize) -> Option<Node> {
        self.children().into_iter().nth(index)
    }

    /// Insert `node` before `before`, or at the end of the range.
    pub fn append_child(&self, node: &Node, before: Option<&Node>) {
        let Some(parent) = self.host() else {
            return;
        };
        parent.insert_before(node, Some(before.unwrap_or(&self.inner.end)));
    }

    /// Append `nodes` at the end of the range in a single edit.
    pub fn append_all(&self, nodes: &[Node]) {
        if nodes.is_empty() {
            return;
        }
        self.append_child(&Node::fragment_of(nodes), None);
    }

    /// Insert `node` before `reference`, which must be inside the range.
    pub fn insert_before(&self, node: &Node, reference: &Node) {
        self.append_child(node, Some(reference));
    }

    /// Remove every content node. Sentinels stay.
    pub fn remove_children(&self) {
        let Some(parent) = self.host() else {
            return;
        };
        if self.spans_parent(&parent) {
            trace!(anchor = %self.inner.name, "bulk clear");
            parent.replace_children(&[self.inner.start.clone(), self.inner.end.clone()]);
            return;
        }
        for node in self.children() {
            parent.remove_child(&node);
        }
    }

    /// Replace the content with a single node.
    pub fn replace_content(&self, node: &Node) {
        self.replace_all(std::slice::from_ref(node));
    }

    /// Replace the content with `nodes`, in order.
    pub fn replace_all(&self, nodes: &[Node]) {
        let Some(parent) = self.host() else {
            return;
        };
        if self.spans_parent(&parent) {
            trace!(anchor = %self.inner.name, count = nodes.len(), "bulk replace");
            let mut all = Vec::with_capacity(nodes.len() + 2);
            all.push(self.inner.start.clone());
            all.extend(nodes.iter().cloned());
            all.push(self.inner.end.clone());
            parent.replace_children(&all);
            return;
        }
        // Reused nodes may already sit in the range; detach before reinserting.
        for node in self.children() {
            parent.remove_child(&node);
        }
        self.append_all(nodes);
    }

    /// Park sentinels and content in the holding fragment.
    pub fn remove(&self) {
        if !self.is_mounted() {
            return;
        }
        let mut range = Vec::with_capacity(self.len() + 2);
        range.push(self.inner.start.clone());
        range.extend(self.children());
        range.push(self.inner.end.clone());
        self.inner.holding.replace_children(&range);
        trace!(anchor = %self.inner.name, "range parked");
    }

    /// Remove content and sentinels from the tree for good.
    pub fn remove_with_anchors(&self) {
        for node in self.children() {
            node.remove();
        }
        self.inner.start.remove();
        self.inner.end.remove();
    }
}

impl Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("name", &self.inner.name)
            .field("mounted", &self.is_mounted())
            .field("len", &self.len())
            .finish()
    }
}
