//! Child normalisation.
//!
//! Anything a render callback hands back is turned into exactly one
//! [`Node`] through [`IntoNode`]. Strings become text nodes, anchors become
//! their holding fragment, and observables become live text nodes that
//! follow the cell.

use std::fmt::Display;

use super::anchor::Anchor;
use super::node::Node;
use crate::reactive::{Computed, Observable};

/// Conversion into a single host node.
pub trait IntoNode {
    fn into_node(self) -> Node;
}

impl IntoNode for Node {
    fn into_node(self) -> Node {
        self
    }
}

impl IntoNode for &Node {
    fn into_node(self) -> Node {
        self.clone()
    }
}

impl IntoNode for &Anchor {
    fn into_node(self) -> Node {
        self.fragment()
    }
}

impl IntoNode for String {
    fn into_node(self) -> Node {
        Node::text(self)
    }
}

impl IntoNode for &str {
    fn into_node(self) -> Node {
        Node::text(self)
    }
}

impl IntoNode for &String {
    fn into_node(self) -> Node {
        Node::text(self.as_str())
    }
}

/// `None` renders as an empty comment placeholder.
impl<N: IntoNode> IntoNode for Option<N> {
    fn into_node(self) -> Node {
        match self {
            Some(node) => node.into_node(),
            None => Node::comment(""),
        }
    }
}

impl<T, O> IntoNode for &Observable<T, O>
where
    T: Clone + PartialEq + Display + 'static,
    O: 'static,
{
    fn into_node(self) -> Node {
        let node = Node::text(self.with(ToString::to_string));
        let weak = node.downgrade();
        let subscription = self.subscribe(move |value, _| {
            if let Some(node) = weak.upgrade() {
                node.set_text(value.to_string());
            }
        });
        node.bind(subscription);
        node
    }
}

impl<T, O> IntoNode for Observable<T, O>
where
    T: Clone + PartialEq + Display + 'static,
    O: 'static,
{
    fn into_node(self) -> Node {
        (&self).into_node()
    }
}

impl<T> IntoNode for &Computed<T>
where
    T: Clone + PartialEq + Display + 'static,
{
    fn into_node(self) -> Node {
        self.observable().into_node()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_become_text() {
        assert_eq!("hi".into_node().text_content(), "hi");
        assert_eq!(String::from("there").into_node().text_content(), "there");
    }

    #[test]
    fn none_becomes_placeholder() {
        let node = Option::<Node>::None.into_node();
        assert!(node.is_comment());
        assert_eq!(node.text_content(), "");
    }

    #[test]
    fn observable_text_follows_cell() {
        let count: Observable<_> = Observable::new(1);
        let node = (&count).into_node();
        assert_eq!(node.text_content(), "1");

        count.set(2);
        assert_eq!(node.text_content(), "2");
    }

    #[test]
    fn dropping_text_node_detaches_listener() {
        let count: Observable<_> = Observable::new(1);
        let node = (&count).into_node();
        assert_eq!(count.listener_count(), 1);

        drop(node);
        assert_eq!(count.listener_count(), 0);
    }
}
