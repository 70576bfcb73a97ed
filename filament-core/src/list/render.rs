//! Render callbacks.

use std::rc::Rc;

use tracing::error;

use crate::dom::{IntoNode, Node};
use crate::error::{Error, Result};
use crate::reactive::Observable;

type ItemFn<T> = Rc<dyn Fn(&T) -> Node>;
type IndexedFn<T> = Rc<dyn Fn(&T, Observable<usize>) -> Node>;

/// How a reconciler turns an item into a node.
///
/// [`Render::indexed`] callbacks also receive a cell holding the item's
/// current position. The reconciler keeps that cell up to date as the item
/// moves.
pub enum Render<T> {
    Item(ItemFn<T>),
    Indexed(IndexedFn<T>),
}

impl<T> Render<T> {
    pub fn item<N, F>(render: F) -> Self
    where
        N: IntoNode,
        F: Fn(&T) -> N + 'static,
    {
        Render::Item(Rc::new(move |item| render(item).into_node()))
    }

    pub fn indexed<N, F>(render: F) -> Self
    where
        N: IntoNode,
        F: Fn(&T, Observable<usize>) -> N + 'static,
    {
        Render::Indexed(Rc::new(move |item, index| render(item, index).into_node()))
    }

    pub fn wants_index(&self) -> bool {
        matches!(self, Render::Indexed(_))
    }

    /// Render `item` at `index` into a single node.
    pub(crate) fn render(&self, item: &T, index: usize) -> Result<(Node, Option<Observable<usize>>)> {
        let (node, cell) = match self {
            Render::Item(render) => (render(item), None),
            Render::Indexed(render) => {
                let cell = Observable::new(index);
                (render(item, cell.clone()), Some(cell))
            }
        };
        match single_node(node) {
            Ok(node) => Ok((node, cell)),
            Err(err) => {
                if let Some(cell) = cell {
                    cell.cleanup();
                }
                Err(err)
            }
        }
    }

    /// Like [`render`](Self::render), but a failure is logged and replaced by
    /// an empty comment so the list stays aligned with its items.
    pub(crate) fn render_or_placeholder(
        &self,
        item: &T,
        index: usize,
    ) -> (Node, Option<Observable<usize>>) {
        self.render(item, index).unwrap_or_else(|err| {
            error!(index, error = %err, "render callback failed, inserting placeholder");
            (Node::comment(""), None)
        })
    }
}

impl<T> Clone for Render<T> {
    fn clone(&self) -> Self {
        match self {
            Render::Item(render) => Render::Item(Rc::clone(render)),
            Render::Indexed(render) => Render::Indexed(Rc::clone(render)),
        }
    }
}

/// A reconciled child must be one node. A fragment with a single child is
/// unwrapped.
fn single_node(node: Node) -> Result<Node> {
    if !node.is_fragment() {
        return Ok(node);
    }
    let children = node.children();
    if children.iter().all(Node::is_sentinel) {
        // Nothing at all, or an empty anchor range.
        return Err(Error::EmptyChild);
    }
    match children.len() {
        1 => {
            let child = node.first_child().ok_or(Error::EmptyChild)?;
            child.remove();
            Ok(child)
        }
        count => Err(Error::FragmentChild(count)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Anchor;

    #[test]
    fn item_render_has_no_index() {
        let render = Render::item(|value: &i32| value.to_string());
        let (node, index) = render.render(&3, 0).unwrap();
        assert_eq!(node.text_content(), "3");
        assert!(index.is_none());
    }

    #[test]
    fn indexed_render_gets_position() {
        let render = Render::indexed(|value: &i32, index: Observable<usize>| {
            format!("{}:{}", index.get(), value)
        });
        let (node, index) = render.render(&7, 2).unwrap();
        assert_eq!(node.text_content(), "2:7");
        assert_eq!(index.unwrap().get(), 2);
    }

    #[test]
    fn empty_fragment_is_rejected() {
        let render = Render::item(|_: &i32| Node::fragment());
        assert_eq!(render.render(&1, 0).unwrap_err(), Error::EmptyChild);
    }

    #[test]
    fn multi_node_fragment_is_rejected() {
        let render = Render::item(|_: &i32| Node::fragment_of(&[Node::text("a"), Node::text("b")]));
        assert_eq!(render.render(&1, 0).unwrap_err(), Error::FragmentChild(2));

        let anchor = Anchor::new("nested");
        anchor.append_child(&Node::text("x"), None);
        let render = Render::item(move |_: &i32| anchor.fragment());
        assert_eq!(render.render(&1, 0).unwrap_err(), Error::FragmentChild(3));
    }

    #[test]
    fn empty_anchor_range_is_empty() {
        let render = Render::item(|_: &i32| Anchor::new("inner").fragment());
        assert_eq!(render.render(&1, 0).unwrap_err(), Error::EmptyChild);
    }

    #[test]
    fn single_child_fragment_is_unwrapped() {
        let render = Render::item(|_: &i32| Node::fragment_of(&[Node::element("li")]));
        let (node, _) = render.render(&1, 0).unwrap();
        assert_eq!(node.tag(), Some("li"));
        assert!(node.parent().is_none());
    }

    #[test]
    fn placeholder_replaces_failures() {
        let render = Render::item(|_: &i32| Node::fragment());
        let (node, _) = render.render_or_placeholder(&1, 0);
        assert!(node.is_comment());
    }
}
