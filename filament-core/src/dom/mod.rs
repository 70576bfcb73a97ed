//! Host Tree
//!
//! The reconcilers edit a live document tree. This module provides a small
//! in-memory one ([`Node`]), the conversion boundary from render output to
//! nodes ([`IntoNode`]) and sentinel-bounded regions ([`Anchor`]).

mod anchor;
mod into_node;
mod node;

pub use anchor::Anchor;
pub use into_node::IntoNode;
pub use node::{Node, NodeId, NodeKind, WeakNode};
