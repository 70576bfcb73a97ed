//! Filament Core
//!
//! This crate provides the core runtime for the Filament UI toolkit. It
//! implements:
//!
//! - Reactive primitives (observables, arrays, object proxies, computeds,
//!   batch gates)
//! - A weak registry that lets cells be referenced from plain strings
//! - Sentinel-bounded regions of a live document tree
//! - Keyed list reconcilers that turn array mutations into minimal tree edits
//! - A named store of shared cells
//!
//! There is no virtual DOM. Nothing in this crate ever compares two trees:
//! every edit is derived from a reported mutation.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Cells, operations and derived values
//! - `registry`: Weak index of cells and `{{#ObItem::(<id>)}}` templates
//! - `dom`: In-memory host tree and region anchors
//! - `list`: Keyed reconcilers (`ForEach`, `ForEachArray`)
//! - `store`: Named, process-wide cells with synced followers
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::dom::Node;
//! use filament_core::list::{ForEachArray, ReconcilerOptions, Render};
//! use filament_core::reactive::ObservableArray;
//!
//! let todos = ObservableArray::new(vec!["write".to_string(), "test".to_string()]);
//! let list = ForEachArray::new(
//!     &todos,
//!     Render::item(|todo: &String| Node::element("li").with_text(todo)),
//!     ReconcilerOptions::new(),
//! )?;
//!
//! let ul = Node::element("ul");
//! ul.append_child(&list.fragment());
//!
//! todos.push("ship".to_string());
//! // Exactly one <li> was inserted; the other two were not touched.
//! ```

pub mod dom;
pub mod error;
pub mod list;
pub mod reactive;
pub mod registry;
pub mod store;

pub use error::{Error, ErrorKind, Result};
pub use reactive::{computed, Batch, Computed, Observable, ObservableArray, ObservableProxy};
pub use registry::MemoryManager;
pub use store::Store;
