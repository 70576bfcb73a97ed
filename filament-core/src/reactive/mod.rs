//! Reactive Primitives
//!
//! This module implements the reactive engine: observable cells, array
//! cells, object proxies, computed cells and batch gates. Everything that
//! renders or reconciles in Filament is driven from here.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] holds a value and notifies its listeners synchronously
//! whenever `set` stores a different value. Watchers bound with `on` fire
//! only when the cell enters or leaves one specific value.
//!
//! ## Arrays
//!
//! An [`ObservableArray`] reports every structural change as a typed
//! [`ArrayOperation`]. Listeners never diff two sequences to learn what
//! changed, which is what lets the list reconcilers do minimal edits.
//!
//! ## Proxies
//!
//! An [`ObservableProxy`] is a fixed-shape record of cells built from JSON
//! data. Nested objects become nested proxies.
//!
//! ## Computeds and Batches
//!
//! A [`Computed`] re-evaluates when one of its explicit dependencies
//! dispatches. A [`Batch`] collapses a run of mutations into one trigger.
//!
//! # Implementation Notes
//!
//! Dependencies are declared, never tracked by reading. Cells are `Rc` based
//! and stay on the thread that created them.

mod array;
mod batch;
mod computed;
pub(crate) mod observable;
mod plugins;
mod proxy;
mod subscriber;

pub use array::{Action, ArrayOperation, ObservableArray};
pub use batch::Batch;
pub use computed::{computed, computed_batched, Computed, Dependency};
pub use observable::{CellId, Change, DispatchMode, Observable};
pub use plugins::{PluginEvent, Plugins};
pub use proxy::{ObservableProxy, ProxyField};
pub use subscriber::{SubscriberId, Subscription};

