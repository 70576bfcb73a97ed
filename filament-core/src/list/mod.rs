//! Keyed List Reconcilers
//!
//! Two reconcilers render collections into an [`Anchor`](crate::dom::Anchor)
//! and keep node identity per key:
//!
//! - [`ForEach`] accepts static or reactive vectors and maps, and rebuilds
//!   the key order on every change while reusing nodes.
//! - [`ForEachArray`] follows an [`ObservableArray`](crate::reactive::ObservableArray)
//!   and applies each reported operation as a minimal edit.
//!
//! Both share key resolution ([`ItemKey`]), render callbacks ([`Render`]) and
//! options ([`ReconcilerOptions`]).

mod cache;
mod for_each;
mod for_each_array;
mod key;
mod options;
mod render;

pub use for_each::{ForEach, Source};
pub use for_each_array::ForEachArray;
pub use key::{ItemKey, Key, KeyFn};
pub use options::{PushDelay, ReconcilerFlags, ReconcilerOptions};
pub use render::Render;
