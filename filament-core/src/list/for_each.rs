//! Keyed Reconciler for Generic Collections
//!
//! [`ForEach`] renders a collection into an [`Anchor`] and keeps it in sync.
//! The collection may be a plain vector or map, or a reactive source of
//! either.
//!
//! # How a Rebuild Works
//!
//! 1. The ordered key list is recomputed from the current items.
//!
//! 2. Each key takes its node from the previous build when there is one.
//!    The node is reused as is; only its index cell moves, and only if the
//!    position changed.
//!
//! 3. Keys without a node are rendered.
//!
//! 4. The first build appends everything in one edit. Later builds replace
//!    the anchor's content with the nodes in their new order.
//!
//! 5. Entries whose key vanished are released, unless the options keep them
//!    cached for a possible return.
//!
//! Reactive sources rebuild on every change. Use
//! [`ForEachArray`](super::ForEachArray) to get minimal edits from array
//! operations instead.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{error, trace};

use super::cache::{Entry, KeyedCache};
use super::key::{ItemKey, Key};
use super::options::ReconcilerOptions;
use super::render::Render;
use crate::dom::{Anchor, Node};
use crate::error::Result;
use crate::reactive::{Observable, ObservableArray, Subscription};

/// Collections a [`ForEach`] can render.
pub enum Source<T> {
    Static(Vec<T>),
    Cell(Observable<Vec<T>>),
    Array(ObservableArray<T>),
    /// String-keyed map; the map key is the item key.
    Map(IndexMap<String, T>),
    MapCell(Observable<IndexMap<String, T>>),
}

impl<T> From<Vec<T>> for Source<T> {
    fn from(items: Vec<T>) -> Self {
        Source::Static(items)
    }
}

impl<T> From<Observable<Vec<T>>> for Source<T> {
    fn from(cell: Observable<Vec<T>>) -> Self {
        Source::Cell(cell)
    }
}

impl<T> From<&Observable<Vec<T>>> for Source<T> {
    fn from(cell: &Observable<Vec<T>>) -> Self {
        Source::Cell(cell.clone())
    }
}

impl<T> From<ObservableArray<T>> for Source<T> {
    fn from(array: ObservableArray<T>) -> Self {
        Source::Array(array)
    }
}

impl<T> From<&ObservableArray<T>> for Source<T> {
    fn from(array: &ObservableArray<T>) -> Self {
        Source::Array(array.clone())
    }
}

impl<T> From<IndexMap<String, T>> for Source<T> {
    fn from(map: IndexMap<String, T>) -> Self {
        Source::Map(map)
    }
}

impl<T> From<Observable<IndexMap<String, T>>> for Source<T> {
    fn from(cell: Observable<IndexMap<String, T>>) -> Self {
        Source::MapCell(cell)
    }
}

impl<T> From<&Observable<IndexMap<String, T>>> for Source<T> {
    fn from(cell: &Observable<IndexMap<String, T>>) -> Self {
        Source::MapCell(cell.clone())
    }
}

struct State<T> {
    anchor: Anchor,
    render: Render<T>,
    options: ReconcilerOptions<T>,
    /// Live entries first, then retained ones.
    cache: KeyedCache,
    order: Vec<Key>,
    built: bool,
}

impl<T> State<T>
where
    T: ItemKey + 'static,
{
    fn sync_list(&mut self, items: &[T], strict: bool) -> Result<()> {
        let keyed = items
            .iter()
            .enumerate()
            .map(|(index, item)| (self.options.key_of(item, index), item))
            .collect();
        self.rebuild(keyed, strict)
    }

    fn sync_map(&mut self, map: &IndexMap<String, T>, strict: bool) -> Result<()> {
        let keyed = map
            .iter()
            .enumerate()
            .map(|(index, (name, item))| {
                let key = match &self.options.key_fn {
                    Some(key) => key(item, index),
                    None => Key::Str(name.clone()),
                };
                (key, item)
            })
            .collect();
        self.rebuild(keyed, strict)
    }

    fn rebuild(&mut self, keyed: Vec<(Key, &T)>, strict: bool) -> Result<()> {
        let mut previous = std::mem::take(&mut self.cache);
        let mut next = KeyedCache::default();
        let mut nodes = Vec::with_capacity(keyed.len());
        let mut order = Vec::with_capacity(keyed.len());
        let mut rendered = 0usize;

        for (index, (key, item)) in keyed.into_iter().enumerate() {
            let entry = match previous.take(&key) {
                Some(entry) => {
                    entry.move_to(index);
                    entry
                }
                None => {
                    rendered += 1;
                    let (node, cell) = if strict {
                        self.render.render(item, index)?
                    } else {
                        self.render.render_or_placeholder(item, index)
                    };
                    Entry { node, index: cell }
                }
            };
            nodes.push(entry.node.clone());
            order.push(key.clone());
            next.insert(key, entry);
        }

        if self.built {
            self.anchor.replace_all(&nodes);
        } else {
            self.anchor.append_all(&nodes);
            self.built = true;
        }

        let stale = previous.len();
        if self.options.keep_items_in_cache {
            next.absorb(previous);
        } else {
            for (_, entry) in previous.drain() {
                entry.release();
            }
        }
        trace!(
            anchor = %self.anchor.name(),
            items = nodes.len(),
            rendered,
            stale,
            "for_each rebuild"
        );

        self.cache = next;
        self.order = order;
        Ok(())
    }

    fn dispose(&mut self) {
        self.anchor.remove_children();
        for (_, entry) in self.cache.drain() {
            entry.release();
        }
        self.order.clear();
    }
}

/// Run `sync` against the state if the reconciler is still alive.
fn update<T>(state: &Weak<RefCell<State<T>>>, sync: impl FnOnce(&mut State<T>) -> Result<()>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let result = match state.try_borrow_mut() {
        Ok(mut state) => sync(&mut state),
        Err(_) => {
            error!("re-entrant for_each update skipped");
            return;
        }
    };
    if let Err(err) = result {
        error!(error = %err, "for_each update failed");
    }
}

/// Keyed reconciler over a static or reactive collection.
///
/// # Example
///
/// ```rust,ignore
/// let names = Observable::new(vec!["a".to_string(), "b".to_string()]);
/// let list = ForEach::new(&names, Render::item(|n: &String| n.clone()), ReconcilerOptions::new())?;
/// parent.append_child(&list.fragment());
///
/// names.set(vec!["b".to_string(), "c".to_string()]);
/// // "b" kept its node, "a" was released, "c" was rendered.
/// ```
pub struct ForEach<T> {
    state: Rc<RefCell<State<T>>>,
    anchor: Anchor,
    subscription: RefCell<Option<Subscription>>,
}

impl<T> ForEach<T>
where
    T: Clone + PartialEq + ItemKey + 'static,
{
    /// Render `source` and follow it if it is reactive.
    ///
    /// Render failures during this first build are returned. Failures in
    /// later rebuilds are logged and leave an empty placeholder behind.
    pub fn new(
        source: impl Into<Source<T>>,
        render: Render<T>,
        options: ReconcilerOptions<T>,
    ) -> Result<Self> {
        let anchor = Anchor::new("ForEach");
        let state = Rc::new(RefCell::new(State {
            anchor: anchor.clone(),
            render,
            options,
            cache: KeyedCache::default(),
            order: Vec::new(),
            built: false,
        }));

        let subscription = match source.into() {
            Source::Static(items) => {
                state.borrow_mut().sync_list(&items, true)?;
                None
            }
            Source::Map(map) => {
                state.borrow_mut().sync_map(&map, true)?;
                None
            }
            Source::Cell(cell) => {
                cell.with(|items| state.borrow_mut().sync_list(items, true))?;
                let state = Rc::downgrade(&state);
                Some(cell.subscribe(move |items, _| {
                    update(&state, |state| state.sync_list(items, false))
                }))
            }
            Source::Array(array) => {
                array.with(|items| state.borrow_mut().sync_list(items, true))?;
                let state = Rc::downgrade(&state);
                Some(array.subscribe(move |items| {
                    update(&state, |state| state.sync_list(items, false))
                }))
            }
            Source::MapCell(cell) => {
                cell.with(|map| state.borrow_mut().sync_map(map, true))?;
                let state = Rc::downgrade(&state);
                Some(cell.subscribe(move |map, _| {
                    update(&state, |state| state.sync_map(map, false))
                }))
            }
        };

        Ok(Self {
            state,
            anchor,
            subscription: RefCell::new(subscription),
        })
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    /// The anchor's holding fragment; insert it into a parent to mount.
    pub fn fragment(&self) -> Node {
        self.anchor.fragment()
    }

    /// Node currently rendered for `key`.
    pub fn node_for_key(&self, key: &Key) -> Option<Node> {
        let state = self.state.borrow();
        if !state.order.contains(key) {
            return None;
        }
        state.cache.node(key)
    }

    /// Keys in render order.
    pub fn keys(&self) -> Vec<Key> {
        self.state.borrow().order.clone()
    }

    /// Number of rendered items.
    pub fn len(&self) -> usize {
        self.state.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held, rendered or retained.
    pub fn cache_len(&self) -> usize {
        self.state.borrow().cache.len()
    }

    /// Stop following the source and release every node.
    pub fn dispose(&self) {
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.unsubscribe();
        }
        self.state.borrow_mut().dispose();
    }
}

impl<T> Drop for ForEach<T> {
    /// Stops following the source. Mounted nodes stay where they are; call
    /// [`dispose`](ForEach::dispose) to remove them as well.
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.unsubscribe();
        }
    }
}

impl<T> Debug for ForEach<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEach")
            .field("anchor", &self.anchor)
            .field("len", &self.state.borrow().order.len())
            .finish()
    }
}
