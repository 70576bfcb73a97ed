//! Operation-Aware Keyed Reconciler
//!
//! [`ForEachArray`] follows an [`ObservableArray`] and turns each reported
//! [`ArrayOperation`] into the matching minimal tree edit. It never rebuilds
//! the whole list for an operation that touches a few items.
//!
//! # Edits per Operation
//!
//! - `push`, `merge`, `populate`: render and append the new tail only.
//! - `unshift`: render the new head and insert it before the first node.
//! - `pop`, `shift`, `remove`: drop one node.
//! - `splice`: drop exactly the deleted range, insert the new range at
//!   `start`.
//! - `swap`: exchange two nodes; nothing else moves.
//! - `sort`, `reverse`, replacement: reorder the existing nodes by key and
//!   render only unknown keys.
//! - `clear`: one bulk clear of the anchor.
//!
//! Index cells are updated from the earliest affected position forward, and
//! only where the position actually changed.
//!
//! # Invariants
//!
//! `slots[i]` always belongs to `items[i]`. If an operation ever leaves the
//! two out of step, the reconciler falls back to a keyed reorder against the
//! current items.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{error, trace, warn};

use super::cache::{Entry, KeyedCache};
use super::key::{ItemKey, Key};
use super::options::ReconcilerOptions;
use super::render::Render;
use crate::dom::{Anchor, Node};
use crate::error::Result;
use crate::reactive::{ArrayOperation, ObservableArray, Subscription};

struct Slot {
    key: Key,
    entry: Entry,
}

struct State<E> {
    anchor: Anchor,
    render: Render<E>,
    options: ReconcilerOptions<E>,
    slots: Vec<Slot>,
    /// Entries kept for vanished keys when the options ask for it.
    retained: KeyedCache,
    this: Weak<RefCell<State<E>>>,
}

impl<E> State<E>
where
    E: Clone + PartialEq + ItemKey + 'static,
{
    fn produce(&mut self, item: &E, index: usize, strict: bool) -> Result<Slot> {
        let key = self.options.key_of(item, index);
        if self.options.keep_items_in_cache {
            if let Some(entry) = self.retained.take(&key) {
                entry.move_to(index);
                return Ok(Slot { key, entry });
            }
        }
        let (node, cell) = if strict {
            self.render.render(item, index)?
        } else {
            self.render.render_or_placeholder(item, index)
        };
        Ok(Slot {
            key,
            entry: Entry { node, index: cell },
        })
    }

    fn produce_range(&mut self, start: usize, items: &[E]) -> Vec<Slot> {
        items
            .iter()
            .enumerate()
            .filter_map(|(offset, item)| self.produce(item, start + offset, false).ok())
            .collect()
    }

    fn evict(&mut self, slot: Slot) {
        if self.options.keep_items_in_cache {
            slot.entry.node.remove();
            self.retained.insert(slot.key, slot.entry);
        } else {
            slot.entry.release();
        }
    }

    fn reindex_from(&self, start: usize) {
        for (position, slot) in self.slots.iter().enumerate().skip(start) {
            slot.entry.move_to(position);
        }
    }

    /// First attached node at or after `position`, to insert before.
    fn reference_at(&self, position: usize) -> Option<Node> {
        self.slots
            .iter()
            .skip(position)
            .map(|slot| &slot.entry.node)
            .find(|node| node.parent().is_some())
            .cloned()
    }

    fn build(&mut self, items: &[E]) -> Result<()> {
        let mut slots = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            slots.push(self.produce(item, index, true)?);
        }
        let nodes: Vec<Node> = slots.iter().map(|slot| slot.entry.node.clone()).collect();
        self.anchor.append_all(&nodes);
        self.slots = slots;
        Ok(())
    }

    /// Render `items` into slots at `start` and put their nodes in the tree,
    /// now or after `delay`.
    fn insert_range(&mut self, start: usize, items: &[E], delay: Option<Duration>) {
        let start = start.min(self.slots.len());
        let fresh = self.produce_range(start, items);
        let nodes: Vec<Node> = fresh.iter().map(|slot| slot.entry.node.clone()).collect();
        let count = fresh.len();
        self.slots.splice(start..start, fresh);

        let deferred = match delay {
            Some(delay) => self.schedule_insert(&nodes, delay),
            None => false,
        };
        if !deferred {
            self.attach(start, count, &nodes);
        }
    }

    fn attach(&self, start: usize, count: usize, nodes: &[Node]) {
        let reference = self.reference_at(start + count);
        match nodes {
            [] => {}
            [node] => self.anchor.append_child(node, reference.as_ref()),
            _ => self
                .anchor
                .append_child(&Node::fragment_of(nodes), reference.as_ref()),
        }
    }

    /// Insert `nodes` after `delay` on the current local task set. Returns
    /// `false` when no local task set is running and nothing was scheduled.
    fn schedule_insert(&self, nodes: &[Node], delay: Duration) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("push delay requested outside a tokio runtime, inserting now");
            return false;
        }

        let state = self.this.clone();
        let pending = nodes.to_vec();
        // spawn_local panics when no LocalSet is active.
        let spawned = panic::catch_unwind(AssertUnwindSafe(move || {
            tokio::task::spawn_local(async move {
                tokio::time::sleep(delay).await;
                let Some(state) = state.upgrade() else {
                    return;
                };
                match state.try_borrow() {
                    Ok(state) => state.attach_deferred(&pending),
                    Err(_) => warn!("deferred insertion skipped, reconciler busy"),
                };
            })
        }));

        match spawned {
            Ok(_) => {
                trace!(count = nodes.len(), ?delay, "deferring pushed nodes");
                true
            }
            Err(_) => {
                warn!("push delay requested outside a tokio LocalSet, inserting now");
                false
            }
        }
    }

    fn attach_deferred(&self, nodes: &[Node]) {
        for node in nodes {
            if node.parent().is_some() {
                continue;
            }
            // Evicted before the timer fired.
            let Some(position) = self
                .slots
                .iter()
                .position(|slot| slot.entry.node.ptr_eq(node))
            else {
                continue;
            };
            let reference = self.reference_at(position + 1);
            self.anchor.append_child(node, reference.as_ref());
        }
    }

    fn append_tail(&mut self, items: &[E], count: usize) {
        let start = items.len().saturating_sub(count);
        let tail = &items[start..];
        let delay = self.options.delay_for(tail);
        self.insert_range(start, tail, delay);
    }

    fn remove_at(&mut self, index: usize) {
        if index < self.slots.len() {
            let slot = self.slots.remove(index);
            self.evict(slot);
            self.reindex_from(index);
        }
    }

    fn apply(&mut self, items: &[E], operation: &ArrayOperation<E>) {
        trace!(
            anchor = %self.anchor.name(),
            action = %operation.action(),
            "for_each_array operation"
        );

        match operation {
            ArrayOperation::Push { items: pushed, .. } => self.append_tail(items, pushed.len()),
            ArrayOperation::Merge { items: merged } => self.append_tail(items, merged.len()),
            ArrayOperation::Populate { count } => self.append_tail(items, *count),
            ArrayOperation::Unshift { items: added, .. } => {
                let count = added.len().min(items.len());
                self.insert_range(0, &items[..count], None);
                self.reindex_from(count);
            }
            ArrayOperation::Pop { .. } => {
                if let Some(slot) = self.slots.pop() {
                    self.evict(slot);
                }
            }
            ArrayOperation::Shift { .. } => self.remove_at(0),
            ArrayOperation::Remove { index, .. } => self.remove_at(*index),
            ArrayOperation::Splice {
                start,
                delete_count,
                items: inserted,
                ..
            } => {
                let start = (*start).min(self.slots.len());
                let end = (start + delete_count).min(self.slots.len());
                let removed: Vec<Slot> = self.slots.drain(start..end).collect();
                for slot in removed {
                    self.evict(slot);
                }
                let stop = (start + inserted.len()).min(items.len());
                self.insert_range(start, &items[start.min(stop)..stop], None);
                self.reindex_from(stop);
            }
            ArrayOperation::Swap { a, b, .. } => {
                let (a, b) = (*a, *b);
                if a < self.slots.len() && b < self.slots.len() {
                    self.slots.swap(a, b);
                    self.slots[a].entry.node.swap_with(&self.slots[b].entry.node);
                    self.slots[a].entry.move_to(a);
                    self.slots[b].entry.move_to(b);
                }
            }
            ArrayOperation::Sort | ArrayOperation::Reverse | ArrayOperation::Replace => {
                self.reorder(items);
            }
            ArrayOperation::Clear => {
                self.anchor.remove_children();
                let cleared: Vec<Slot> = self.slots.drain(..).collect();
                for slot in cleared {
                    self.evict(slot);
                }
            }
        }

        if self.slots.len() != items.len() {
            warn!(
                slots = self.slots.len(),
                items = items.len(),
                action = %operation.action(),
                "reconciler out of step with its array, reordering"
            );
            self.reorder(items);
        }
    }

    /// Match the current items against existing nodes by key.
    fn reorder(&mut self, items: &[E]) {
        let mut previous = KeyedCache::default();
        for slot in self.slots.drain(..) {
            previous.insert(slot.key, slot.entry);
        }

        let mut slots = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key = self.options.key_of(item, index);
            let slot = match previous.take(&key) {
                Some(entry) => {
                    entry.move_to(index);
                    Slot { key, entry }
                }
                None => match self.produce(item, index, false) {
                    Ok(slot) => slot,
                    Err(_) => continue,
                },
            };
            slots.push(slot);
        }
        self.slots = slots;

        let nodes: Vec<Node> = self.slots.iter().map(|slot| slot.entry.node.clone()).collect();
        self.anchor.replace_all(&nodes);

        let leftovers: Vec<(Key, Entry)> = previous.drain().collect();
        for (key, entry) in leftovers {
            self.evict(Slot { key, entry });
        }
    }

    fn dispose(&mut self) {
        self.anchor.remove_children();
        for slot in self.slots.drain(..) {
            slot.entry.release();
        }
        for (_, entry) in self.retained.drain() {
            entry.release();
        }
    }
}

/// Keyed reconciler driven by array operations.
///
/// # Example
///
/// ```rust,ignore
/// let rows = ObservableArray::new(vec!["a", "b", "c"]);
/// let list = ForEachArray::new(&rows, Render::item(|s: &&str| *s), ReconcilerOptions::new())?;
/// parent.append_child(&list.fragment());
///
/// rows.splice(1, 1, vec!["d"]);
/// // Tree: a d c. "b" was removed; "a" and "c" were not touched.
/// ```
pub struct ForEachArray<E> {
    state: Rc<RefCell<State<E>>>,
    anchor: Anchor,
    subscription: RefCell<Option<Subscription>>,
}

impl<E> ForEachArray<E>
where
    E: Clone + PartialEq + ItemKey + 'static,
{
    /// Render `array` and follow its operations.
    ///
    /// Render failures during this first build are returned. Failures while
    /// applying later operations are logged and leave an empty placeholder.
    pub fn new(
        array: &ObservableArray<E>,
        render: Render<E>,
        options: ReconcilerOptions<E>,
    ) -> Result<Self> {
        let anchor = Anchor::new("ForEachArray");
        let state = Rc::new_cyclic(|this| {
            RefCell::new(State {
                anchor: anchor.clone(),
                render,
                options,
                slots: Vec::new(),
                retained: KeyedCache::default(),
                this: this.clone(),
            })
        });

        array.with(|items| state.borrow_mut().build(items))?;

        let listener = Rc::downgrade(&state);
        let subscription = array.subscribe_operations(move |items, operation| {
            let Some(state) = listener.upgrade() else {
                return;
            };
            match state.try_borrow_mut() {
                Ok(mut state) => state.apply(items, operation),
                Err(_) => error!(
                    action = %operation.action(),
                    "re-entrant array operation skipped by reconciler"
                ),
            };
        });

        Ok(Self {
            state,
            anchor,
            subscription: RefCell::new(Some(subscription)),
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
        self.state
            .borrow()
            .slots
            .iter()
            .find(|slot| slot.key == *key)
            .map(|slot| slot.entry.node.clone())
    }

    /// Keys in array order.
    pub fn keys(&self) -> Vec<Key> {
        self.state
            .borrow()
            .slots
            .iter()
            .map(|slot| slot.key.clone())
            .collect()
    }

    /// Nodes in array order, including any whose insertion is deferred.
    pub fn nodes(&self) -> Vec<Node> {
        self.state
            .borrow()
            .slots
            .iter()
            .map(|slot| slot.entry.node.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held, rendered or retained.
    pub fn cache_len(&self) -> usize {
        let state = self.state.borrow();
        state.slots.len() + state.retained.len()
    }

    /// Stop following the array and release every node.
    pub fn dispose(&self) {
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.unsubscribe();
        }
        self.state.borrow_mut().dispose();
    }
}

impl<E> Drop for ForEachArray<E> {
    /// Stops following the array. Mounted nodes stay where they are; call
    /// [`dispose`](ForEachArray::dispose) to remove them as well.
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.unsubscribe();
        }
    }
}

impl<E> Debug for ForEachArray<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEachArray")
            .field("anchor", &self.anchor)
            .field("len", &self.state.borrow().slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::IntoNode;
    use crate::reactive::Observable;
    use std::cell::Cell;

    fn letters(items: &[&str]) -> ObservableArray<String> {
        ObservableArray::new(items.iter().map(|s| s.to_string()).collect())
    }

    fn mounted(
        array: &ObservableArray<String>,
        options: ReconcilerOptions<String>,
    ) -> (Node, ForEachArray<String>) {
        let list = ForEachArray::new(array, Render::item(|s: &String| s.clone()), options).unwrap();
        let host = Node::element("ul");
        host.append_child(&list.fragment());
        (host, list)
    }

    fn node(list: &ForEachArray<String>, key: &str) -> Node {
        list.node_for_key(&Key::from(key)).unwrap()
    }

    fn tree(list: &ForEachArray<String>) -> Vec<String> {
        list.anchor()
            .children()
            .iter()
            .map(Node::text_content)
            .collect()
    }

    #[test]
    fn push_appends_only_new_nodes() {
        let array = letters(&["a", "b"]);
        let (host, list) = mounted(&array, ReconcilerOptions::new());
        let node_a = node(&list, "a");
        let edits = host.mutation_count();

        array.push_all(vec!["c".to_string(), "d".to_string()]);

        assert_eq!(tree(&list), vec!["a", "b", "c", "d"]);
        assert_eq!(host.mutation_count(), edits + 1);
        assert!(node(&list, "a").ptr_eq(&node_a));
    }

    #[test]
    fn splice_replaces_exact_range() {
        let array = letters(&["A", "B", "C"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());
        let (n_a, n_b, n_c) = (node(&list, "A"), node(&list, "B"), node(&list, "C"));

        array.splice(1, 1, vec!["D".to_string()]);

        let children = list.anchor().children();
        assert_eq!(tree(&list), vec!["A", "D", "C"]);
        assert!(children[0].ptr_eq(&n_a));
        assert!(children[2].ptr_eq(&n_c));
        assert!(n_b.parent().is_none());
        assert!(list.node_for_key(&Key::from("B")).is_none());
        assert_eq!(list.cache_len(), 3);
    }

    #[test]
    fn swap_moves_two_nodes_and_keeps_identity() {
        let array = letters(&["A", "B", "C"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());
        let (n_a, n_b, n_c) = (node(&list, "A"), node(&list, "B"), node(&list, "C"));

        array.swap(0, 2).unwrap();

        let children = list.anchor().children();
        assert!(children[0].ptr_eq(&n_c));
        assert!(children[1].ptr_eq(&n_b));
        assert!(children[2].ptr_eq(&n_a));
        assert!(node(&list, "A").ptr_eq(&n_a));
        assert!(node(&list, "C").ptr_eq(&n_c));
    }

    #[test]
    fn pop_shift_and_remove() {
        let array = letters(&["a", "b", "c", "d", "e"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());

        array.pop();
        array.shift();
        array.remove(1);

        assert_eq!(tree(&list), vec!["b", "d"]);
        assert_eq!(list.keys(), vec![Key::from("b"), Key::from("d")]);
    }

    #[test]
    fn unshift_inserts_before_first() {
        let array = letters(&["c"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());

        array.unshift(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tree(&list), vec!["a", "b", "c"]);
    }

    #[test]
    fn sort_and_reverse_reuse_nodes() {
        let array = letters(&["b", "c", "a"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());
        let before: Vec<Node> = list.nodes();

        array.sort();
        assert_eq!(tree(&list), vec!["a", "b", "c"]);
        array.reverse();
        assert_eq!(tree(&list), vec!["c", "b", "a"]);

        for node in before {
            assert!(list.nodes().iter().any(|n| n.ptr_eq(&node)));
        }
    }

    #[test]
    fn index_cells_track_positions() {
        let array = letters(&["b", "c", "a"]);
        let renders = Rc::new(Cell::new(0));
        let renders_clone = renders.clone();
        let list = ForEachArray::new(
            &array,
            Render::indexed(move |s: &String, index: Observable<usize>| {
                renders_clone.set(renders_clone.get() + 1);
                Node::element("li")
                    .with_text(s.as_str())
                    .with_child(&index.into_node())
            }),
            ReconcilerOptions::new(),
        )
        .unwrap();
        let host = Node::element("ol");
        host.append_child(&list.fragment());

        array.sort();
        assert_eq!(host.text_content(), "a0b1c2");
        array.reverse();
        assert_eq!(host.text_content(), "c0b1a2");
        array.splice(0, 1, Vec::new());
        assert_eq!(host.text_content(), "b0a1");
        array.unshift(vec!["z".to_string()]);
        assert_eq!(host.text_content(), "z0b1a2");
        assert_eq!(renders.get(), 4);
    }

    #[test]
    fn clear_uses_bulk_path() {
        let array = letters(&["a", "b", "c"]);
        let (host, list) = mounted(&array, ReconcilerOptions::new());
        let edits = host.mutation_count();

        array.clear();

        assert_eq!(host.mutation_count(), edits + 1);
        assert!(list.is_empty());
        assert!(list.anchor().is_empty());
    }

    #[test]
    fn kept_items_come_back_with_the_same_node() {
        let array = letters(&["a", "b"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new().keep_items_in_cache(true));
        let node_b = node(&list, "b");

        array.pop();
        assert_eq!(list.cache_len(), 2);
        assert!(node_b.parent().is_none());

        array.push("b".to_string());
        assert!(node(&list, "b").ptr_eq(&node_b));
        assert_eq!(tree(&list), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_keys_do_not_alias() {
        let array = letters(&["x", "y", "x"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());
        let nodes = list.nodes();
        assert!(!nodes[0].ptr_eq(&nodes[2]));

        array.reverse();
        let after = list.nodes();
        assert!(after[0].ptr_eq(&nodes[0]));
        assert!(after[2].ptr_eq(&nodes[2]));
        assert_eq!(list.anchor().len(), 3);
    }

    #[test]
    fn populate_and_merge_append() {
        let array = letters(&[]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());

        array.populate_and_render(2, |i| format!("p{}", i));
        array.merge(vec!["m".to_string()]);
        assert_eq!(tree(&list), vec!["p0", "p1", "m"]);
    }

    #[test]
    fn replacement_reorders_by_key() {
        let array = letters(&["a", "b", "c"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());
        let node_c = node(&list, "c");

        array.set(vec!["c".to_string(), "d".to_string()]);
        assert_eq!(tree(&list), vec!["c", "d"]);
        assert!(node(&list, "c").ptr_eq(&node_c));
    }

    #[test]
    fn render_failure_after_build_leaves_placeholder() {
        let array = ObservableArray::new(vec![1, 2]);
        let list = ForEachArray::new(
            &array,
            Render::item(|value: &i32| {
                if *value < 0 {
                    Node::fragment()
                } else {
                    value.to_string().into_node()
                }
            }),
            ReconcilerOptions::new(),
        )
        .unwrap();
        let host = Node::element("div");
        host.append_child(&list.fragment());

        array.push(-1);
        assert_eq!(list.len(), 3);
        assert!(list.anchor().get_by_index(2).unwrap().is_comment());
    }

    #[test]
    fn dispose_unsubscribes() {
        let array = letters(&["a"]);
        let (_host, list) = mounted(&array, ReconcilerOptions::new());
        list.dispose();

        array.push("b".to_string());
        assert!(list.is_empty());
        assert!(list.anchor().is_empty());
        assert_eq!(array.observable().listener_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn push_delay_defers_insertion() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let array = letters(&["a"]);
                let (_host, list) = mounted(
                    &array,
                    ReconcilerOptions::new().push_delay(|_| Some(Duration::from_millis(20))),
                );

                array.push("b".to_string());
                assert_eq!(list.len(), 2);
                assert_eq!(tree(&list), vec!["a"]);

                tokio::time::sleep(Duration::from_millis(60)).await;
                assert_eq!(tree(&list), vec!["a", "b"]);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn push_delay_without_local_set_inserts_now() {
        let array = letters(&["a"]);
        let (_host, list) = mounted(
            &array,
            ReconcilerOptions::new().push_delay(|_| Some(Duration::from_millis(5))),
        );

        array.push("b".to_string());
        assert_eq!(tree(&list), vec!["a", "b"]);
        assert!(node(&list, "b").parent().is_some());
    }

    #[test]
    fn push_delay_outside_runtime_inserts_now() {
        let array = letters(&["a"]);
        let (_host, list) = mounted(
            &array,
            ReconcilerOptions::new().push_delay(|_| Some(Duration::from_millis(5))),
        );

        array.push("b".to_string());
        assert_eq!(tree(&list), vec!["a", "b"]);
    }

    #[test]
    fn dropping_the_reconciler_detaches_it() {
        let array = letters(&["a"]);
        let renders = Rc::new(Cell::new(0));
        let counter = Rc::clone(&renders);
        let list = ForEachArray::new(
            &array,
            Render::item(move |s: &String| {
                counter.set(counter.get() + 1);
                s.clone()
            }),
            ReconcilerOptions::new(),
        )
        .unwrap();
        let host = Node::element("ul");
        host.append_child(&list.fragment());
        assert_eq!(array.observable().listener_count(), 1);

        drop(list);
        assert_eq!(array.observable().listener_count(), 0);

        array.push("b".to_string());
        assert_eq!(renders.get(), 1);
        // Mounted content is left in place.
        assert_eq!(host.text_content(), "a");
    }
}
