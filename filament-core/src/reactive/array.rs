//! Observable Arrays
//!
//! An [`ObservableArray`] is a cell whose value is a `Vec<E>`. Every mutating
//! method edits the vector in place and then dispatches exactly once with an
//! [`ArrayOperation`] describing what happened. Listeners never have to diff
//! the before and after sequences to learn what changed.
//!
//! Reads (`len`, `get`, `map`, `filter`, `reduce`, ...) go straight to the
//! current vector and never dispatch.
//!
//! A mutation that changes nothing (popping an empty array, clearing an
//! empty array, pushing zero items, removing a missing index) does not
//! dispatch.

use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use super::computed::Dependency;
use super::observable::{Change, Observable};
use super::plugins::{PluginEvent, Plugins};
use super::subscriber::Subscription;
use crate::error::{Error, Result};

/// Name of an array mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Push,
    Pop,
    Shift,
    Unshift,
    Reverse,
    Sort,
    Splice,
    Clear,
    Remove,
    Swap,
    Merge,
    Populate,
    Replace,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Push => "push",
            Action::Pop => "pop",
            Action::Shift => "shift",
            Action::Unshift => "unshift",
            Action::Reverse => "reverse",
            Action::Sort => "sort",
            Action::Splice => "splice",
            Action::Clear => "clear",
            Action::Remove => "remove",
            Action::Swap => "swap",
            Action::Merge => "merge",
            Action::Populate => "populate",
            Action::Replace => "replace",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation descriptor attached to every array dispatch: the action, its
/// arguments and its result.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayOperation<E> {
    /// Items appended at the end; `new_len` is the resulting length.
    Push { items: Vec<E>, new_len: usize },
    Pop { removed: E },
    Shift { removed: E },
    /// Items inserted at the front.
    Unshift { items: Vec<E>, new_len: usize },
    Reverse,
    Sort,
    /// `delete_count` items removed at `start`, then `items` inserted there.
    /// Both bounds are already clamped to the array.
    Splice {
        start: usize,
        delete_count: usize,
        items: Vec<E>,
        removed: Vec<E>,
    },
    Clear,
    Remove { index: usize, removed: E },
    /// Positions `a` and `b` exchanged; `items` holds the elements now at
    /// `a` and `b`.
    Swap { a: usize, b: usize, items: (E, E) },
    /// Items appended at the end in one go.
    Merge { items: Vec<E> },
    /// `count` generated items appended at the end.
    Populate { count: usize },
    /// Whole content replaced.
    Replace,
}

impl<E> ArrayOperation<E> {
    pub fn action(&self) -> Action {
        match self {
            ArrayOperation::Push { .. } => Action::Push,
            ArrayOperation::Pop { .. } => Action::Pop,
            ArrayOperation::Shift { .. } => Action::Shift,
            ArrayOperation::Unshift { .. } => Action::Unshift,
            ArrayOperation::Reverse => Action::Reverse,
            ArrayOperation::Sort => Action::Sort,
            ArrayOperation::Splice { .. } => Action::Splice,
            ArrayOperation::Clear => Action::Clear,
            ArrayOperation::Remove { .. } => Action::Remove,
            ArrayOperation::Swap { .. } => Action::Swap,
            ArrayOperation::Merge { .. } => Action::Merge,
            ArrayOperation::Populate { .. } => Action::Populate,
            ArrayOperation::Replace => Action::Replace,
        }
    }
}

/// A reactive `Vec<E>` reporting typed mutations.
pub struct ObservableArray<E> {
    cell: Observable<Vec<E>, ArrayOperation<E>>,
}

impl<E> ObservableArray<E>
where
    E: Clone + PartialEq + 'static,
{
    pub fn new(items: Vec<E>) -> Self {
        let cell = Observable::new(items);
        Plugins::emit(PluginEvent::ArrayCreated(cell.id()));
        Self { cell }
    }

    /// The underlying cell.
    pub fn observable(&self) -> &Observable<Vec<E>, ArrayOperation<E>> {
        &self.cell
    }

    fn apply<R>(&self, edit: impl FnOnce(&mut Vec<E>) -> R) -> R {
        self.cell.mutate(edit)
    }

    fn dispatch(&self, operation: ArrayOperation<E>) {
        let id = self.cell.id();
        trace!(cell = %id, action = %operation.action(), "array mutation");
        Plugins::emit(PluginEvent::BeforeChange(id));
        self.cell.trigger_with(operation);
        Plugins::emit(PluginEvent::AfterChange(id));
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.cell.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<E> {
        self.cell.with(|items| items.get(index).cloned())
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.cell.get()
    }

    /// Borrow the current items.
    pub fn with<R>(&self, f: impl FnOnce(&[E]) -> R) -> R {
        self.cell.with(|items| f(items))
    }

    pub fn map<R>(&self, f: impl FnMut(&E) -> R) -> Vec<R> {
        self.cell.with(|items| items.iter().map(f).collect())
    }

    pub fn filter(&self, mut predicate: impl FnMut(&E) -> bool) -> Vec<E> {
        self.cell
            .with(|items| items.iter().filter(|item| predicate(item)).cloned().collect())
    }

    pub fn reduce<A>(&self, init: A, f: impl FnMut(A, &E) -> A) -> A {
        self.cell.with(|items| items.iter().fold(init, f))
    }

    pub fn find(&self, mut predicate: impl FnMut(&E) -> bool) -> Option<E> {
        self.cell
            .with(|items| items.iter().find(|item| predicate(item)).cloned())
    }

    pub fn position(&self, predicate: impl FnMut(&E) -> bool) -> Option<usize> {
        self.cell.with(|items| items.iter().position(predicate))
    }

    pub fn contains(&self, value: &E) -> bool {
        self.cell.with(|items| items.contains(value))
    }

    pub fn count(&self, mut predicate: impl FnMut(&E) -> bool) -> usize {
        self.cell
            .with(|items| items.iter().filter(|item| predicate(item)).count())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append one item. Returns the new length.
    pub fn push(&self, item: E) -> usize {
        self.push_all(vec![item])
    }

    /// Append several items as a single `push`. Returns the new length.
    pub fn push_all(&self, items: Vec<E>) -> usize {
        if items.is_empty() {
            return self.len();
        }
        let new_len = self.apply(|vec| {
            vec.extend(items.iter().cloned());
            vec.len()
        });
        self.dispatch(ArrayOperation::Push { items, new_len });
        new_len
    }

    pub fn pop(&self) -> Option<E> {
        let removed = self.apply(Vec::pop)?;
        self.dispatch(ArrayOperation::Pop {
            removed: removed.clone(),
        });
        Some(removed)
    }

    pub fn shift(&self) -> Option<E> {
        let removed = self.apply(|vec| (!vec.is_empty()).then(|| vec.remove(0)))?;
        self.dispatch(ArrayOperation::Shift {
            removed: removed.clone(),
        });
        Some(removed)
    }

    /// Insert items at the front. Returns the new length.
    pub fn unshift(&self, items: Vec<E>) -> usize {
        if items.is_empty() {
            return self.len();
        }
        let new_len = self.apply(|vec| {
            vec.splice(0..0, items.iter().cloned());
            vec.len()
        });
        self.dispatch(ArrayOperation::Unshift { items, new_len });
        new_len
    }

    pub fn reverse(&self) {
        self.apply(|vec| vec.reverse());
        self.dispatch(ArrayOperation::Reverse);
    }

    pub fn sort(&self)
    where
        E: Ord,
    {
        self.sort_by(E::cmp);
    }

    /// Stable sort with a comparator.
    pub fn sort_by(&self, compare: impl FnMut(&E, &E) -> Ordering) {
        self.apply(|vec| vec.sort_by(compare));
        self.dispatch(ArrayOperation::Sort);
    }

    /// Remove `delete_count` items at `start` and insert `items` there.
    ///
    /// Out-of-range bounds are clamped. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<E>) -> Vec<E> {
        let (start, removed) = self.apply(|vec| {
            let start = start.min(vec.len());
            let end = start + delete_count.min(vec.len() - start);
            let removed: Vec<E> = vec.splice(start..end, items.iter().cloned()).collect();
            (start, removed)
        });
        if removed.is_empty() && items.is_empty() {
            return removed;
        }
        self.dispatch(ArrayOperation::Splice {
            start,
            delete_count: removed.len(),
            items,
            removed: removed.clone(),
        });
        removed
    }

    /// Remove every item.
    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.apply(Vec::clear);
        self.dispatch(ArrayOperation::Clear);
    }

    /// Remove the item at `index`.
    pub fn remove(&self, index: usize) -> Option<E> {
        let removed = self.apply(|vec| (index < vec.len()).then(|| vec.remove(index)))?;
        self.dispatch(ArrayOperation::Remove {
            index,
            removed: removed.clone(),
        });
        Some(removed)
    }

    /// Remove the first item equal to `value`.
    pub fn remove_item(&self, value: &E) -> Option<E> {
        let index = self.position(|item| item == value)?;
        self.remove(index)
    }

    /// Exchange the items at `a` and `b`.
    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        let len = self.len();
        if let Some(index) = [a, b].into_iter().find(|&index| index >= len) {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        if a == b {
            return Ok(());
        }
        let items = self.apply(|vec| {
            vec.swap(a, b);
            (vec[a].clone(), vec[b].clone())
        });
        self.dispatch(ArrayOperation::Swap { a, b, items });
        Ok(())
    }

    /// Append many items as a single `merge`.
    pub fn merge(&self, items: Vec<E>) {
        if items.is_empty() {
            return;
        }
        self.apply(|vec| vec.extend(items.iter().cloned()));
        self.dispatch(ArrayOperation::Merge { items });
    }

    /// Generate `count` items with `generate(i)` and append them, reported as
    /// one `populate` operation.
    pub fn populate_and_render(&self, count: usize, mut generate: impl FnMut(usize) -> E) {
        if count == 0 {
            return;
        }
        let generated: Vec<E> = (0..count).map(&mut generate).collect();
        self.apply(|vec| vec.extend(generated));
        self.dispatch(ArrayOperation::Populate { count });
    }

    /// Replace the whole content. Equal content does nothing.
    pub fn set(&self, items: Vec<E>) {
        self.cell.set_with_operation(items, ArrayOperation::Replace);
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Listen to the items after each mutation.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[E]) + 'static,
    {
        self.cell.subscribe_change(move |change| listener(change.value))
    }

    /// Listen to the items together with the operation that produced them.
    pub fn subscribe_operations<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[E], &ArrayOperation<E>) + 'static,
    {
        self.cell.subscribe_change(move |change: &Change<'_, Vec<E>, ArrayOperation<E>>| {
            match change.operation {
                Some(operation) => listener(change.value, operation),
                None => listener(change.value, &ArrayOperation::Replace),
            }
        })
    }

    pub fn cleanup(&self) {
        self.cell.cleanup();
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.cell.ptr_eq(&other.cell)
    }
}

impl ObservableArray<Value> {
    /// Build an array cell from a JSON value, which must be an array.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Self::new(items)),
            other => Err(Error::NotAnArray {
                found: json_type_name(&other),
            }),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl<E> Clone for ObservableArray<E> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<E> From<Vec<E>> for ObservableArray<E>
where
    E: Clone + PartialEq + 'static,
{
    fn from(items: Vec<E>) -> Self {
        Self::new(items)
    }
}

impl<E> Dependency for ObservableArray<E>
where
    E: Clone + PartialEq + 'static,
{
    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription {
        self.cell.watch(notify)
    }
}

impl<E> Debug for ObservableArray<E>
where
    E: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableArray")
            .field("id", &self.cell.id())
            .field("items", &self.to_vec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn record(array: &ObservableArray<i32>) -> (Rc<RefCell<Vec<ArrayOperation<i32>>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let sub = array.subscribe_operations(move |_, op| log_clone.borrow_mut().push(op.clone()));
        (log, sub)
    }

    #[test]
    fn push_reports_items_and_length_once() {
        let array = ObservableArray::new(vec![1, 2]);
        let (log, _sub) = record(&array);

        assert_eq!(array.push(3), 3);
        assert_eq!(
            *log.borrow(),
            vec![ArrayOperation::Push { items: vec![3], new_len: 3 }]
        );
        assert_eq!(log.borrow()[0].action().as_str(), "push");
    }

    #[test]
    fn pop_and_shift_report_removed_items() {
        let array = ObservableArray::new(vec![1, 2, 3]);
        let (log, _sub) = record(&array);

        assert_eq!(array.pop(), Some(3));
        assert_eq!(array.shift(), Some(1));
        assert_eq!(array.to_vec(), vec![2]);
        assert_eq!(
            *log.borrow(),
            vec![
                ArrayOperation::Pop { removed: 3 },
                ArrayOperation::Shift { removed: 1 },
            ]
        );
    }

    #[test]
    fn noop_mutations_do_not_dispatch() {
        let array: ObservableArray<i32> = ObservableArray::new(Vec::new());
        let (log, _sub) = record(&array);

        assert_eq!(array.pop(), None);
        assert_eq!(array.shift(), None);
        assert_eq!(array.remove(3), None);
        array.clear();
        array.merge(Vec::new());
        assert!(array.splice(0, 2, Vec::new()).is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn splice_clamps_and_reports() {
        let array = ObservableArray::new(vec![1, 2, 3, 4]);
        let (log, _sub) = record(&array);

        let removed = array.splice(2, 10, vec![9]);
        assert_eq!(removed, vec![3, 4]);
        assert_eq!(array.to_vec(), vec![1, 2, 9]);
        assert_eq!(
            log.borrow()[0],
            ArrayOperation::Splice {
                start: 2,
                delete_count: 2,
                items: vec![9],
                removed: vec![3, 4],
            }
        );
    }

    #[test]
    fn swap_validates_bounds() {
        let array = ObservableArray::new(vec![1, 2, 3]);
        let (log, _sub) = record(&array);

        array.swap(0, 2).unwrap();
        assert_eq!(array.to_vec(), vec![3, 2, 1]);
        assert_eq!(
            log.borrow()[0],
            ArrayOperation::Swap { a: 0, b: 2, items: (3, 1) }
        );

        let err = array.swap(1, 3).unwrap_err();
        assert_eq!(err, Error::IndexOutOfBounds { index: 3, len: 3 });
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn remove_item_delegates_to_remove() {
        let array = ObservableArray::new(vec![5, 6, 7]);
        let (log, _sub) = record(&array);

        assert_eq!(array.remove_item(&6), Some(6));
        assert_eq!(log.borrow()[0], ArrayOperation::Remove { index: 1, removed: 6 });
        assert_eq!(array.remove_item(&42), None);
    }

    #[test]
    fn populate_generates_items() {
        let array = ObservableArray::new(vec![0]);
        let (log, _sub) = record(&array);

        array.populate_and_render(3, |i| (i as i32 + 1) * 10);
        assert_eq!(array.to_vec(), vec![0, 10, 20, 30]);
        assert_eq!(log.borrow()[0], ArrayOperation::Populate { count: 3 });
    }

    #[test]
    fn set_reports_replace_and_skips_equal() {
        let array = ObservableArray::new(vec![1]);
        let (log, _sub) = record(&array);

        array.set(vec![1]);
        assert!(log.borrow().is_empty());

        array.set(vec![2, 3]);
        assert_eq!(log.borrow()[0], ArrayOperation::Replace);
    }

    #[test]
    fn sort_and_reverse_edit_in_place() {
        let array = ObservableArray::new(vec![3, 1, 2]);
        array.sort();
        assert_eq!(array.to_vec(), vec![1, 2, 3]);
        array.reverse();
        assert_eq!(array.to_vec(), vec![3, 2, 1]);
    }

    #[test]
    fn reads_do_not_dispatch() {
        let array = ObservableArray::new(vec![1, 2, 3, 4]);
        let (log, _sub) = record(&array);

        assert_eq!(array.map(|x| x * 2), vec![2, 4, 6, 8]);
        assert_eq!(array.filter(|x| x % 2 == 0), vec![2, 4]);
        assert_eq!(array.reduce(0, |acc, x| acc + x), 10);
        assert_eq!(array.find(|x| *x > 2), Some(3));
        assert_eq!(array.count(|x| *x > 1), 3);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn from_value_rejects_non_arrays() {
        let err = ObservableArray::from_value(json!({"a": 1})).unwrap_err();
        assert_eq!(err, Error::NotAnArray { found: "object" });
        assert_eq!(err.kind(), crate::error::ErrorKind::Argument);

        let array = ObservableArray::from_value(json!([1, "two"])).unwrap();
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn mutations_reach_plugins() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let events_clone = events.clone();
        Plugins::register("array-events", move |event| events_clone.borrow_mut().push(*event));

        let array = ObservableArray::new(vec![1]);
        let id = array.observable().id();
        array.push(2);
        array.swap(0, 1).unwrap();
        Plugins::unregister("array-events");

        let changes: Vec<PluginEvent> = events
            .borrow()
            .iter()
            .copied()
            .filter(|event| {
                matches!(event, PluginEvent::BeforeChange(_) | PluginEvent::AfterChange(_))
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                PluginEvent::BeforeChange(id),
                PluginEvent::AfterChange(id),
                PluginEvent::BeforeChange(id),
                PluginEvent::AfterChange(id),
            ]
        );
    }
}
