//! Computed Implementation
//!
//! A [`Computed`] is a cell whose value is derived from other reactive
//! sources. It evaluates its function once up front, then re-evaluates every
//! time one of its dependencies dispatches.
//!
//! # How Computeds Work
//!
//! 1. The function runs once to produce the initial value.
//!
//! 2. A re-evaluator is subscribed to every dependency. Object proxies
//!    contribute every field, transitively; batch gates contribute their
//!    counter cell only.
//!
//! 3. Each re-evaluation goes through `set`, so a result equal to the current
//!    value notifies nobody.
//!
//! Dependencies are explicit. Nothing is tracked by reading.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::ops::Deref;
use std::rc::Rc;

use tracing::trace;

use super::observable::Observable;
use super::plugins::{PluginEvent, Plugins};
use super::subscriber::Subscription;
use super::batch::Batch;

/// Something whose changes can drive a computed cell.
pub trait Dependency {
    /// Call `notify` whenever this source changes.
    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription;
}

impl<T, O> Dependency for Observable<T, O>
where
    T: Clone + PartialEq + 'static,
    O: 'static,
{
    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription {
        self.subscribe_change(move |_| notify())
    }
}

/// A cached derived value driven by explicit dependencies.
///
/// Dereferences to the underlying [`Observable`], so it can be read and
/// subscribed to like any other cell.
///
/// # Example
///
/// ```rust,ignore
/// let a = Observable::new(1);
/// let b = Observable::new(2);
/// let sum = computed(
///     { let (a, b) = (a.clone(), b.clone()); move || a.get() + b.get() },
///     &[&a, &b],
/// );
/// assert_eq!(sum.get(), 3);
/// a.set(5);
/// assert_eq!(sum.get(), 7);
/// ```
pub struct Computed<T> {
    cell: Observable<T>,
    subscriptions: Rc<RefCell<Vec<Subscription>>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// The underlying cell.
    pub fn observable(&self) -> &Observable<T> {
        &self.cell
    }

    /// Re-run the function now, outside of any dependency change.
    pub fn recompute(&self, compute: impl FnOnce() -> T) {
        self.cell.set(compute());
    }

    /// Detach from every dependency. The cell keeps its last value.
    pub fn dispose(&self) {
        let subscriptions: Vec<Subscription> = self.subscriptions.borrow_mut().drain(..).collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.subscriptions.borrow().is_empty()
    }

    /// Number of upstream subscriptions held.
    pub fn dependency_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }
}

impl<T> Deref for Computed<T> {
    type Target = Observable<T>;

    fn deref(&self) -> &Self::Target {
        &self.cell
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            subscriptions: Rc::clone(&self.subscriptions),
        }
    }
}

impl<T> Dependency for Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription {
        self.cell.watch(notify)
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cell", &self.cell)
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create a computed cell from `compute` and its dependencies.
pub fn computed<T, F>(compute: F, dependencies: &[&dyn Dependency]) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    let cell = Observable::new(compute());
    Plugins::emit(PluginEvent::ComputedCreated(cell.id()));

    let compute = Rc::new(compute);
    let target = cell.clone();
    let reevaluate: Rc<dyn Fn()> = Rc::new(move || {
        trace!(cell = %target.id(), "computed re-evaluating");
        target.set(compute());
    });

    let subscriptions = dependencies
        .iter()
        .map(|dependency| dependency.watch(Rc::clone(&reevaluate)))
        .collect();

    Computed {
        cell,
        subscriptions: Rc::new(RefCell::new(subscriptions)),
    }
}

/// Create a computed cell that only re-evaluates when `gate` completes a batch.
pub fn computed_batched<T, F>(compute: F, gate: &Batch) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    computed(compute, &[gate])
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sum_of(a: &Observable<i32>, b: &Observable<i32>) -> Computed<i32> {
        let (a_clone, b_clone) = (a.clone(), b.clone());
        computed(move || a_clone.get() + b_clone.get(), &[a, b])
    }

    #[test]
    fn computed_evaluates_initial_value() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        assert_eq!(sum_of(&a, &b).get(), 3);
    }

    #[test]
    fn computed_follows_dependency_once() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let sum = sum_of(&a, &b);

        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let _sub = sum.subscribe(move |_, _| fired_clone.set(fired_clone.get() + 1));

        a.set(5);
        assert_eq!(sum.get(), 7);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn equal_result_does_not_notify() {
        let a: Observable<_> = Observable::new(3);
        let a_clone = a.clone();
        let parity = computed(move || a_clone.get() % 2, &[&a]);

        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let _sub = parity.subscribe(move |_, _| fired_clone.set(fired_clone.get() + 1));

        a.set(5);
        assert_eq!(fired.get(), 0);
        a.set(6);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn dispose_stops_updates() {
        let a = Observable::new(1);
        let b = Observable::new(1);
        let sum = sum_of(&a, &b);
        assert_eq!(sum.dependency_count(), 2);

        sum.dispose();
        assert!(sum.is_disposed());
        a.set(10);
        assert_eq!(sum.get(), 2);
        assert_eq!(a.listener_count(), 0);
    }

    #[test]
    fn computed_can_depend_on_computed() {
        let base: Observable<_> = Observable::new(5);
        let base_clone = base.clone();
        let doubled = computed(move || base_clone.get() * 2, &[&base]);

        let doubled_clone = doubled.clone();
        let plus_ten = computed(move || doubled_clone.get() + 10, &[&doubled]);

        assert_eq!(plus_ten.get(), 20);
        base.set(10);
        assert_eq!(doubled.get(), 20);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn batched_computed_fires_once_per_batch() {
        let a: Observable<_> = Observable::new(1);
        let b: Observable<_> = Observable::new(2);
        let gate = Batch::new();

        let (a_clone, b_clone) = (a.clone(), b.clone());
        let sum = computed_batched(move || a_clone.get() + b_clone.get(), &gate);

        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let _sub = sum.subscribe(move |_, _| fired_clone.set(fired_clone.get() + 1));

        gate.run(|| {
            a.set(10);
            b.set(20);
        });
        assert_eq!(sum.get(), 30);
        assert_eq!(fired.get(), 1);
    }
}
