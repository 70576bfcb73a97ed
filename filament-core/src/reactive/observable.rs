//! Observable Implementation
//!
//! An [`Observable`] is the fundamental reactive cell. It holds a value and a
//! list of listeners, and notifies them synchronously whenever the value
//! changes.
//!
//! # How Observables Work
//!
//! 1. `set` compares the candidate with the current value. Equal values
//!    return immediately: no hook, no listener, nothing. Downstream code
//!    relies on "no-op set means no re-render".
//!
//! 2. Otherwise the current value is stashed as the previous value, the new
//!    value is stored, and the cell dispatches.
//!
//! 3. The previous value is cleared as soon as dispatch returns.
//!
//! # Dispatch Modes
//!
//! Each cell keeps a [`DispatchMode`] that is re-evaluated after every
//! subscribe, unsubscribe, `on` and `off`. A cell nobody listens to is
//! `Silent` and its dispatch does no work at all.
//!
//! # Memory Layout
//!
//! Values are stored behind `Rc<T>`. Dispatch hands listeners a snapshot of
//! that `Rc`, so a listener may call `set` on the very cell that is notifying
//! it without tripping a borrow.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug, Display};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::plugins::{PluginEvent, Plugins};
use super::subscriber::{SubscriberId, Subscription};
use crate::registry::{MemoryManager, RegisteredCell};

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a cell, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        Self(CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a cell notifies on change, derived from its listener/watcher counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// No listeners, no watchers.
    Silent,
    /// Exactly one listener, no watchers.
    Single,
    /// Several listeners, no watchers.
    Many,
    /// Watchers only.
    WatchersOnly,
    /// Listeners and watchers.
    Full,
}

impl DispatchMode {
    fn select(listeners: usize, has_watchers: bool) -> Self {
        match (listeners, has_watchers) {
            (0, false) => DispatchMode::Silent,
            (1, false) => DispatchMode::Single,
            (_, false) => DispatchMode::Many,
            (0, true) => DispatchMode::WatchersOnly,
            (_, true) => DispatchMode::Full,
        }
    }
}

/// What a listener receives on every dispatch.
pub struct Change<'a, T, O = ()> {
    /// The value after the change.
    pub value: &'a T,
    /// The value before the change. `None` for plain triggers.
    pub previous: Option<&'a T>,
    /// Structured description of the mutation, when the cell reports one.
    pub operation: Option<&'a O>,
}

type Listener<T, O> = Rc<dyn Fn(&Change<'_, T, O>)>;
type WatchFn = Rc<dyn Fn(bool)>;

fn listener<T, O, F>(f: F) -> Listener<T, O>
where
    F: Fn(&Change<'_, T, O>) + 'static,
{
    Rc::new(f)
}

struct WatchEntry<T> {
    value: T,
    callbacks: SmallVec<[(SubscriberId, WatchFn); 1]>,
}

pub(crate) struct Inner<T, O> {
    id: CellId,
    registry_id: Cell<Option<u64>>,
    value: RefCell<Rc<T>>,
    previous: RefCell<Option<Rc<T>>>,
    listeners: RefCell<SmallVec<[(SubscriberId, Listener<T, O>); 2]>>,
    watchers: RefCell<Vec<WatchEntry<T>>>,
    mode: Cell<DispatchMode>,
    cleaned_up: Cell<bool>,
    text: Cell<Option<fn(&T) -> String>>,
}

impl<T, O> Inner<T, O>
where
    T: Clone + PartialEq + 'static,
    O: 'static,
{
    fn refresh_mode(&self) {
        let mode = DispatchMode::select(
            self.listeners.borrow().len(),
            !self.watchers.borrow().is_empty(),
        );
        if self.mode.replace(mode) != mode {
            trace!(cell = %self.id, ?mode, "dispatch mode changed");
        }
    }

    fn add_listener(self: &Rc<Self>, listener: Listener<T, O>) -> Subscription {
        if self.cleaned_up.get() {
            warn!(cell = %self.id, "subscribe on a cleaned-up observable ignored");
            return Subscription::noop();
        }

        let subscriber_id = SubscriberId::new();
        self.listeners.borrow_mut().push((subscriber_id, listener));
        self.refresh_mode();
        Plugins::emit(PluginEvent::Subscribe(self.id));

        let weak = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_listener(subscriber_id);
            }
        })
    }

    fn remove_listener(&self, subscriber_id: SubscriberId) {
        let removed = {
            let mut listeners = self.listeners.borrow_mut();
            let before = listeners.len();
            listeners.retain(|(id, _)| *id != subscriber_id);
            listeners.len() != before
        };
        if removed {
            self.refresh_mode();
            Plugins::emit(PluginEvent::Unsubscribe(self.id));
        }
    }

    fn add_watcher(self: &Rc<Self>, value: T, callback: WatchFn) -> Subscription {
        if self.cleaned_up.get() {
            warn!(cell = %self.id, "watcher on a cleaned-up observable ignored");
            return Subscription::noop();
        }

        let subscriber_id = SubscriberId::new();
        {
            let mut watchers = self.watchers.borrow_mut();
            match watchers.iter_mut().find(|entry| entry.value == value) {
                Some(entry) => entry.callbacks.push((subscriber_id, callback)),
                None => {
                    let mut callbacks = SmallVec::new();
                    callbacks.push((subscriber_id, callback));
                    watchers.push(WatchEntry { value, callbacks });
                }
            }
        }
        self.refresh_mode();

        let weak = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_watcher(subscriber_id);
            }
        })
    }

    fn remove_watcher(&self, subscriber_id: SubscriberId) {
        {
            let mut watchers = self.watchers.borrow_mut();
            for entry in watchers.iter_mut() {
                entry.callbacks.retain(|(id, _)| *id != subscriber_id);
            }
            watchers.retain(|entry| !entry.callbacks.is_empty());
        }
        self.refresh_mode();
    }

    fn commit(&self, next: Rc<T>, operation: Option<&O>) {
        let previous = std::mem::replace(&mut *self.value.borrow_mut(), next);
        *self.previous.borrow_mut() = Some(previous);

        Plugins::emit(PluginEvent::BeforeChange(self.id));
        self.dispatch(operation, true);
        self.previous.borrow_mut().take();
        Plugins::emit(PluginEvent::AfterChange(self.id));
    }

    fn dispatch(&self, operation: Option<&O>, with_watchers: bool) {
        let mode = self.mode.get();
        if mode == DispatchMode::Silent {
            return;
        }

        let current = Rc::clone(&*self.value.borrow());
        let previous = self.previous.borrow().clone();
        let change = Change {
            value: &*current,
            previous: previous.as_deref(),
            operation,
        };
        trace!(cell = %self.id, ?mode, "dispatch");

        match mode {
            DispatchMode::Silent => {}
            DispatchMode::Single => {
                let listener = self.listeners.borrow().first().map(|(_, l)| Rc::clone(l));
                if let Some(listener) = listener {
                    listener(&change);
                }
            }
            DispatchMode::Many => self.notify_listeners(&change),
            DispatchMode::WatchersOnly => {
                if with_watchers {
                    self.notify_watchers(&current, previous.as_deref());
                }
            }
            DispatchMode::Full => {
                self.notify_listeners(&change);
                if with_watchers {
                    self.notify_watchers(&current, previous.as_deref());
                }
            }
        }
    }

    fn notify_listeners(&self, change: &Change<'_, T, O>) {
        let listeners: SmallVec<[Listener<T, O>; 4]> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(change);
        }
    }

    fn notify_watchers(&self, current: &T, previous: Option<&T>) {
        let collect = |value: &T| -> SmallVec<[WatchFn; 2]> {
            self.watchers
                .borrow()
                .iter()
                .find(|entry| entry.value == *value)
                .map(|entry| entry.callbacks.iter().map(|(_, cb)| Rc::clone(cb)).collect())
                .unwrap_or_default()
        };

        if let Some(previous) = previous {
            for callback in collect(previous) {
                callback(false);
            }
        }
        for callback in collect(current) {
            callback(true);
        }
    }

    fn cleanup(&self) {
        self.listeners.borrow_mut().clear();
        self.watchers.borrow_mut().clear();
        self.cleaned_up.set(true);
        self.refresh_mode();
    }
}

impl<T, O> RegisteredCell for Inner<T, O>
where
    T: Clone + PartialEq + 'static,
    O: 'static,
{
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn force_cleanup(&self) {
        self.registry_id.set(None);
        self.cleanup();
    }

    fn render_text(&self) -> Option<String> {
        let render = self.text.get()?;
        let value = Rc::clone(&*self.value.borrow());
        Some(render(&value))
    }

    fn watch_erased(self: Rc<Self>, notify: Rc<dyn Fn()>) -> Subscription {
        self.add_listener(listener(move |_| notify()))
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// A reactive cell holding a value of type `T`.
///
/// `O` is the operation descriptor a cell may attach to a dispatch; plain
/// cells use `()` and array cells use
/// [`ArrayOperation`](super::ArrayOperation).
///
/// # Example
///
/// ```rust,ignore
/// let count = Observable::new(0);
///
/// let sub = count.subscribe(|value, previous| {
///     println!("{:?} -> {}", previous, value);
/// });
///
/// count.set(5);  // prints "Some(0) -> 5"
/// count.set(5);  // equal value: nothing happens
/// sub.unsubscribe();
/// ```
pub struct Observable<T, O = ()> {
    inner: Rc<Inner<T, O>>,
}

impl<T, O> Observable<T, O>
where
    T: Clone + PartialEq + 'static,
    O: 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        let inner = Rc::new(Inner {
            id: CellId::next(),
            registry_id: Cell::new(None),
            value: RefCell::new(Rc::new(value)),
            previous: RefCell::new(None),
            listeners: RefCell::new(SmallVec::new()),
            watchers: RefCell::new(Vec::new()),
            mode: Cell::new(DispatchMode::Silent),
            cleaned_up: Cell::new(false),
            text: Cell::new(None),
        });
        Plugins::emit(PluginEvent::CellCreated(inner.id));
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<Inner<T, O>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<Inner<T, O>> {
        &self.inner
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Registry id, if the cell was registered.
    pub fn registry_id(&self) -> Option<u64> {
        self.inner.registry_id.get()
    }

    pub(crate) fn set_registry_id(&self, id: Option<u64>) {
        self.inner.registry_id.set(id);
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        (**self.inner.value.borrow()).clone()
    }

    /// Alias of [`get`](Self::get).
    pub fn val(&self) -> T {
        self.get()
    }

    /// Borrow the current value.
    ///
    /// The closure may write to this cell; it reads a snapshot.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let current = Rc::clone(&*self.inner.value.borrow());
        f(&current)
    }

    /// The previous value. `Some` only while a change is being dispatched.
    pub fn previous(&self) -> Option<T> {
        self.inner.previous.borrow().as_deref().cloned()
    }

    /// Set a new value and notify listeners.
    ///
    /// Setting a value equal to the current one does nothing.
    pub fn set(&self, value: T) {
        if **self.inner.value.borrow() == value {
            return;
        }
        self.inner.commit(Rc::new(value), None);
    }

    /// Set a new value computed from the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = self.with(f);
        self.set(next);
    }

    pub(crate) fn set_with_operation(&self, value: T, operation: O) {
        if **self.inner.value.borrow() == value {
            return;
        }
        self.inner.commit(Rc::new(value), Some(&operation));
    }

    /// Edit the value in place without dispatching.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut slot = self.inner.value.borrow_mut();
        f(Rc::make_mut(&mut slot))
    }

    /// Notify listeners with the current value, without changing it.
    ///
    /// Watchers are not involved: they track value transitions only.
    pub fn trigger(&self) {
        self.inner.dispatch(None, false);
    }

    /// Notify listeners and attach an operation descriptor.
    pub fn trigger_with(&self, operation: O) {
        self.inner.dispatch(Some(&operation), false);
    }

    /// Register a listener receiving the new and previous value.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.subscribe_change(move |change| listener(change.value, change.previous))
    }

    /// Register a listener receiving the full [`Change`], operation included.
    pub fn subscribe_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Change<'_, T, O>) + 'static,
    {
        self.inner.add_listener(Rc::new(listener))
    }

    /// Watch one specific value.
    ///
    /// `callback(true)` runs when the cell enters `value`, `callback(false)`
    /// when it leaves it.
    pub fn on<F>(&self, value: T, callback: F) -> Subscription
    where
        F: Fn(bool) + 'static,
    {
        self.inner.add_watcher(value, Rc::new(callback))
    }

    /// Run `callback` the first time the cell enters `value`.
    pub fn once<F>(&self, value: T, callback: F) -> Subscription
    where
        F: FnOnce() + 'static,
    {
        let pending = Rc::new(RefCell::new(Some(callback)));
        let handle: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let handle_clone = Rc::clone(&handle);

        let subscription = self.on(value, move |entering| {
            if !entering {
                return;
            }
            if let Some(subscription) = handle_clone.borrow_mut().take() {
                subscription.unsubscribe();
            }
            if let Some(callback) = pending.borrow_mut().take() {
                callback();
            }
        });
        *handle.borrow_mut() = Some(subscription);

        Subscription::new(move || {
            if let Some(subscription) = handle.borrow_mut().take() {
                subscription.unsubscribe();
            }
        })
    }

    /// Remove every watcher bound to `value`.
    pub fn off(&self, value: &T) {
        self.inner
            .watchers
            .borrow_mut()
            .retain(|entry| entry.value != *value);
        self.inner.refresh_mode();
    }

    /// Sever all listeners and watchers and mark the cell cleaned up.
    pub fn cleanup(&self) {
        if let Some(id) = self.inner.registry_id.take() {
            MemoryManager::unregister(id);
        }
        self.inner.cleanup();
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.inner.cleaned_up.get()
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.mode.get()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Number of watched values.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    /// Whether both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Textual reference `{{#ObItem::(<id>)}}`, registering the cell lazily.
    pub fn reference(&self) -> String {
        let id = MemoryManager::register(self);
        format!("{{{{#ObItem::({})}}}}", id)
    }
}

impl<T, O> Observable<T, O>
where
    T: Clone + PartialEq + Display + 'static,
    O: 'static,
{
    /// Allow template expansion to render this cell as text.
    pub(crate) fn enable_text(&self) {
        self.inner.text.set(Some(|value: &T| value.to_string()));
    }
}

impl<T, O> Clone for Observable<T, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, O> Display for Observable<T, O>
where
    T: Clone + PartialEq + Display + 'static,
    O: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.enable_text();
        f.write_str(&self.reference())
    }
}

impl<T, O> Debug for Observable<T, O>
where
    T: Clone + PartialEq + Debug + 'static,
    O: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &self.get())
            .field("mode", &self.dispatch_mode())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
