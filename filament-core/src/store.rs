//! Named Store
//!
//! The store is a thread-wide table of named source cells. Any part of an
//! application can create a named cell once and then obtain followers of it
//! by name.
//!
//! # How Followers Work
//!
//! 1. A follower is a fresh cell seeded with the source's current value.
//!
//! 2. Two forwarding subscriptions keep them in sync: source to follower and
//!    follower to source. Because `set` ignores equal values, the echo of a
//!    forwarded write stops after one hop.
//!
//! 3. Writing a follower therefore reaches the source and, through it, every
//!    sibling follower.
//!
//! [`Follower::destroy`] unwinds both subscriptions and cleans the follower
//! cell. [`Store::delete`] cleans the source and destroys every follower.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::ops::Deref;
use std::rc::Rc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::reactive::{Observable, Subscription};

trait ErasedEntry {
    fn as_any(&self) -> &dyn Any;

    fn follower_count(&self) -> usize;

    /// Destroy every follower and clean the source.
    fn teardown(&self);
}

struct StoreEntry<T> {
    source: Observable<T>,
    followers: RefCell<Vec<Follower<T>>>,
}

impl<T> ErasedEntry for StoreEntry<T>
where
    T: Clone + PartialEq + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn follower_count(&self) -> usize {
        self.followers.borrow().len()
    }

    fn teardown(&self) {
        let followers: Vec<Follower<T>> = self.followers.borrow_mut().drain(..).collect();
        for follower in followers {
            follower.unwire();
        }
        self.source.cleanup();
    }
}

thread_local! {
    static STORE: RefCell<HashMap<String, Rc<dyn ErasedEntry>>> = RefCell::new(HashMap::new());
}

fn lookup(name: &str) -> Result<Rc<dyn ErasedEntry>> {
    STORE
        .with(|store| store.borrow().get(name).cloned())
        .ok_or_else(|| Error::StoreEntryMissing(name.to_string()))
}

fn with_entry<T, R>(name: &str, f: impl FnOnce(&StoreEntry<T>) -> R) -> Result<R>
where
    T: Clone + PartialEq + 'static,
{
    let entry = lookup(name)?;
    let typed = entry
        .as_any()
        .downcast_ref::<StoreEntry<T>>()
        .ok_or_else(|| Error::StoreTypeMismatch(name.to_string()))?;
    Ok(f(typed))
}

/// The named store of the current thread.
pub struct Store;

impl Store {
    /// Create the source cell `name`.
    pub fn create<T>(name: impl Into<String>, initial: T) -> Result<Observable<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        let name = name.into();
        STORE.with(|store| {
            let mut store = store.borrow_mut();
            if store.contains_key(&name) {
                return Err(Error::StoreEntryExists(name));
            }
            let source = Observable::new(initial);
            store.insert(
                name.clone(),
                Rc::new(StoreEntry {
                    source: source.clone(),
                    followers: RefCell::new(Vec::new()),
                }),
            );
            debug!(store_entry = %name, "store entry created");
            Ok(source)
        })
    }

    /// The source cell `name`.
    pub fn get<T>(name: &str) -> Result<Observable<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        with_entry(name, |entry: &StoreEntry<T>| entry.source.clone())
    }

    /// A follower of `name`, kept in sync both ways with the source.
    pub fn use_<T>(name: &str) -> Result<Follower<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        with_entry(name, |entry: &StoreEntry<T>| {
            let follower = Follower::wire(name, &entry.source);
            entry.followers.borrow_mut().push(follower.clone());
            debug!(store_entry = %name, followers = entry.followers.borrow().len(), "store follower created");
            follower
        })
    }

    /// Same as [`use_`](Self::use_).
    pub fn follow<T>(name: &str) -> Result<Follower<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        Self::use_(name)
    }

    /// Remove `name`, clean its source and destroy its followers.
    pub fn delete(name: &str) -> Result<()> {
        let entry = STORE
            .with(|store| store.borrow_mut().remove(name))
            .ok_or_else(|| Error::StoreEntryMissing(name.to_string()))?;
        entry.teardown();
        debug!(store_entry = %name, "store entry deleted");
        Ok(())
    }

    pub fn has(name: &str) -> bool {
        STORE.with(|store| store.borrow().contains_key(name))
    }

    /// Names of every entry, in no particular order.
    pub fn names() -> Vec<String> {
        STORE.with(|store| store.borrow().keys().cloned().collect())
    }

    /// Number of live followers of `name`.
    pub fn follower_count(name: &str) -> Result<usize> {
        Ok(lookup(name)?.follower_count())
    }

    /// Delete every entry.
    pub fn clear() {
        let entries: Vec<Rc<dyn ErasedEntry>> =
            STORE.with(|store| store.borrow_mut().drain().map(|(_, entry)| entry).collect());
        for entry in entries {
            entry.teardown();
        }
    }
}

struct Wiring {
    upstream: Subscription,
    downstream: Subscription,
}

/// A cell kept in sync with a store source.
///
/// Dereferences to its [`Observable`].
pub struct Follower<T> {
    name: Rc<str>,
    cell: Observable<T>,
    wiring: Rc<RefCell<Option<Wiring>>>,
}

impl<T> Follower<T>
where
    T: Clone + PartialEq + 'static,
{
    fn wire(name: &str, source: &Observable<T>) -> Self {
        let cell = Observable::new(source.get());

        let target = cell.clone();
        let downstream = source.subscribe(move |value, _| target.set(value.clone()));
        let upstream_source = source.clone();
        let upstream = cell.subscribe(move |value, _| upstream_source.set(value.clone()));

        Self {
            name: Rc::from(name),
            cell,
            wiring: Rc::new(RefCell::new(Some(Wiring {
                upstream,
                downstream,
            }))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observable(&self) -> &Observable<T> {
        &self.cell
    }

    /// Whether the follower is still wired to its source.
    pub fn is_active(&self) -> bool {
        self.wiring.borrow().is_some()
    }

    fn unwire(&self) {
        let wiring = self.wiring.borrow_mut().take();
        if let Some(wiring) = wiring {
            wiring.upstream.unsubscribe();
            wiring.downstream.unsubscribe();
            self.cell.cleanup();
        }
    }

    /// Unwind both forwarding subscriptions and clean the follower cell.
    pub fn destroy(&self) {
        self.unwire();
        let detached = with_entry(&self.name, |entry: &StoreEntry<T>| {
            entry
                .followers
                .borrow_mut()
                .retain(|follower| !Rc::ptr_eq(&follower.wiring, &self.wiring));
        });
        match detached {
            Ok(()) => debug!(store_entry = %self.name, "store follower destroyed"),
            // Deleted entries have already let go of their followers.
            Err(Error::StoreEntryMissing(_)) => {}
            Err(err) => debug!(store_entry = %self.name, error = %err, "store follower not detached"),
        }
    }
}

impl<T> Clone for Follower<T> {
    fn clone(&self) -> Self {
        Self {
            name: Rc::clone(&self.name),
            cell: self.cell.clone(),
            wiring: Rc::clone(&self.wiring),
        }
    }
}

impl<T> Deref for Follower<T> {
    type Target = Observable<T>;

    fn deref(&self) -> &Self::Target {
        &self.cell
    }
}

impl<T> Debug for Follower<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Follower")
            .field("name", &self.name)
            .field("value", &self.cell.get())
            .field("active", &self.is_active())
            .finish()
    }
}
