//! Memory Registry
//!
//! The registry is a thread-wide index of reactive cells by integer id. It
//! only holds weak references, so a registered cell is still dropped once the
//! last strong handle goes away.
//!
//! # Why It Exists
//!
//! A cell can be embedded in a string as `{{#ObItem::(<id>)}}` (see
//! [`template`]). Resolving that text back into a live cell must not keep the
//! cell alive, otherwise every interpolated cell would leak.
//!
//! # Sweeping
//!
//! Entries whose cell was dropped stay in the map until a sweep. Sweeping is
//! best effort: [`MemoryManager::clean_observables`] runs it once the registry
//! reaches a size threshold, and [`MemoryManager::unregister`] evicts an entry
//! explicitly.

pub mod template;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::{Error, Result};
use crate::reactive::{CellId, Observable, Subscription};

/// Registry size at which [`MemoryManager::clean_observables`] is worth running.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 100;

/// Type-erased view of a registered cell.
pub(crate) trait RegisteredCell {
    fn cell_id(&self) -> CellId;

    /// Clean the cell up without touching the registry.
    fn force_cleanup(&self);

    /// Current value as text, when the cell was registered as displayable.
    fn render_text(&self) -> Option<String>;

    /// Call `notify` on every change of the cell.
    fn watch_erased(self: Rc<Self>, notify: Rc<dyn Fn()>) -> Subscription;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

struct Registry {
    next_id: u64,
    entries: HashMap<u64, Weak<dyn RegisteredCell>>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry {
        next_id: 1,
        entries: HashMap::new(),
    });
}

/// The registry of live cells for the current thread.
pub struct MemoryManager;

impl MemoryManager {
    /// Register a cell and return its id.
    ///
    /// Registering the same cell twice returns the id it already has.
    pub fn register<T, O>(cell: &Observable<T, O>) -> u64
    where
        T: Clone + PartialEq + 'static,
        O: 'static,
    {
        if let Some(id) = cell.registry_id() {
            return id;
        }

        let strong: Rc<dyn RegisteredCell> = cell.inner().clone();
        let weak = Rc::downgrade(&strong);
        let id = REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.insert(id, weak);
            id
        });
        cell.set_registry_id(Some(id));
        debug!(registry_id = id, cell = %cell.id(), "observable registered");
        id
    }

    /// Resolve an id back to a typed cell.
    pub fn get_by_id<T, O>(id: u64) -> Result<Observable<T, O>>
    where
        T: Clone + PartialEq + 'static,
        O: 'static,
    {
        let cell = Self::resolve(id)?;
        cell.into_any()
            .downcast::<crate::reactive::observable::Inner<T, O>>()
            .map(Observable::from_inner)
            .map_err(|_| Error::TypeMismatch(id))
    }

    pub(crate) fn resolve(id: u64) -> Result<Rc<dyn RegisteredCell>> {
        REGISTRY
            .with(|registry| registry.borrow().entries.get(&id).and_then(Weak::upgrade))
            .ok_or(Error::UnknownObservable(id))
    }

    /// Whether `id` still resolves to a live cell.
    pub fn contains(id: u64) -> bool {
        Self::resolve(id).is_ok()
    }

    /// Evict an entry explicitly.
    pub fn unregister(id: u64) -> bool {
        REGISTRY.with(|registry| registry.borrow_mut().entries.remove(&id).is_some())
    }

    /// Number of entries, dead or alive.
    pub fn len() -> usize {
        REGISTRY.with(|registry| registry.borrow().entries.len())
    }

    pub fn is_empty() -> bool {
        Self::len() == 0
    }

    /// Sweep entries whose cell was dropped, once the registry holds at least
    /// `threshold` entries. Returns the number of entries removed.
    pub fn clean_observables(threshold: usize) -> usize {
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            if registry.entries.len() < threshold {
                return 0;
            }
            let before = registry.entries.len();
            registry.entries.retain(|_, weak| weak.strong_count() > 0);
            let swept = before - registry.entries.len();
            debug!(swept, remaining = registry.entries.len(), "registry sweep");
            swept
        })
    }

    /// Force-clean every live cell and empty the registry.
    pub fn cleanup() {
        let live: Vec<Rc<dyn RegisteredCell>> = REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            registry
                .entries
                .drain()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        });

        debug!(count = live.len(), "cleaning up registered observables");
        for cell in live {
            cell.force_cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve() {
        let cell = Observable::new(5);
        let id = MemoryManager::register(&cell);

        let resolved: Observable<i32> = MemoryManager::get_by_id(id).unwrap();
        assert!(resolved.ptr_eq(&cell));
        assert_eq!(MemoryManager::register(&cell), id);
    }

    #[test]
    fn ids_increase() {
        let a: Observable<_> = Observable::new(1);
        let b: Observable<_> = Observable::new(2);
        assert!(MemoryManager::register(&b) > MemoryManager::register(&a));
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let cell: Observable<_> = Observable::new(String::from("x"));
        let id = MemoryManager::register(&cell);

        let result = MemoryManager::get_by_id::<i32, ()>(id);
        assert_eq!(result.unwrap_err(), Error::TypeMismatch(id));
    }

    #[test]
    fn dropped_cells_are_swept_at_threshold() {
        let keep: Observable<_> = Observable::new(0);
        let keep_id = MemoryManager::register(&keep);

        let dropped_id = {
            let temp: Observable<_> = Observable::new(1);
            MemoryManager::register(&temp)
        };
        assert_eq!(
            MemoryManager::get_by_id::<i32, ()>(dropped_id).unwrap_err(),
            Error::UnknownObservable(dropped_id)
        );

        let size = MemoryManager::len();
        assert_eq!(MemoryManager::clean_observables(size + 1), 0);
        assert_eq!(MemoryManager::clean_observables(size), 1);
        assert!(MemoryManager::contains(keep_id));
        assert!(!MemoryManager::contains(dropped_id));
    }

    #[test]
    fn cleanup_cleans_live_cells() {
        let cell: Observable<_> = Observable::new(0);
        MemoryManager::register(&cell);

        MemoryManager::cleanup();
        assert!(cell.is_cleaned_up());
        assert!(MemoryManager::is_empty());
        assert_eq!(cell.registry_id(), None);
    }

    #[test]
    fn cell_cleanup_unregisters() {
        let cell: Observable<_> = Observable::new(0);
        let id = MemoryManager::register(&cell);
        cell.cleanup();
        assert!(!MemoryManager::contains(id));
    }
}
