//! Plugin Bus
//!
//! The core announces a handful of lifecycle points to registered plugins:
//! cell creation, the two halves of a change, subscription bookkeeping, and
//! creation of arrays and computed cells. Devtools and loggers hang off this.
//!
//! Broadcasts are synchronous. A plugin that panics is caught at the
//! broadcast boundary and logged; sibling plugins and the triggering mutation
//! carry on.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::error;

use super::observable::CellId;

/// A lifecycle point reported by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginEvent {
    CellCreated(CellId),
    BeforeChange(CellId),
    AfterChange(CellId),
    Subscribe(CellId),
    Unsubscribe(CellId),
    ArrayCreated(CellId),
    ComputedCreated(CellId),
}

type PluginFn = Rc<dyn Fn(&PluginEvent)>;

thread_local! {
    static PLUGINS: RefCell<Vec<(String, PluginFn)>> = RefCell::new(Vec::new());
}

/// Registry of plugins for the current thread.
pub struct Plugins;

impl Plugins {
    /// Register a plugin under `name`, replacing any plugin with that name.
    pub fn register<F>(name: impl Into<String>, plugin: F)
    where
        F: Fn(&PluginEvent) + 'static,
    {
        let name = name.into();
        PLUGINS.with(|plugins| {
            let mut plugins = plugins.borrow_mut();
            plugins.retain(|(existing, _)| *existing != name);
            plugins.push((name, Rc::new(plugin)));
        });
    }

    /// Remove the plugin registered under `name`.
    pub fn unregister(name: &str) -> bool {
        PLUGINS.with(|plugins| {
            let mut plugins = plugins.borrow_mut();
            let before = plugins.len();
            plugins.retain(|(existing, _)| existing != name);
            plugins.len() != before
        })
    }

    /// Number of registered plugins.
    pub fn count() -> usize {
        PLUGINS.with(|plugins| plugins.borrow().len())
    }

    pub(crate) fn emit(event: PluginEvent) {
        let listeners: Vec<(String, PluginFn)> = PLUGINS.with(|plugins| {
            let plugins = plugins.borrow();
            if plugins.is_empty() {
                return Vec::new();
            }
            plugins.clone()
        });

        for (name, plugin) in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| plugin(&event))).is_err() {
                error!(plugin = %name, ?event, "plugin panicked while handling event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;
    use std::cell::Cell;

    #[test]
    fn plugins_see_change_lifecycle() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let events_clone = events.clone();
        Plugins::register("recorder", move |event| events_clone.borrow_mut().push(*event));

        let cell: Observable<_> = Observable::new(1);
        cell.set(2);
        Plugins::unregister("recorder");

        let id = cell.id();
        let events = events.borrow();
        assert_eq!(events[0], PluginEvent::CellCreated(id));
        assert!(events.contains(&PluginEvent::BeforeChange(id)));
        assert!(events.contains(&PluginEvent::AfterChange(id)));
    }

    #[test]
    fn panicking_plugin_does_not_stop_siblings() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();

        Plugins::register("broken", |_| panic!("plugin failure"));
        Plugins::register("counter", move |_| seen_clone.set(seen_clone.get() + 1));

        let cell: Observable<_> = Observable::new(0);
        cell.set(5);

        Plugins::unregister("broken");
        Plugins::unregister("counter");

        assert_eq!(cell.get(), 5);
        assert!(seen.get() >= 3);
    }

    #[test]
    fn register_replaces_same_name() {
        Plugins::register("dup", |_| {});
        Plugins::register("dup", |_| {});
        assert_eq!(Plugins::count(), 1);
        assert!(Plugins::unregister("dup"));
        assert!(!Plugins::unregister("dup"));
    }
}
