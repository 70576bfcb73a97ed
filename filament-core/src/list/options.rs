//! Reconciler configuration.

use std::fmt::{self, Debug};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::key::{ItemKey, Key, KeyFn};

/// Plain, serializable reconciler settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerFlags {
    /// Keep entries for vanished keys so their nodes are reused if the key
    /// comes back.
    #[serde(alias = "shouldKeepItemsInCache")]
    pub keep_items_in_cache: bool,

    /// Field used as the key of structured items.
    pub key: Option<String>,
}

/// Decides how long to hold back the insertion of pushed items.
pub type PushDelay<T> = Rc<dyn Fn(&[T]) -> Option<Duration>>;

/// Options shared by [`ForEach`](super::ForEach) and
/// [`ForEachArray`](super::ForEachArray).
pub struct ReconcilerOptions<T> {
    pub(crate) keep_items_in_cache: bool,
    pub(crate) key_field: Option<String>,
    pub(crate) key_fn: Option<KeyFn<T>>,
    pub(crate) push_delay: Option<PushDelay<T>>,
}

impl<T> ReconcilerOptions<T> {
    pub fn new() -> Self {
        Self {
            keep_items_in_cache: false,
            key_field: None,
            key_fn: None,
            push_delay: None,
        }
    }

    /// Start from deserialized flags.
    pub fn from_flags(flags: ReconcilerFlags) -> Self {
        Self {
            keep_items_in_cache: flags.keep_items_in_cache,
            key_field: flags.key,
            ..Self::new()
        }
    }

    pub fn keep_items_in_cache(mut self, keep: bool) -> Self {
        self.keep_items_in_cache = keep;
        self
    }

    /// Key structured items by this field.
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    /// Key items with `key`. Takes precedence over the key field.
    pub fn key_fn<F>(mut self, key: F) -> Self
    where
        F: Fn(&T, usize) -> Key + 'static,
    {
        self.key_fn = Some(Rc::new(key));
        self
    }

    /// Delay the tree insertion of pushed items by `delay(items)`.
    ///
    /// Only [`ForEachArray`](super::ForEachArray) honours this, and a delayed
    /// insertion runs on the current `tokio::task::LocalSet`.
    pub fn push_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&[T]) -> Option<Duration> + 'static,
    {
        self.push_delay = Some(Rc::new(delay));
        self
    }

    pub fn keeps_items_in_cache(&self) -> bool {
        self.keep_items_in_cache
    }

    pub(crate) fn delay_for(&self, items: &[T]) -> Option<Duration> {
        self.push_delay.as_ref().and_then(|delay| delay(items))
    }
}

impl<T: ItemKey> ReconcilerOptions<T> {
    pub(crate) fn key_of(&self, item: &T, index: usize) -> Key {
        match &self.key_fn {
            Some(key) => key(item, index),
            None => item.item_key(self.key_field.as_deref(), index),
        }
    }
}

impl<T> Default for ReconcilerOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ReconcilerOptions<T> {
    fn clone(&self) -> Self {
        Self {
            keep_items_in_cache: self.keep_items_in_cache,
            key_field: self.key_field.clone(),
            key_fn: self.key_fn.clone(),
            push_delay: self.push_delay.clone(),
        }
    }
}

impl<T> Debug for ReconcilerOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcilerOptions")
            .field("keep_items_in_cache", &self.keep_items_in_cache)
            .field("key_field", &self.key_field)
            .field("key_fn", &self.key_fn.is_some())
            .field("push_delay", &self.push_delay.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_deserialize_with_defaults() {
        let flags: ReconcilerFlags = serde_json::from_value(json!({})).unwrap();
        assert_eq!(flags, ReconcilerFlags::default());

        let flags: ReconcilerFlags =
            serde_json::from_value(json!({"shouldKeepItemsInCache": true, "key": "id"})).unwrap();
        assert!(flags.keep_items_in_cache);
        assert_eq!(flags.key.as_deref(), Some("id"));
    }

    #[test]
    fn key_fn_wins_over_field() {
        let options = ReconcilerOptions::<serde_json::Value>::new()
            .key_field("id")
            .key_fn(|item, _| Key::from(item["name"].as_str().unwrap_or_default()));
        let row = json!({"id": 1, "name": "a"});
        assert_eq!(options.key_of(&row, 0), Key::from("a"));
    }

    #[test]
    fn push_delay_is_consulted() {
        let options = ReconcilerOptions::<i32>::new()
            .push_delay(|items| (items.len() > 1).then(|| Duration::from_millis(5)));
        assert_eq!(options.delay_for(&[1]), None);
        assert_eq!(options.delay_for(&[1, 2]), Some(Duration::from_millis(5)));
    }
}
