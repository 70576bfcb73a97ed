//! Item keys.
//!
//! A reconciler identifies every rendered item by a [`Key`]. Keys are
//! resolved in this order:
//!
//! 1. an explicit key function from the options;
//! 2. for a reactive cell, a field lookup on its current value;
//! 3. for structured data (JSON objects, object proxies), a field lookup,
//!    falling back to the item's position;
//! 4. otherwise the item itself.
//!
//! Steps 2 to 4 are what [`ItemKey`] implementations do.

use std::fmt::{self, Display};
use std::rc::Rc;

use serde_json::Value;

use crate::reactive::{Observable, ObservableProxy};

/// Identity of a rendered item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(String),
    /// Positional fallback for structured items without a key field.
    Index(usize),
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(value) => write!(f, "{}", value),
            Key::Str(value) => f.write_str(value),
            Key::Index(index) => write!(f, "@{}", index),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value.into())
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Int(value.into())
    }
}

/// Explicit key function: item and position to key.
pub type KeyFn<T> = Rc<dyn Fn(&T, usize) -> Key>;

/// How an item names itself.
///
/// `field` is the configured key field, if any. The default implementation
/// keys by position, which is enough for item types that never reorder.
pub trait ItemKey {
    fn item_key(&self, field: Option<&str>, index: usize) -> Key {
        let _ = field;
        Key::Index(index)
    }
}

macro_rules! int_item_key {
    ($($ty:ty),*) => {
        $(
            impl ItemKey for $ty {
                fn item_key(&self, _field: Option<&str>, _index: usize) -> Key {
                    Key::Int(*self as i64)
                }
            }
        )*
    };
}

int_item_key!(i8, i16, i32, i64, u8, u16, u32, usize, u64);

impl ItemKey for String {
    fn item_key(&self, _field: Option<&str>, _index: usize) -> Key {
        Key::Str(self.clone())
    }
}

impl ItemKey for &'static str {
    fn item_key(&self, _field: Option<&str>, _index: usize) -> Key {
        Key::Str((*self).to_string())
    }
}

impl ItemKey for char {
    fn item_key(&self, _field: Option<&str>, _index: usize) -> Key {
        Key::Str(self.to_string())
    }
}

impl ItemKey for bool {
    fn item_key(&self, _field: Option<&str>, _index: usize) -> Key {
        Key::Str(self.to_string())
    }
}

/// Key of a scalar JSON value.
fn scalar_key(value: &Value) -> Key {
    match value {
        Value::String(text) => Key::Str(text.clone()),
        Value::Number(number) => match number.as_i64() {
            Some(int) => Key::Int(int),
            None => Key::Str(number.to_string()),
        },
        other => Key::Str(other.to_string()),
    }
}

impl ItemKey for Value {
    fn item_key(&self, field: Option<&str>, index: usize) -> Key {
        match self {
            Value::Object(map) => field
                .and_then(|name| map.get(name))
                .map(scalar_key)
                .unwrap_or(Key::Index(index)),
            Value::Array(_) => Key::Index(index),
            scalar => scalar_key(scalar),
        }
    }
}

impl ItemKey for ObservableProxy {
    fn item_key(&self, field: Option<&str>, index: usize) -> Key {
        field
            .and_then(|name| self.get(name))
            .map(|value| scalar_key(&value))
            .unwrap_or(Key::Index(index))
    }
}

impl<T, O> ItemKey for Observable<T, O>
where
    T: ItemKey + Clone + PartialEq + 'static,
    O: 'static,
{
    fn item_key(&self, field: Option<&str>, index: usize) -> Key {
        self.with(|value| value.item_key(field, index))
    }
}
