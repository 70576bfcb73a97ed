//! Observable Object Proxies
//!
//! An [`ObservableProxy`] turns a JSON-like object into a record of reactive
//! fields. Scalars become [`Observable`] cells, arrays become
//! [`ObservableArray`]s and nested objects become nested proxies.
//!
//! The set of field names is fixed when the proxy is built. Writing an
//! unknown field is ignored: it is neither an error nor a schema change.

use std::fmt::{self, Debug};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{trace, warn};

use super::array::{json_type_name, ObservableArray};
use super::computed::Dependency;
use super::observable::Observable;
use super::subscriber::Subscription;
use crate::error::{Error, Result};

/// One reactive field of a proxy.
#[derive(Clone)]
pub enum ProxyField {
    Item(Observable<Value>),
    Array(ObservableArray<Value>),
    Nested(ObservableProxy),
}

impl ProxyField {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => ProxyField::Array(ObservableArray::new(items)),
            Value::Object(map) => ProxyField::Nested(ObservableProxy::from_map(map)),
            other => ProxyField::Item(Observable::new(other)),
        }
    }

    /// Current value of the field.
    pub fn value(&self) -> Value {
        match self {
            ProxyField::Item(cell) => cell.get(),
            ProxyField::Array(array) => Value::Array(array.to_vec()),
            ProxyField::Nested(proxy) => proxy.snapshot(),
        }
    }

    fn assign(&self, name: &str, value: Value) {
        match (self, value) {
            (ProxyField::Item(cell), value) => cell.set(value),
            (ProxyField::Array(array), Value::Array(items)) => array.set(items),
            (ProxyField::Nested(proxy), value @ Value::Object(_)) => proxy.update(&value),
            (_, other) => {
                warn!(
                    field = name,
                    found = json_type_name(&other),
                    "proxy field assignment with mismatched shape ignored"
                );
            }
        }
    }

    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription {
        match self {
            ProxyField::Item(cell) => cell.watch(notify),
            ProxyField::Array(array) => array.watch(notify),
            ProxyField::Nested(proxy) => proxy.watch(notify),
        }
    }

    fn cleanup(&self) {
        match self {
            ProxyField::Item(cell) => cell.cleanup(),
            ProxyField::Array(array) => array.cleanup(),
            ProxyField::Nested(proxy) => proxy.cleanup(),
        }
    }
}

/// A fixed-shape record of reactive fields.
///
/// # Example
///
/// ```rust,ignore
/// let user = ObservableProxy::new(json!({"name": "Ada", "tags": ["math"]}))?;
/// user.set("name", json!("Grace"));
/// user.array("tags").unwrap().push(json!("navy"));
/// assert_eq!(user.snapshot(), json!({"name": "Grace", "tags": ["math", "navy"]}));
/// ```
#[derive(Clone)]
pub struct ObservableProxy {
    fields: Rc<IndexMap<String, ProxyField>>,
}

impl ObservableProxy {
    /// Build a proxy from a JSON object.
    pub fn new(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(Error::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Build a proxy from any serializable struct or map.
    pub fn from_serialize<S: Serialize>(source: &S) -> Result<Self> {
        let value = serde_json::to_value(source).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::new(value)
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let fields = map
            .into_iter()
            .map(|(name, value)| (name, ProxyField::from_value(value)))
            .collect();
        Self {
            fields: Rc::new(fields),
        }
    }

    /// Field names, in creation order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field(&self, name: &str) -> Option<&ProxyField> {
        self.fields.get(name)
    }

    /// Scalar field cell.
    pub fn item(&self, name: &str) -> Option<Observable<Value>> {
        match self.fields.get(name)? {
            ProxyField::Item(cell) => Some(cell.clone()),
            _ => None,
        }
    }

    /// Array field cell.
    pub fn array(&self, name: &str) -> Option<ObservableArray<Value>> {
        match self.fields.get(name)? {
            ProxyField::Array(array) => Some(array.clone()),
            _ => None,
        }
    }

    /// Nested proxy field.
    pub fn nested(&self, name: &str) -> Option<ObservableProxy> {
        match self.fields.get(name)? {
            ProxyField::Nested(proxy) => Some(proxy.clone()),
            _ => None,
        }
    }

    /// Live value of one field.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.get(name).map(ProxyField::value)
    }

    /// Write one field. Returns `false`, and does nothing, for unknown names.
    pub fn set(&self, name: &str, value: Value) -> bool {
        match self.fields.get(name) {
            Some(field) => {
                field.assign(name, value);
                true
            }
            None => {
                trace!(field = name, "assignment to unknown proxy field ignored");
                false
            }
        }
    }

    /// Plain JSON copy of the current values.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.snapshot_map())
    }

    fn snapshot_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.value()))
            .collect()
    }

    /// Deserialize the current values into `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.snapshot()).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Write every known field present in `values`. Unknown keys are ignored.
    pub fn update(&self, values: &Value) {
        let Value::Object(map) = values else {
            warn!(found = json_type_name(values), "proxy update with a non-object ignored");
            return;
        };
        for (name, value) in map {
            self.set(name, value.clone());
        }
    }

    /// A new proxy with fresh cells seeded from the current values.
    pub fn deep_clone(&self) -> Self {
        Self::from_map(self.snapshot_map())
    }

    /// Clean up every field cell.
    pub fn cleanup(&self) {
        for field in self.fields.values() {
            field.cleanup();
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.fields, &other.fields)
    }
}

impl Dependency for ObservableProxy {
    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription {
        Subscription::merge(
            self.fields
                .values()
                .map(|field| field.watch(Rc::clone(&notify)))
                .collect(),
        )
    }
}

/// Proxies compare by identity.
impl PartialEq for ObservableProxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Debug for ObservableProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableProxy")
            .field("value", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::computed;
    use serde::Deserialize;
    use serde_json::json;

    fn user() -> ObservableProxy {
        ObservableProxy::new(json!({
            "name": "Ada",
            "age": 36,
            "tags": ["math"],
            "address": {"city": "London"}
        }))
        .unwrap()
    }

    #[test]
    fn fields_follow_value_shape() {
        let proxy = user();
        assert!(proxy.item("name").is_some());
        assert!(proxy.array("tags").is_some());
        assert!(proxy.nested("address").is_some());
        assert_eq!(proxy.keys().collect::<Vec<_>>(), vec!["name", "age", "tags", "address"]);
    }

    #[test]
    fn writes_route_to_cells() {
        let proxy = user();
        let name = proxy.item("name").unwrap();

        assert!(proxy.set("name", json!("Grace")));
        assert_eq!(name.get(), json!("Grace"));
        assert_eq!(proxy.get("name"), Some(json!("Grace")));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let proxy = user();
        assert!(!proxy.set("email", json!("ada@example.com")));
        assert!(!proxy.has("email"));
        assert_eq!(proxy.len(), 4);
    }

    #[test]
    fn update_and_snapshot() {
        let proxy = user();
        proxy.update(&json!({"age": 37, "address": {"city": "Paris"}, "extra": true}));

        assert_eq!(
            proxy.snapshot(),
            json!({
                "name": "Ada",
                "age": 37,
                "tags": ["math"],
                "address": {"city": "Paris"}
            })
        );
    }

    #[test]
    fn deep_clone_is_independent() {
        let proxy = user();
        let copy = proxy.deep_clone();
        copy.set("name", json!("Lin"));

        assert_eq!(proxy.get("name"), Some(json!("Ada")));
        assert_eq!(copy.get("name"), Some(json!("Lin")));
        assert!(!copy.ptr_eq(&proxy));
    }

    #[test]
    fn computed_tracks_nested_fields() {
        let proxy = user();
        let source = proxy.clone();
        let summary = computed(
            move || {
                let snapshot = source.snapshot();
                format!("{} @ {}", snapshot["name"], snapshot["address"]["city"])
            },
            &[&proxy],
        );
        assert_eq!(summary.get(), r#""Ada" @ "London""#);

        proxy.nested("address").unwrap().set("city", json!("Oslo"));
        assert_eq!(summary.get(), r#""Ada" @ "Oslo""#);
    }

    #[test]
    fn typed_round_trip_through_serde() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }

        let proxy = ObservableProxy::from_serialize(&Point { x: 1, y: 2 }).unwrap();
        proxy.set("y", json!(5));
        assert_eq!(proxy.to_typed::<Point>().unwrap(), Point { x: 1, y: 5 });
    }

    #[test]
    fn non_objects_are_rejected() {
        let err = ObservableProxy::new(json!([1, 2])).unwrap_err();
        assert_eq!(err, Error::NotAnObject { found: "array" });
    }
}
