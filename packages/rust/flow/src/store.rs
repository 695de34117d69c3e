//! The shared state store threaded through a flow run.
//!
//! The store maps compartment names to typed values. Each unit reads whatever
//! compartments it needs in `prepare` and writes its own in `finalize`; the
//! store is the only channel between stages.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use reportflow_shared::{ReportFlowError, Result};

/// A typed region of the [`SharedStore`], addressed by [`Compartment::NAME`].
pub trait Compartment: Any + Send + Sync + Serialize {
    /// Store key; at most one value per name.
    const NAME: &'static str;
}

/// Object-safe view of a stored compartment.
trait StoredCompartment: Send + Sync {
    fn to_json(&self) -> serde_json::Result<Value>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Compartment> StoredCompartment for T {
    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Mutable mapping from compartment names to compartment data.
///
/// Owned by a single flow run; nothing here is synchronized because units
/// activate strictly one at a time.
#[derive(Default)]
pub struct SharedStore {
    compartments: HashMap<&'static str, Box<dyn StoredCompartment>>,
    write_log: Vec<&'static str>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`put`](Self::put) for seeding the initial store.
    pub fn with<T: Compartment>(mut self, value: T) -> Self {
        self.put(value);
        self
    }

    /// Write (or overwrite) compartment `T`.
    pub fn put<T: Compartment>(&mut self, value: T) {
        tracing::trace!(compartment = T::NAME, "store write");
        self.compartments.insert(T::NAME, Box::new(value));
        self.write_log.push(T::NAME);
    }

    pub fn get<T: Compartment>(&self) -> Option<&T> {
        self.compartments
            .get(T::NAME)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: Compartment>(&mut self) -> Option<&mut T> {
        self.compartments
            .get_mut(T::NAME)
            .and_then(|c| c.as_any_mut().downcast_mut::<T>())
    }

    /// Like [`get`](Self::get), failing with `MissingDependency` when absent.
    pub fn require<T: Compartment>(&self, hint: &str) -> Result<&T> {
        self.get::<T>()
            .ok_or_else(|| ReportFlowError::missing(T::NAME, hint))
    }

    pub fn contains<T: Compartment>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Whether any compartment is stored under `name`.
    pub fn contains_name(&self, name: &str) -> bool {
        self.compartments.contains_key(name)
    }

    /// Compartment names in the order they were written (rewrites repeat).
    pub fn written(&self) -> &[&'static str] {
        &self.write_log
    }

    pub fn len(&self) -> usize {
        self.compartments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compartments.is_empty()
    }

    /// Serialize every compartment into one JSON object for persistence.
    pub fn snapshot(&self) -> Result<Value> {
        let mut names: Vec<&&'static str> = self.compartments.keys().collect();
        names.sort();

        let mut map = Map::new();
        for name in names {
            let value = self.compartments[*name].to_json().map_err(|e| {
                ReportFlowError::parse(format!("failed to serialize compartment `{name}`: {e}"))
            })?;
            map.insert((*name).to_string(), value);
        }
        Ok(Value::Object(map))
    }
}

impl fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.compartments.keys().collect();
        names.sort();
        f.debug_struct("SharedStore")
            .field("compartments", &names)
            .field("write_log", &self.write_log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize, PartialEq)]
    struct Input {
        x: i32,
    }

    impl Compartment for Input {
        const NAME: &'static str = "input";
    }

    #[derive(Debug, Serialize)]
    struct Notes(Vec<String>);

    impl Compartment for Notes {
        const NAME: &'static str = "notes";
    }

    #[test]
    fn put_and_get_typed() {
        let mut store = SharedStore::new().with(Input { x: 1 });
        assert_eq!(store.get::<Input>(), Some(&Input { x: 1 }));
        assert!(store.get::<Notes>().is_none());

        store.put(Notes(vec!["a".into()]));
        store.get_mut::<Notes>().unwrap().0.push("b".into());
        assert_eq!(store.get::<Notes>().unwrap().0.len(), 2);
        assert_eq!(store.written(), &["input", "notes"]);
    }

    #[test]
    fn require_reports_missing_compartment() {
        let store = SharedStore::new();
        let err = store.require::<Notes>("write notes first").unwrap_err();
        match err {
            ReportFlowError::MissingDependency { compartment, hint } => {
                assert_eq!(compartment, "notes");
                assert_eq!(hint, "write notes first");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn snapshot_serializes_all_compartments() {
        let store = SharedStore::new()
            .with(Input { x: 7 })
            .with(Notes(vec!["n".into()]));
        let snap = store.snapshot().unwrap();
        assert_eq!(snap["input"]["x"], 7);
        assert_eq!(snap["notes"][0], "n");
        assert_eq!(store.len(), 2);
        assert!(store.contains_name("input"));
        assert!(!store.contains_name("output"));
    }
}
