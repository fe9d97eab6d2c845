//! Item model
//!
//! Every option shown by the select is an [`Item`]: a normalized
//! `{label, value, index, group}` view over a raw record. How raw records map
//! onto those fields is described by an [`AsSpec`] and applied by the
//! [`ItemFactory`], the only place items are built from raw data.
//!
//! # Example
//!
//! ```
//! use selekt::item::{AsSpec, ItemFactory};
//! use serde_json::json;
//!
//! let factory = ItemFactory::new(AsSpec::parse("name::id"));
//! let item = factory.of_raw(json!({"id": 1, "name": "A"}));
//!
//! assert_eq!(item.label, json!("A"));
//! assert_eq!(item.index, json!(1));
//! assert_eq!(item.value, json!({"id": 1, "name": "A"}));
//! ```

use std::fmt;
use std::sync::Arc;

use selekt_core::{Derived, ReactiveGraph, Signal};
use serde_json::{Map, Value};

use crate::error::{Result, SelectError};
use crate::json::{self, FieldPath};

/// Normalized representation of one selectable option
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// Display value
    pub label: Value,
    /// Value carried into the model
    pub value: Value,
    /// Identity key used for equality
    pub index: Value,
    /// The original record
    pub raw: Value,
    pub group: Option<String>,
    /// Built from insufficient data, pending resolution
    pub poor: bool,
    /// Synthesized from the phrase by tagging
    pub new: bool,
    /// Pushed into the option list after tagging
    pub added: bool,
    /// Members of a group header
    pub members: Option<Vec<Item>>,
}

impl Item {
    /// Group header item carrying its members
    pub fn group(name: impl Into<String>, members: Vec<Item>) -> Self {
        let name = Value::String(name.into());
        Self {
            label: name.clone(),
            value: name.clone(),
            index: name.clone(),
            raw: name,
            group: None,
            poor: false,
            new: false,
            added: false,
            members: Some(members),
        }
    }

    pub fn is_group(&self) -> bool {
        self.members.is_some()
    }

    /// Members of a group, empty for plain items
    pub fn members(&self) -> &[Item] {
        self.members.as_deref().unwrap_or_default()
    }

    /// Identity comparison by index
    pub fn equals(&self, other: &Item) -> bool {
        json::loose_eq(&self.index, &other.index)
    }

    /// Comparison by lowercased label
    pub fn matches(&self, other: &Item) -> bool {
        let lower = |item: &Item| json::display(&item.label).map(|l| l.to_lowercase());
        lower(self) == lower(other)
    }

    /// Label as display text
    pub fn label_text(&self) -> String {
        json::display(&self.label).unwrap_or_default()
    }

    /// Index as display text, used for element ids
    pub fn index_text(&self) -> String {
        json::display(&self.index).unwrap_or_default()
    }
}

/// An item projected for rendering
#[derive(Clone, Debug, PartialEq)]
pub struct ItemState {
    pub item: Item,
    pub position: usize,
    pub selected: bool,
    pub disabled: bool,
    pub pointed: bool,
}

pub type AccessorGet = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;
pub type AccessorSet = Arc<dyn Fn(&mut Value, Value) + Send + Sync>;

/// How one item field is read from (and written into) a raw record
#[derive(Clone)]
pub enum Accessor {
    Path(FieldPath),
    Custom {
        get: AccessorGet,
        set: Option<AccessorSet>,
    },
}

impl Accessor {
    pub fn path(path: &str) -> Self {
        Accessor::Path(FieldPath::parse(path))
    }

    pub fn custom<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
        S: Fn(&mut Value, Value) + Send + Sync + 'static,
    {
        Accessor::Custom {
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        }
    }

    /// Read-only accessor
    pub fn getter<G>(get: G) -> Self
    where
        G: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Accessor::Custom {
            get: Arc::new(get),
            set: None,
        }
    }

    fn read(&self, raw: &Value) -> Option<Value> {
        match self {
            Accessor::Path(path) => path.get(raw).cloned(),
            Accessor::Custom { get, .. } => get(raw),
        }
    }

    fn write(&self, raw: &mut Value, value: Value) {
        match self {
            Accessor::Path(path) => path.set(raw, value),
            Accessor::Custom { set: Some(set), .. } => set(raw, value),
            Accessor::Custom { set: None, .. } => {}
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Path(path) => write!(f, "Path({path})"),
            Accessor::Custom { set, .. } => f
                .debug_struct("Custom")
                .field("writable", &set.is_some())
                .finish(),
        }
    }
}

const LABEL: usize = 0;
const VALUE: usize = 1;
const INDEX: usize = 2;
const GROUP: usize = 3;

/// Mapping of raw records onto `label:value:index:group`
#[derive(Clone, Debug, Default)]
pub struct AsSpec {
    slots: [Option<Accessor>; 4],
}

impl AsSpec {
    /// Parse the `"label:value:index:group"` shorthand; empty slots stay unset
    pub fn parse(spec: &str) -> Self {
        let mut slots: [Option<Accessor>; 4] = Default::default();
        for (slot, path) in slots.iter_mut().zip(spec.split(':')) {
            if !path.is_empty() {
                *slot = Some(Accessor::path(path));
            }
        }
        Self { slots }
    }

    pub fn label(mut self, accessor: Accessor) -> Self {
        self.slots[LABEL] = Some(accessor);
        self
    }

    pub fn value(mut self, accessor: Accessor) -> Self {
        self.slots[VALUE] = Some(accessor);
        self
    }

    pub fn index(mut self, accessor: Accessor) -> Self {
        self.slots[INDEX] = Some(accessor);
        self
    }

    pub fn group(mut self, accessor: Accessor) -> Self {
        self.slots[GROUP] = Some(accessor);
        self
    }

    /// No label, value or index mapping: records are the values themselves
    pub fn is_primitive(&self) -> bool {
        self.slots[..3].iter().all(Option::is_none)
    }
}

impl From<&str> for AsSpec {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

/// Builds items according to an [`AsSpec`]
#[derive(Clone, Debug, Default)]
pub struct ItemFactory {
    spec: AsSpec,
    primitive: bool,
    poor: bool,
}

impl ItemFactory {
    pub fn new(spec: AsSpec) -> Self {
        let primitive = spec.is_primitive();
        // A mapped value slot means the model only holds part of the record
        let poor = !primitive && spec.slots[VALUE].is_some();
        Self {
            spec,
            primitive,
            poor,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive
    }

    /// Whether items built from model values are poor
    pub fn is_poor(&self) -> bool {
        self.poor
    }

    fn read(&self, slot: usize, raw: &Value) -> Option<Value> {
        let value = match &self.spec.slots[slot] {
            Some(accessor) => accessor.read(raw),
            None if slot == GROUP => None,
            None => Some(raw.clone()),
        };
        value.filter(|v| !v.is_null())
    }

    /// Build an item from a source record
    pub fn of_raw(&self, raw: Value) -> Item {
        let mut label = self.read(LABEL, &raw);
        let mut value = self.read(VALUE, &raw);
        let mut index = self.read(INDEX, &raw);
        let group = self
            .read(GROUP, &raw)
            .and_then(|g| json::display(&g))
            .filter(|g| !g.is_empty());

        // Insufficient records leave some fields unset
        if label.is_none() {
            label = value.clone();
        }
        if value.is_none() {
            value = label.clone();
        }
        if index.is_none() {
            index = label.clone();
        }

        Item {
            label: label.unwrap_or(Value::Null),
            value: value.unwrap_or(Value::Null),
            index: index.unwrap_or(Value::Null),
            raw,
            group,
            poor: false,
            new: false,
            added: false,
            members: None,
        }
    }

    /// Build an item from a model value
    pub fn of_value(&self, value: Value) -> Result<Item> {
        if self.primitive {
            return Ok(self.of_raw(value));
        }

        let raw = match &self.spec.slots[VALUE] {
            Some(accessor) => {
                let mut raw = Value::Object(Map::new());
                accessor.write(&mut raw, value);
                raw
            }
            None if value.is_object() || value.is_array() => value,
            None => return Err(SelectError::ExpectedNonPrimitive(value.to_string())),
        };

        let mut item = self.of_raw(raw);
        item.poor = self.poor;
        Ok(item)
    }

    /// Build a tag item from free text
    pub fn of_phrase(&self, phrase: &str) -> Item {
        let phrase = Value::String(phrase.to_owned());
        let mut item = if self.primitive {
            self.of_raw(phrase)
        } else {
            let mut raw = Value::Object(Map::new());
            if let Some(accessor) = &self.spec.slots[LABEL] {
                accessor.write(&mut raw, phrase);
            }
            let mut item = self.of_raw(raw);
            item.poor = self.poor;
            item
        };
        item.new = true;
        item
    }
}

/// Reactive owner of the item mapping
#[derive(Clone, Copy, Debug)]
pub struct ItemHook {
    spec: Signal<AsSpec>,
    factory: Derived<ItemFactory>,
}

impl ItemHook {
    pub fn new(graph: &mut ReactiveGraph, spec: AsSpec) -> Self {
        let spec = graph.create_signal(spec);
        let factory =
            graph.create_derived(move |g| ItemFactory::new(g.get(spec).unwrap_or_default()));
        Self { spec, factory }
    }

    /// Current factory (tracked)
    pub fn factory(&self, graph: &mut ReactiveGraph) -> ItemFactory {
        graph.get_derived(self.factory).unwrap_or_default()
    }

    pub fn set_spec(&self, graph: &mut ReactiveGraph, spec: AsSpec) {
        graph.set(self.spec, spec);
    }
}
