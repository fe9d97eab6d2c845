//! Attribute bags for the rendering layer
//!
//! Each structural region of the widget gets a map of attributes to bind.
//! ARIA attributes are only emitted for accessible widgets. Event handling is
//! left to the host, which forwards events to the [`Select`](crate::Select)
//! operations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::item::{Item, ItemState};

/// Attribute value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

pub type AttrBag = BTreeMap<&'static str, AttrValue>;

/// Source of widget ids
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("selekt")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.prefix)
    }
}

/// Element ids derived from the widget id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementIds {
    root: String,
}

impl ElementIds {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn list(&self) -> String {
        format!("{}-list", self.root)
    }

    pub fn input(&self) -> String {
        format!("{}-input", self.root)
    }

    pub fn option(&self, item: &Item) -> String {
        format!("{}-option-{}", self.root, item.index_text())
    }
}

/// Widget state the attribute bags are computed from
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttrState {
    pub accessible: bool,
    /// Id configured by the owner, emitted on the root even without ARIA
    pub id: Option<String>,
    pub opened: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub placeholder: String,
    pub input_value: String,
    pub pointed: Option<Item>,
}

fn flag(bag: &mut AttrBag, name: &'static str, on: bool) {
    if on {
        bag.insert(name, AttrValue::Bool(true));
    }
}

pub fn root(ids: &ElementIds, state: &AttrState) -> AttrBag {
    let mut bag = AttrBag::new();
    bag.insert("tabindex", AttrValue::Int(-1));
    if let Some(id) = &state.id {
        bag.insert("id", id.as_str().into());
    }
    if state.accessible {
        bag.insert("id", ids.root().into());
        bag.insert("aria-haspopup", "listbox".into());
        bag.insert("aria-expanded", state.opened.into());
        bag.insert("aria-owns", ids.list().into());
        flag(&mut bag, "aria-disabled", state.disabled);
        flag(&mut bag, "aria-readonly", state.disabled || state.readonly);
    }
    bag
}

pub fn input(ids: &ElementIds, state: &AttrState) -> AttrBag {
    let mut bag = AttrBag::new();
    bag.insert("autocomplete", "off".into());
    bag.insert("type", "search".into());
    bag.insert("readonly", state.readonly.into());
    bag.insert("disabled", state.disabled.into());
    bag.insert("placeholder", state.placeholder.as_str().into());
    bag.insert("value", state.input_value.as_str().into());
    if state.accessible {
        bag.insert("id", ids.input().into());
        bag.insert("role", "textbox".into());
        bag.insert("aria-autocomplete", "list".into());
        bag.insert("aria-labelledby", "".into());
        bag.insert("aria-controls", ids.list().into());
        if let Some(pointed) = &state.pointed {
            bag.insert("aria-activedescendant", ids.option(pointed).into());
        }
    }
    bag
}

pub fn list(ids: &ElementIds, state: &AttrState) -> AttrBag {
    let mut bag = AttrBag::new();
    if state.accessible {
        bag.insert("id", ids.list().into());
        bag.insert("role", "listbox".into());
        flag(&mut bag, "aria-hidden", !state.opened);
    }
    bag
}

pub fn option(ids: &ElementIds, state: &AttrState, option: &ItemState) -> AttrBag {
    let mut bag = AttrBag::new();
    if state.accessible {
        bag.insert("id", ids.option(&option.item).into());
        bag.insert("role", "option".into());
        flag(&mut bag, "aria-selected", option.selected);
        flag(
            &mut bag,
            "aria-disabled",
            state.disabled || state.readonly || option.disabled,
        );
    }
    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{AsSpec, ItemFactory};
    use serde_json::json;

    fn item() -> Item {
        ItemFactory::new(AsSpec::parse("name:id:id")).of_raw(json!({"id": 7, "name": "Seven"}))
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("w");
        assert_eq!(ids.next_id(), "w-1");
        assert_eq!(ids.next_id(), "w-2");
        assert_eq!(SequentialIds::default().next_id(), "selekt-1");
    }

    #[test]
    fn test_element_ids() {
        let ids = ElementIds::new("w-1");
        assert_eq!(ids.list(), "w-1-list");
        assert_eq!(ids.input(), "w-1-input");
        assert_eq!(ids.option(&item()), "w-1-option-7");
    }

    #[test]
    fn test_plain_bags_have_no_aria() {
        let ids = ElementIds::new("w-1");
        let state = AttrState {
            placeholder: "Search...".into(),
            input_value: "se".into(),
            ..AttrState::default()
        };

        let root = root(&ids, &state);
        assert_eq!(root.get("tabindex"), Some(&AttrValue::Int(-1)));
        assert!(!root.contains_key("id"));

        let input = input(&ids, &state);
        assert_eq!(input.get("value"), Some(&AttrValue::from("se")));
        assert!(input.keys().all(|k| !k.starts_with("aria-")));
        assert!(list(&ids, &state).is_empty());
    }

    #[test]
    fn test_accessible_bags() {
        let ids = ElementIds::new("w-1");
        let state = AttrState {
            accessible: true,
            opened: false,
            readonly: true,
            pointed: Some(item()),
            ..AttrState::default()
        };

        let root = root(&ids, &state);
        assert_eq!(root.get("id"), Some(&AttrValue::from("w-1")));
        assert_eq!(root.get("aria-expanded"), Some(&AttrValue::Bool(false)));
        assert_eq!(root.get("aria-readonly"), Some(&AttrValue::Bool(true)));
        assert!(!root.contains_key("aria-disabled"));

        let input = input(&ids, &state);
        assert_eq!(
            input.get("aria-activedescendant"),
            Some(&AttrValue::from("w-1-option-7"))
        );

        assert_eq!(list(&ids, &state).get("aria-hidden"), Some(&AttrValue::Bool(true)));

        let option = option(
            &ids,
            &state,
            &ItemState {
                item: item(),
                position: 0,
                selected: true,
                disabled: false,
                pointed: true,
            },
        );
        assert_eq!(option.get("aria-selected"), Some(&AttrValue::Bool(true)));
        assert_eq!(option.get("aria-disabled"), Some(&AttrValue::Bool(true)));
    }
}
