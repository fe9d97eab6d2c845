//! Candidate list
//!
//! Derives what the list shows from the source options, the phrase and the
//! selection:
//!
//! 1. selection mode filter (`skip` hides selected options)
//! 2. text filter, skipped for server filtered sources
//! 3. grouping into header + member runs
//! 4. tag synthesis from the phrase
//!
//! It also owns the selection entry point which applies the mode to writes.

use std::fmt;
use std::sync::Arc;

use selekt_core::{Commit, Derived, ReactiveGraph, Signal, WeakRuntime};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::item::{Item, ItemHook, ItemState};
use crate::json::{self, FieldPath};
use crate::model::ModelHook;
use crate::phrase::PhraseHook;
use crate::src::SrcHook;

/// Default keys that turn the phrase into a tag
pub const DEFAULT_TAG_ON: &str = "Enter,Tab, ,";

/// How already selected options are treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Selected options are hidden from the list
    #[default]
    Skip,
    /// The same option may be selected many times
    Append,
    /// Selecting a selected option deselects it
    Toggle,
    /// Selected options stay visible but cannot be selected again
    Disable,
}

pub type FilterFn = Arc<dyn Fn(&Item, &str) -> bool + Send + Sync>;

/// Text filter configuration
#[derive(Clone, Default)]
pub enum FilterSpec {
    /// Filter by label unless the source filters server side
    #[default]
    Auto,
    Off,
    /// Filter by label
    On,
    /// Dotted paths into the raw record, `*` and `**` wildcards allowed
    Props(Vec<String>),
    Predicate(FilterFn),
}

impl FilterSpec {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Item, &str) -> bool + Send + Sync + 'static,
    {
        FilterSpec::Predicate(Arc::new(f))
    }

    /// Normalize into a predicate, `None` when nothing is filtered
    fn compile(&self, dynamic: bool) -> Option<FilterFn> {
        let paths: Vec<FieldPath> = match self {
            FilterSpec::Off => return None,
            FilterSpec::Auto if dynamic => return None,
            FilterSpec::Predicate(f) => return Some(f.clone()),
            FilterSpec::Auto | FilterSpec::On => vec![FieldPath::parse("label")],
            FilterSpec::Props(props) => props
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| FieldPath::parse(&format!("raw.{p}")))
                .collect(),
        };
        let mut paths = paths;
        paths.push(FieldPath::parse("group"));
        Some(Arc::new(move |item: &Item, phrase: &str| {
            filter_by_props(&paths, item, phrase)
        }))
    }
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterSpec::Auto => f.write_str("Auto"),
            FilterSpec::Off => f.write_str("Off"),
            FilterSpec::On => f.write_str("On"),
            FilterSpec::Props(props) => f.debug_tuple("Props").field(props).finish(),
            FilterSpec::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

impl From<bool> for FilterSpec {
    fn from(enabled: bool) -> Self {
        if enabled {
            FilterSpec::On
        } else {
            FilterSpec::Off
        }
    }
}

/// Property list separated by anything but word characters, dots and stars
impl From<&str> for FilterSpec {
    fn from(props: &str) -> Self {
        FilterSpec::Props(
            props
                .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.' || c == '*'))
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }
}

impl From<Vec<&str>> for FilterSpec {
    fn from(props: Vec<&str>) -> Self {
        FilterSpec::Props(props.into_iter().map(str::to_owned).collect())
    }
}

/// Item as a record, so filter paths can address `label`, `raw.*`, etc
fn item_record(item: &Item) -> Value {
    let mut record = Map::new();
    record.insert("label".into(), item.label.clone());
    record.insert("value".into(), item.value.clone());
    record.insert("index".into(), item.index.clone());
    record.insert("raw".into(), item.raw.clone());
    record.insert(
        "group".into(),
        item.group.clone().map_or(Value::Null, Value::String),
    );
    Value::Object(record)
}

fn expand_path(path: &FieldPath, record: &Value) -> Vec<FieldPath> {
    let (prefix, last) = path.split_last();
    if let Some(wildcard @ ("*" | "**")) = last {
        return match prefix.get(record) {
            Some(base) => json::crawl(base, wildcard == "**")
                .into_iter()
                .map(|tail| prefix.join(&tail))
                .collect(),
            None => Vec::new(),
        };
    }
    match path.get(record) {
        Some(target @ (Value::Object(_) | Value::Array(_))) => json::crawl(target, false)
            .into_iter()
            .map(|tail| path.join(&tail))
            .collect(),
        _ => vec![path.clone()],
    }
}

/// Case insensitive substring match of `phrase` against the values at `paths`
///
/// Paths address the item (`label`, `group`, `raw.name`). A path ending in
/// `*` tests the own keys below it, `**` every nested key. A path leading to
/// an object or array tests its own keys.
pub fn filter_by_props(paths: &[FieldPath], item: &Item, phrase: &str) -> bool {
    let phrase = phrase.to_lowercase();
    let record = item_record(item);
    paths
        .iter()
        .flat_map(|path| expand_path(path, &record))
        .any(|path| match path.get(&record) {
            Some(Value::Object(_)) | Some(Value::Null) | None => false,
            Some(value) => json::display(value)
                .is_some_and(|text| text.to_lowercase().contains(&phrase)),
        })
}

/// Tagging configuration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Tagging {
    #[default]
    Off,
    /// Tag on the configured trigger keys
    On,
    /// Tag on these keys instead of the configured trigger keys
    Keys(Vec<String>),
}

impl Tagging {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Tagging::Off)
    }
}

impl From<bool> for Tagging {
    fn from(enabled: bool) -> Self {
        if enabled {
            Tagging::On
        } else {
            Tagging::Off
        }
    }
}

impl From<&str> for Tagging {
    fn from(keys: &str) -> Self {
        Tagging::Keys(parse_keys(keys))
    }
}

/// Split a comma separated key list; an empty entry stands for the comma key
pub fn parse_keys(keys: &str) -> Vec<String> {
    keys.split(',')
        .map(|key| if key.is_empty() { "," } else { key })
        .map(str::to_owned)
        .collect()
}

/// What a disable predicate can see besides the item
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisableContext {
    pub selection: Vec<Item>,
    pub phrase: String,
}

pub type DisableFn = Arc<dyn Fn(&DisableContext, &Item) -> bool + Send + Sync>;

/// Selected/disabled checks against one snapshot of the selection
pub struct Checks {
    context: DisableContext,
    mode: SelectionMode,
    disable: Option<DisableFn>,
}

impl Checks {
    /// Groups are selected when every member is
    pub fn selected(&self, item: &Item) -> bool {
        if item.is_group() {
            return item.members().iter().all(|member| self.selected(member));
        }
        self.context
            .selection
            .iter()
            .any(|selected| selected.equals(item))
    }

    /// Groups are disabled when every member is
    pub fn disabled(&self, item: &Item) -> bool {
        if item.is_group() {
            return item.members().iter().all(|member| self.disabled(member));
        }
        self.disable
            .as_ref()
            .is_some_and(|disable| disable(&self.context, item))
            || (self.mode == SelectionMode::Disable && self.selected(item))
    }
}

/// Re-order items into group runs
///
/// Ungrouped items come first, then one header followed by its members per
/// group, in the order groups first appear in `all`. Empty groups are left
/// out.
fn group_items(all: &[Item], filtered: Vec<Item>) -> Vec<Item> {
    if !filtered.iter().any(|item| item.group.is_some()) {
        return filtered;
    }

    let mut order: Vec<String> = Vec::new();
    for name in all.iter().chain(filtered.iter()).filter_map(|i| i.group.as_deref()) {
        if !order.iter().any(|seen| seen == name) {
            order.push(name.to_owned());
        }
    }

    let (grouped, mut result): (Vec<Item>, Vec<Item>) =
        filtered.into_iter().partition(|item| item.group.is_some());

    for name in order {
        let members: Vec<Item> = grouped
            .iter()
            .filter(|item| item.group.as_deref() == Some(name.as_str()))
            .cloned()
            .collect();
        if members.is_empty() {
            continue;
        }
        result.push(Item::group(name, members.clone()));
        result.extend(members);
    }
    result
}

/// Reactive owner of the candidate list
#[derive(Clone, Debug)]
pub struct ItemsHook {
    mode: Signal<SelectionMode>,
    filter: Signal<FilterSpec>,
    tagging: Signal<Tagging>,
    tag_on: Signal<Vec<String>>,
    disable: Signal<Option<DisableFn>>,
    tag_keys: Derived<Vec<String>>,
    filtered: Derived<Vec<Item>>,
    tags: Derived<Vec<Item>>,
    value: Derived<Vec<Item>>,
    phrase: PhraseHook,
    model: ModelHook,
}

impl ItemsHook {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &mut ReactiveGraph,
        item: ItemHook,
        phrase: PhraseHook,
        src: SrcHook,
        model: ModelHook,
        mode: SelectionMode,
        filter: FilterSpec,
        tagging: Tagging,
        tag_on: Vec<String>,
        disable: Option<DisableFn>,
    ) -> Self {
        let mode = graph.create_signal(mode);
        let filter = graph.create_signal(filter);
        let tagging = graph.create_signal(tagging);
        let tag_on = graph.create_signal(tag_on);
        let disable = graph.create_signal(disable);

        let tag_keys = graph.create_derived(move |g| {
            let keys = match g.get(tagging) {
                Some(Tagging::Keys(keys)) => keys,
                _ => g.get(tag_on).unwrap_or_default(),
            };
            keys.into_iter().filter(|key| !key.is_empty()).collect::<Vec<_>>()
        });

        let matcher = graph.create_derived(move |g| {
            let dynamic = src.is_dynamic(g);
            g.with(filter, |spec| spec.compile(dynamic)).flatten()
        });

        let moded = graph.create_derived(move |g| {
            let data = src.data(g);
            if g.get(mode) != Some(SelectionMode::Skip) {
                return data;
            }
            let selection = model.items(g);
            data.into_iter()
                .filter(|item| !selection.iter().any(|selected| selected.equals(item)))
                .collect::<Vec<_>>()
        });

        let phrase_for_filter = phrase.clone();
        let filtered = graph.create_derived(move |g| {
            let candidates = g.get_derived(moded).unwrap_or_default();
            let phrase = phrase_for_filter.value(g);
            let matcher = g.get_derived(matcher).flatten();
            match matcher {
                Some(matcher) if !phrase.is_empty() => candidates
                    .into_iter()
                    .filter(|item| matcher(item, &phrase))
                    .collect::<Vec<_>>(),
                _ => candidates,
            }
        });

        let grouped = graph.create_derived(move |g| {
            let all = src.data(g);
            group_items(&all, g.get_derived(filtered).unwrap_or_default())
        });

        let phrase_for_tags = phrase.clone();
        let tags = graph.create_derived(move |g| {
            if !g.with(tagging, Tagging::is_enabled).unwrap_or(false) {
                return Vec::new();
            }
            let text = phrase_for_tags.value(g);
            if text.is_empty() || src.is_busy(g) {
                return Vec::new();
            }
            if src.is_dynamic(g) && phrase_for_tags.is_typing(g) {
                return Vec::new();
            }

            let tag = item.factory(g).of_phrase(&text);
            let filtered = g.get_derived(filtered).unwrap_or_default();
            if filtered.iter().any(|existing| existing.matches(&tag)) {
                return Vec::new();
            }
            vec![tag]
        });

        let value = graph.create_derived(move |g| {
            let mut value = g.get_derived(tags).unwrap_or_default();
            value.extend(g.get_derived(grouped).unwrap_or_default());
            value
        });

        Self {
            mode,
            filter,
            tagging,
            tag_on,
            disable,
            tag_keys,
            filtered,
            tags,
            value,
            phrase,
            model,
        }
    }

    /// Final candidate list: tags followed by grouped, filtered options
    /// (tracked)
    pub fn value(&self, graph: &mut ReactiveGraph) -> Vec<Item> {
        graph.get_derived(self.value).unwrap_or_default()
    }

    /// Filtered options without tags and group headers (tracked)
    pub fn filtered(&self, graph: &mut ReactiveGraph) -> Vec<Item> {
        graph.get_derived(self.filtered).unwrap_or_default()
    }

    /// Synthesized tag candidates (tracked)
    pub fn tags(&self, graph: &mut ReactiveGraph) -> Vec<Item> {
        graph.get_derived(self.tags).unwrap_or_default()
    }

    pub fn mode(&self, graph: &ReactiveGraph) -> SelectionMode {
        graph.get(self.mode).unwrap_or_default()
    }

    pub fn is_tagging(&self, graph: &ReactiveGraph) -> bool {
        graph.with(self.tagging, Tagging::is_enabled).unwrap_or(false)
    }

    /// Keys that turn the phrase into a tag (tracked)
    pub fn tag_keys(&self, graph: &mut ReactiveGraph) -> Vec<String> {
        graph.get_derived(self.tag_keys).unwrap_or_default()
    }

    /// Snapshot for selected/disabled checks
    pub fn checks(&self, graph: &mut ReactiveGraph) -> Checks {
        Checks {
            context: DisableContext {
                selection: self.model.items(graph),
                phrase: self.phrase.value(graph),
            },
            mode: self.mode(graph),
            disable: graph.get(self.disable).flatten(),
        }
    }

    pub fn check_selected(&self, graph: &mut ReactiveGraph, item: &Item) -> bool {
        self.checks(graph).selected(item)
    }

    pub fn check_disabled(&self, graph: &mut ReactiveGraph, item: &Item) -> bool {
        self.checks(graph).disabled(item)
    }

    /// Candidates with their render state; `pointer` is the pointed position
    pub fn states(&self, graph: &mut ReactiveGraph, pointer: isize) -> Vec<ItemState> {
        let checks = self.checks(graph);
        self.value(graph)
            .into_iter()
            .enumerate()
            .map(|(position, item)| ItemState {
                selected: checks.selected(&item),
                disabled: checks.disabled(&item),
                pointed: usize::try_from(pointer).is_ok_and(|p| p == position),
                position,
                item,
            })
            .collect()
    }

    /// Select items according to the selection mode
    ///
    /// Groups expand into their unselected members and disabled items are
    /// dropped. Returns `None` when nothing is left to select.
    pub fn select(
        &self,
        graph: &mut ReactiveGraph,
        runtime: &WeakRuntime,
        items: Vec<Item>,
    ) -> Option<Commit> {
        let checks = self.checks(graph);
        let items: Vec<Item> = items
            .into_iter()
            .flat_map(|item| {
                if item.is_group() {
                    item.members()
                        .iter()
                        .filter(|member| !checks.selected(member))
                        .cloned()
                        .collect()
                } else {
                    vec![item]
                }
            })
            .filter(|item| !checks.disabled(item))
            .collect();

        if items.is_empty() {
            tracing::trace!("nothing selectable");
            return None;
        }

        let commit = if self.model.is_multiple(graph) && checks.mode != SelectionMode::Append {
            self.model.toggle(graph, runtime, items)
        } else {
            self.model.append(graph, runtime, items)
        };
        Some(commit)
    }

    pub fn set_mode(&self, graph: &mut ReactiveGraph, mode: SelectionMode) {
        graph.set_if_changed(self.mode, mode);
    }

    pub fn set_filter(&self, graph: &mut ReactiveGraph, filter: FilterSpec) {
        graph.set(self.filter, filter);
    }

    pub fn set_tagging(&self, graph: &mut ReactiveGraph, tagging: Tagging) {
        graph.set_if_changed(self.tagging, tagging);
    }

    pub fn set_tag_on(&self, graph: &mut ReactiveGraph, keys: Vec<String>) {
        graph.set_if_changed(self.tag_on, keys);
    }

    pub fn set_disable(&self, graph: &mut ReactiveGraph, disable: Option<DisableFn>) {
        graph.set(self.disable, disable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::AsSpec;
    use crate::model::Resolve;
    use crate::phrase::{Debounce, ValidSpec, Validators, DEFAULT_DEBOUNCE_MS};
    use crate::src::{DefaultFetcher, ParseSpec, Source};
    use selekt_core::ReactiveRuntime;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Fixture {
        runtime: ReactiveRuntime,
        weak: WeakRuntime,
        item: ItemHook,
        phrase: PhraseHook,
        model: ModelHook,
        items: ItemsHook,
    }

    impl Fixture {
        fn set_phrase(&self, text: &str) {
            self.runtime
                .with(|g| self.phrase.type_text(g, &self.weak, text.into(), false));
        }

        fn labels(&self) -> Vec<String> {
            self.runtime
                .with(|g| self.items.value(g))
                .iter()
                .map(Item::label_text)
                .collect()
        }

        fn of(&self, raw: Value) -> Item {
            self.runtime.with(|g| self.item.factory(g).of_raw(raw))
        }
    }

    fn fixture(records: Vec<Value>, initial: Value, mode: SelectionMode, tagging: Tagging) -> Fixture {
        fixture_with(records, "name:id:id", initial, mode, FilterSpec::Auto, tagging, None)
    }

    fn fixture_with(
        records: Vec<Value>,
        as_spec: &str,
        initial: Value,
        mode: SelectionMode,
        filter: FilterSpec,
        tagging: Tagging,
        disable: Option<DisableFn>,
    ) -> Fixture {
        let runtime = ReactiveRuntime::current().unwrap();
        let weak = runtime.downgrade();
        let (item, phrase, model, items) = runtime.with(|g| {
            g.batch(|g| {
                let item = ItemHook::new(g, AsSpec::parse(as_spec));
                let phrase = PhraseHook::new(
                    g,
                    String::new(),
                    None,
                    Validators::new().compile(&ValidSpec::default()).unwrap(),
                    Debounce::Off,
                    DEFAULT_DEBOUNCE_MS,
                );
                let src = SrcHook::new(
                    g,
                    item,
                    Source::items(records),
                    ParseSpec::Default,
                    Arc::new(DefaultFetcher::default()),
                    BTreeMap::new(),
                );
                let model =
                    ModelHook::new(g, weak.clone(), item, src, initial, None, None, Resolve::None);
                let items = ItemsHook::new(
                    g,
                    item,
                    phrase.clone(),
                    src,
                    model,
                    mode,
                    filter,
                    tagging,
                    parse_keys(DEFAULT_TAG_ON),
                    disable,
                );
                (item, phrase, model, items)
            })
        });
        Fixture {
            runtime,
            weak,
            item,
            phrase,
            model,
            items,
        }
    }

    fn letters() -> Vec<Value> {
        vec![
            json!({"id": 1, "name": "A"}),
            json!({"id": 2, "name": "B"}),
            json!({"id": 3, "name": "Ab"}),
        ]
    }

    #[test]
    fn test_filter_by_label() {
        let factory = crate::item::ItemFactory::new(AsSpec::parse("name:id:id"));
        let item = factory.of_raw(json!({"id": 1, "name": "Deso", "tags": {"x": "rust"}}));
        let label = [FieldPath::parse("label")];

        assert!(filter_by_props(&label, &item, "des"));
        assert!(filter_by_props(&label, &item, "DESO"));
        assert!(filter_by_props(&label, &item, ""));
        assert!(!filter_by_props(&label, &item, "rust"));
    }

    #[test]
    fn test_filter_by_wildcards() {
        let factory = crate::item::ItemFactory::new(AsSpec::parse("name:id:id"));
        let item = factory.of_raw(json!({
            "id": 1,
            "name": "Deso",
            "meta": {"lang": "Rust", "deep": {"town": "Oslo"}}
        }));

        assert!(filter_by_props(&[FieldPath::parse("raw.meta.*")], &item, "rust"));
        assert!(!filter_by_props(&[FieldPath::parse("raw.meta.*")], &item, "oslo"));
        assert!(filter_by_props(&[FieldPath::parse("raw.meta.**")], &item, "oslo"));
        // Paths leading to objects test their own keys
        assert!(filter_by_props(&[FieldPath::parse("raw.meta")], &item, "rust"));
        assert!(!filter_by_props(&[FieldPath::parse("raw.missing.*")], &item, "rust"));
    }

    #[test]
    fn test_filter_spec_from_str() {
        match FilterSpec::from("name, meta.*|code") {
            FilterSpec::Props(props) => assert_eq!(props, vec!["name", "meta.*", "code"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(parse_keys(DEFAULT_TAG_ON), vec!["Enter", "Tab", " ", ","]);
        assert_eq!(parse_keys(";"), vec![";"]);
    }

    #[test]
    fn test_group_items() {
        let factory = crate::item::ItemFactory::new(AsSpec::parse("name:id:id:kind"));
        let all: Vec<Item> = vec![
            json!({"id": 1, "name": "Carrot", "kind": "veg"}),
            json!({"id": 2, "name": "Apple", "kind": "fruit"}),
            json!({"id": 3, "name": "Water"}),
            json!({"id": 4, "name": "Pear", "kind": "fruit"}),
            json!({"id": 5, "name": "Leek", "kind": "veg"}),
        ]
        .into_iter()
        .map(|raw| factory.of_raw(raw))
        .collect();

        let filtered: Vec<Item> = all.iter().filter(|i| i.index != json!(1) && i.index != json!(5)).cloned().collect();
        let grouped = group_items(&all, filtered);
        let labels: Vec<String> = grouped.iter().map(Item::label_text).collect();

        // veg is empty after filtering and left out
        assert_eq!(labels, vec!["Water", "fruit", "Apple", "Pear"]);
        assert!(grouped[1].is_group());
        assert_eq!(grouped[1].members().len(), 2);
    }

    #[tokio::test]
    async fn test_phrase_filters_case_insensitive() {
        let f = fixture(letters(), Value::Null, SelectionMode::Skip, Tagging::Off);
        assert_eq!(f.labels(), vec!["A", "B", "Ab"]);

        f.set_phrase("a");
        assert_eq!(f.labels(), vec!["A", "Ab"]);

        f.set_phrase("");
        assert_eq!(f.labels().len(), 3);
    }

    #[tokio::test]
    async fn test_static_source_end_to_end() {
        let f = fixture_with(
            vec![json!({"id": 1, "name": "A"}), json!({"id": 2, "name": "B"})],
            "name::id",
            Value::Null,
            SelectionMode::Skip,
            FilterSpec::Auto,
            Tagging::Off,
            None,
        );
        f.set_phrase("a");

        let value = f.runtime.with(|g| f.items.value(g));
        assert_eq!(value.len(), 1);
        assert_eq!(value[0].label, json!("A"));
        assert_eq!(value[0].value, json!({"id": 1, "name": "A"}));
    }

    #[tokio::test]
    async fn test_filter_off_keeps_everything() {
        let f = fixture_with(
            letters(),
            "name:id:id",
            Value::Null,
            SelectionMode::Skip,
            FilterSpec::Off,
            Tagging::Off,
            None,
        );
        f.set_phrase("zzz");
        assert_eq!(f.labels().len(), 3);
    }

    #[tokio::test]
    async fn test_skip_mode_hides_selection() {
        let f = fixture(letters(), json!([2]), SelectionMode::Skip, Tagging::Off);
        assert_eq!(f.labels(), vec!["A", "Ab"]);

        let a = f.of(json!({"id": 1, "name": "A"}));
        f.runtime.with(|g| f.items.select(g, &f.weak, vec![a]));
        assert_eq!(f.labels(), vec!["Ab"]);
    }

    #[tokio::test]
    async fn test_toggle_mode_deselects() {
        let f = fixture(letters(), json!([]), SelectionMode::Toggle, Tagging::Off);
        let a = f.of(json!({"id": 1, "name": "A"}));
        let b = f.of(json!({"id": 2, "name": "B"}));

        for item in [a.clone(), b, a] {
            f.runtime.with(|g| f.items.select(g, &f.weak, vec![item]));
        }
        assert_eq!(f.runtime.with(|g| f.model.raw(g)), json!([2]));
        // Selected options stay listed
        assert_eq!(f.labels().len(), 3);
    }

    #[tokio::test]
    async fn test_append_mode_allows_repeats() {
        let f = fixture(letters(), json!([]), SelectionMode::Append, Tagging::Off);
        let a = f.of(json!({"id": 1, "name": "A"}));

        f.runtime.with(|g| f.items.select(g, &f.weak, vec![a.clone()]));
        f.runtime.with(|g| f.items.select(g, &f.weak, vec![a]));
        assert_eq!(f.runtime.with(|g| f.model.raw(g)), json!([1, 1]));
    }

    #[tokio::test]
    async fn test_disable_mode_blocks_reselection() {
        let f = fixture(letters(), json!([1]), SelectionMode::Disable, Tagging::Off);
        let a = f.of(json!({"id": 1, "name": "A"}));

        assert!(f.runtime.with(|g| f.items.check_disabled(g, &a)));
        assert_eq!(f.runtime.with(|g| f.items.select(g, &f.weak, vec![a])), None);
        assert_eq!(f.runtime.with(|g| f.model.raw(g)), json!([1]));
    }

    #[tokio::test]
    async fn test_disable_predicate_sees_context() {
        let disable: DisableFn = Arc::new(|context: &DisableContext, item: &Item| {
            item.label == json!("B") && context.phrase.is_empty()
        });
        let f = fixture_with(
            letters(),
            "name:id:id",
            Value::Null,
            SelectionMode::Skip,
            FilterSpec::Auto,
            Tagging::Off,
            Some(disable),
        );
        let states = f.runtime.with(|g| f.items.states(g, -1));
        let disabled: Vec<bool> = states.iter().map(|s| s.disabled).collect();
        assert_eq!(disabled, vec![false, true, false]);

        f.set_phrase("b");
        let states = f.runtime.with(|g| f.items.states(g, -1));
        assert!(!states[0].disabled);
    }

    #[tokio::test]
    async fn test_tag_synthesis() {
        let f = fixture(letters(), Value::Null, SelectionMode::Skip, Tagging::On);

        f.set_phrase("new tag");
        let value = f.runtime.with(|g| f.items.value(g));
        assert_eq!(value.len(), 1);
        assert!(value[0].new);
        assert_eq!(value[0].label, json!("new tag"));

        // An option with the same label suppresses the tag
        f.set_phrase("ab");
        let value = f.runtime.with(|g| f.items.value(g));
        assert_eq!(value.len(), 1);
        assert!(!value[0].new);

        f.runtime.with(|g| f.items.set_tagging(g, Tagging::Off));
        f.set_phrase("zzz");
        assert!(f.labels().is_empty());
    }

    #[tokio::test]
    async fn test_tag_keys() {
        let f = fixture(Vec::new(), Value::Null, SelectionMode::Skip, Tagging::On);
        assert_eq!(
            f.runtime.with(|g| f.items.tag_keys(g)),
            vec!["Enter", "Tab", " ", ","]
        );

        f.runtime.with(|g| f.items.set_tagging(g, Tagging::from(";")));
        assert_eq!(f.runtime.with(|g| f.items.tag_keys(g)), vec![";"]);
    }

    #[tokio::test]
    async fn test_group_selection_expands_members() {
        let f = fixture_with(
            vec![
                json!({"id": 1, "name": "Apple", "kind": "fruit"}),
                json!({"id": 2, "name": "Pear", "kind": "fruit"}),
                json!({"id": 3, "name": "Leek", "kind": "veg"}),
            ],
            "name:id:id:kind",
            json!([2]),
            SelectionMode::Toggle,
            FilterSpec::Auto,
            Tagging::Off,
            None,
        );

        let value = f.runtime.with(|g| f.items.value(g));
        let labels: Vec<String> = value.iter().map(Item::label_text).collect();
        assert_eq!(labels, vec!["fruit", "Apple", "Pear", "veg", "Leek"]);

        // Only the unselected member is added
        let fruit = value[0].clone();
        assert!(!f.runtime.with(|g| f.items.check_selected(g, &fruit)));
        f.runtime.with(|g| f.items.select(g, &f.weak, vec![fruit.clone()]));
        assert_eq!(f.runtime.with(|g| f.model.raw(g)), json!([2, 1]));
        assert!(f.runtime.with(|g| f.items.check_selected(g, &fruit)));

        // Group names take part in filtering
        f.set_phrase("veg");
        let labels = f.labels();
        assert_eq!(labels, vec!["veg", "Leek"]);
    }

    #[tokio::test]
    async fn test_pointed_state_follows_position() {
        // The group header's index is its name, which equals the first option's index
        let f = fixture_with(
            vec![
                json!({"id": "fruit", "name": "x"}),
                json!({"id": 1, "name": "Apple", "kind": "fruit"}),
            ],
            "name:id:id:kind",
            Value::Null,
            SelectionMode::Skip,
            FilterSpec::Auto,
            Tagging::Off,
            None,
        );

        let states = f.runtime.with(|g| f.items.states(g, 1));
        let rows: Vec<(String, bool)> = states
            .iter()
            .map(|s| (s.item.label_text(), s.pointed))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("x".to_string(), false),
                ("fruit".to_string(), true),
                ("Apple".to_string(), false),
            ]
        );

        let states = f.runtime.with(|g| f.items.states(g, -1));
        assert!(states.iter().all(|s| !s.pointed));
    }
}
