//! Interaction state
//!
//! Open/active flags, keyboard commands, focus handling, the typeahead input
//! projection and the paging window over the candidate list.

use selekt_core::{Commit, ReactiveGraph, Signal, WeakRuntime};

use crate::item::{Item, ItemState};
use crate::items::ItemsHook;
use crate::model::ModelHook;
use crate::phrase::PhraseHook;
use crate::pointer::{PointerHook, Step};
use crate::src::SrcHook;

/// A keyboard key, named like DOM `KeyboardEvent.key`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Tab,
    ArrowDown,
    ArrowUp,
    Backspace,
    Char(char),
    Named(String),
}

impl Key {
    pub fn name(&self) -> String {
        match self {
            Key::Escape => "Escape".into(),
            Key::Enter => "Enter".into(),
            Key::Tab => "Tab".into(),
            Key::ArrowDown => "ArrowDown".into(),
            Key::ArrowUp => "ArrowUp".into(),
            Key::Backspace => "Backspace".into(),
            Key::Char(c) => c.to_string(),
            Key::Named(name) => name.clone(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        match name {
            "Escape" => Key::Escape,
            "Enter" => Key::Enter,
            "Tab" => Key::Tab,
            "ArrowDown" => Key::ArrowDown,
            "ArrowUp" => Key::ArrowUp,
            "Backspace" => Key::Backspace,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Named(name.to_owned()),
                }
            }
        }
    }
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        Key::Char(c)
    }
}

/// A key press
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    /// Meta (command) modifier held
    pub meta: bool,
}

impl KeyInput {
    pub fn new(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            meta: false,
        }
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

/// What the host should do after a key press
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyResponse {
    /// Suppress the key's default action
    pub prevent_default: bool,
    /// Move focus out of the widget
    pub blur: bool,
    /// Scroll this position into view
    pub scroll_to: Option<isize>,
}

/// Number of visible candidates for a paging window
fn window(len: usize, page: usize, limit: Option<usize>) -> usize {
    match limit {
        Some(limit) if limit > 0 => len.min(page.max(1).saturating_mul(limit)),
        _ => len,
    }
}

/// Interaction flags; created before the rest of the UI so the fetch gate can
/// read `active`
#[derive(Clone, Copy, Debug)]
pub struct UiFlags {
    active: Signal<bool>,
    opened: Signal<bool>,
    disabled: Signal<bool>,
    readonly: Signal<bool>,
}

impl UiFlags {
    pub fn new(graph: &mut ReactiveGraph, disabled: bool, readonly: bool) -> Self {
        Self {
            active: graph.create_signal(false),
            opened: graph.create_signal(false),
            disabled: graph.create_signal(disabled),
            readonly: graph.create_signal(readonly),
        }
    }

    /// Focus is within the widget (tracked)
    pub fn is_active(&self, graph: &ReactiveGraph) -> bool {
        graph.get(self.active).unwrap_or(false)
    }

    pub fn is_opened(&self, graph: &ReactiveGraph) -> bool {
        graph.get(self.opened).unwrap_or(false)
    }

    pub fn is_disabled(&self, graph: &ReactiveGraph) -> bool {
        graph.get(self.disabled).unwrap_or(false)
    }

    pub fn is_readonly(&self, graph: &ReactiveGraph) -> bool {
        graph.get(self.readonly).unwrap_or(false)
    }

    /// Selection changes are not allowed
    pub fn is_locked(&self, graph: &ReactiveGraph) -> bool {
        self.is_disabled(graph) || self.is_readonly(graph)
    }

    pub fn set_disabled(&self, graph: &mut ReactiveGraph, disabled: bool) {
        graph.set_if_changed(self.disabled, disabled);
    }

    pub fn set_readonly(&self, graph: &mut ReactiveGraph, readonly: bool) {
        graph.set_if_changed(self.readonly, readonly);
    }
}

/// Reactive owner of the interaction state
#[derive(Clone, Debug)]
pub struct UiHook {
    flags: UiFlags,
    typeahead: Signal<bool>,
    limit: Signal<Option<usize>>,
    page: Signal<usize>,
    phrase: PhraseHook,
    src: SrcHook,
    model: ModelHook,
    items: ItemsHook,
    pointer: PointerHook,
}

impl UiHook {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &mut ReactiveGraph,
        flags: UiFlags,
        phrase: PhraseHook,
        src: SrcHook,
        model: ModelHook,
        items: ItemsHook,
        pointer: PointerHook,
        typeahead: bool,
        limit: Option<usize>,
    ) -> Self {
        let page = graph.create_signal(1usize);

        // Back to the first page whenever the phrase or the options change
        let watched = phrase.clone();
        graph.create_effect(move |g| {
            let _ = watched.value(g);
            let _ = src.data(g);
            g.set_if_changed(page, 1);
        });

        Self {
            flags,
            typeahead: graph.create_signal(typeahead),
            limit: graph.create_signal(limit),
            page,
            phrase,
            src,
            model,
            items,
            pointer,
        }
    }

    pub fn flags(&self) -> UiFlags {
        self.flags
    }

    pub fn open(&self, graph: &mut ReactiveGraph) {
        if self.flags.is_opened(graph) {
            return;
        }
        tracing::trace!("list opened");
        graph.set(self.flags.opened, true);
    }

    pub fn close(&self, graph: &mut ReactiveGraph) {
        if !self.flags.is_opened(graph) {
            return;
        }
        tracing::trace!("list closed");
        graph.batch(|g| {
            g.set(self.flags.opened, false);
            self.pointer.set_index(g, -1);
        });
    }

    /// Focus entered the widget
    pub fn focus_in(&self, graph: &mut ReactiveGraph) {
        graph.batch(|g| {
            g.set_if_changed(self.flags.active, true);
            if !self.src.is_fetched(g) && !self.src.is_busy(g) {
                self.src.refresh(g);
            }
        });
    }

    /// Focus left an element of the widget; nothing happens while it stays
    /// within
    pub fn focus_out(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, still_within: bool) {
        if still_within {
            return;
        }
        graph.batch(|g| {
            self.phrase.reset(g, runtime);
            g.set_if_changed(self.flags.active, false);
            self.close(g);
        });
    }

    /// Select `items`, or the pointed candidate when `None`
    ///
    /// Synthesized tags become options of the source. Single selects close
    /// the list. The phrase is cleared.
    pub fn select(
        &self,
        graph: &mut ReactiveGraph,
        runtime: &WeakRuntime,
        items: Option<Vec<Item>>,
    ) -> Option<Commit> {
        if self.flags.is_locked(graph) {
            tracing::debug!("selection ignored, widget is locked");
            return None;
        }
        let items = match items {
            Some(items) => items,
            None => self.pointer.item(graph).into_iter().collect(),
        };
        let tags: Vec<Item> = items.iter().filter(|item| item.new).cloned().collect();

        graph.batch(|g| {
            let commit = self.items.select(g, runtime, items);
            if commit.is_some_and(|c| c != Commit::Rejected) && !tags.is_empty() {
                self.src.push_tags(g, tags);
            }
            if !self.model.is_multiple(g) {
                self.close(g);
            }
            self.phrase.reset(g, runtime);
            commit
        })
    }

    /// Keyboard command dispatch
    pub fn on_key(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, input: KeyInput) -> KeyResponse {
        let mut response = KeyResponse::default();
        if self.flags.is_disabled(graph) {
            return response;
        }

        // Tags come from the committed phrase; the typed buffer guards Backspace
        let typed = self.phrase.buffer(graph);
        let will_tag = input.key != Key::Enter
            && self.items.is_tagging(graph)
            && !self.phrase.value(graph).is_empty()
            && self.items.tag_keys(graph).contains(&input.key.name());

        if input.key != Key::Escape {
            self.open(graph);
        }

        match input.key {
            Key::Escape => {
                if self.flags.is_opened(graph) {
                    self.close(graph);
                } else {
                    response.blur = true;
                }
            }
            Key::Enter => {
                self.select(graph, runtime, None);
            }
            Key::ArrowDown => {
                response.prevent_default = true;
                self.pointer
                    .step(graph, if input.meta { Step::Last } else { Step::Next });
                response.scroll_to = Some(self.pointer.index(graph));
            }
            Key::ArrowUp => {
                response.prevent_default = true;
                self.pointer
                    .step(graph, if input.meta { Step::First } else { Step::Previous });
                response.scroll_to = Some(self.pointer.index(graph));
            }
            Key::Backspace if typed.is_empty() && !self.flags.is_locked(graph) => {
                if input.meta {
                    self.model.clear(graph, runtime);
                } else {
                    self.model.pop(graph, runtime);
                }
            }
            _ => {}
        }

        if will_tag {
            response.prevent_default = true;
            self.select(graph, runtime, None);
        }
        response
    }

    /// User typed into the input
    pub fn type_text(&self, graph: &mut ReactiveGraph, runtime: &WeakRuntime, text: String) {
        let source_async = self.src.is_async(graph);
        self.phrase.type_text(graph, runtime, text, source_async);
    }

    /// Text the input shows: the pointed label with typeahead, else the typed
    /// text (tracked)
    pub fn input_value(&self, graph: &mut ReactiveGraph) -> String {
        if graph.get(self.typeahead).unwrap_or(false) && self.flags.is_opened(graph) {
            if let Some(item) = self.pointer.item(graph).filter(|item| !item.new) {
                let label = item.label_text();
                if !label.is_empty() {
                    return label;
                }
            }
        }
        self.phrase.buffer(graph)
    }

    /// Candidates with render state, limited to the paging window (tracked)
    pub fn visible(&self, graph: &mut ReactiveGraph) -> Vec<ItemState> {
        let pointer = self.pointer.index(graph);
        let mut states = self.items.states(graph, pointer);
        let shown = window(states.len(), self.page(graph), self.limit(graph));
        states.truncate(shown);
        states
    }

    /// More candidates exist past the paging window (tracked)
    pub fn has_more(&self, graph: &mut ReactiveGraph) -> bool {
        let len = self.items.value(graph).len();
        window(len, self.page(graph), self.limit(graph)) < len
    }

    /// Extend the paging window by one page
    pub fn load_more(&self, graph: &mut ReactiveGraph) {
        if self.has_more(graph) {
            graph.update(self.page, |page| page + 1);
        }
    }

    pub fn page(&self, graph: &ReactiveGraph) -> usize {
        graph.get(self.page).unwrap_or(1)
    }

    pub fn limit(&self, graph: &ReactiveGraph) -> Option<usize> {
        graph.get(self.limit).flatten()
    }

    pub fn set_typeahead(&self, graph: &mut ReactiveGraph, typeahead: bool) {
        graph.set_if_changed(self.typeahead, typeahead);
    }

    pub fn set_limit(&self, graph: &mut ReactiveGraph, limit: Option<usize>) {
        graph.set_if_changed(self.limit, limit);
    }
}
