//! Keyboard pointer over the candidate list

use selekt_core::{Derived, ReactiveGraph, Signal};

use crate::item::Item;
use crate::items::ItemsHook;

/// Pointer movement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Previous,
    Next,
    First,
    Last,
    To(isize),
}

/// `true` moves back, `false` forward
impl From<bool> for Step {
    fn from(previous: bool) -> Self {
        if previous {
            Step::Previous
        } else {
            Step::Next
        }
    }
}

/// Clamp into `[-1, len - 1]`, `-1` meaning nothing is pointed
fn clamp(index: isize, len: usize) -> isize {
    let last = isize::try_from(len).unwrap_or(isize::MAX) - 1;
    index.min(last).max(-1)
}

/// Reactive owner of the pointed candidate
#[derive(Clone, Copy, Debug)]
pub struct PointerHook {
    index: Signal<isize>,
    autopoint: Signal<bool>,
    len: Derived<usize>,
    items: Derived<Vec<Item>>,
}

impl PointerHook {
    pub fn new(graph: &mut ReactiveGraph, items: &ItemsHook, autopoint: bool) -> Self {
        let index = graph.create_signal(-1isize);
        let autopoint = graph.create_signal(autopoint);

        let source = items.clone();
        let list = graph.create_derived(move |g| source.value(g));
        let len = graph.create_derived(move |g| g.get_derived(list).map_or(0, |l| l.len()));

        // Point at a fresh tag (or the head with autopoint) whenever the list changes
        let mut last: Option<Vec<Item>> = None;
        graph.create_effect(move |g| {
            let current = g.get_derived(list).unwrap_or_default();
            let auto = g.get(autopoint).unwrap_or(false);
            if last.as_ref() == Some(&current) {
                return;
            }
            let head_new = current.first().is_some_and(|item| item.new);
            let target = if head_new || auto { 0 } else { -1 };
            g.set_if_changed(index, clamp(target, current.len()));
            last = Some(current);
        });

        Self {
            index,
            autopoint,
            len,
            items: list,
        }
    }

    fn len(&self, graph: &mut ReactiveGraph) -> usize {
        graph.get_derived(self.len).unwrap_or(0)
    }

    /// Pointed position, `-1` for none (tracked)
    pub fn index(&self, graph: &mut ReactiveGraph) -> isize {
        let raw = graph.get(self.index).unwrap_or(-1);
        let len = self.len(graph);
        clamp(raw, len)
    }

    pub fn set_index(&self, graph: &mut ReactiveGraph, index: isize) {
        let len = self.len(graph);
        graph.set_if_changed(self.index, clamp(index, len));
    }

    /// The pointed candidate (tracked)
    pub fn item(&self, graph: &mut ReactiveGraph) -> Option<Item> {
        let index = usize::try_from(self.index(graph)).ok()?;
        graph.get_derived(self.items)?.into_iter().nth(index)
    }

    /// Move the pointer
    pub fn step(&self, graph: &mut ReactiveGraph, step: impl Into<Step>) {
        let current = self.index(graph);
        let target = match step.into() {
            Step::Previous => current - 1,
            Step::Next => current + 1,
            Step::First => 0,
            Step::Last => isize::MAX,
            Step::To(index) => index,
        };
        self.set_index(graph, target);
    }

    pub fn set_autopoint(&self, graph: &mut ReactiveGraph, autopoint: bool) {
        graph.set_if_changed(self.autopoint, autopoint);
    }
}
