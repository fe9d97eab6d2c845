//! Select configuration
//!
//! [`SelectConfig`] collects every option of a select with a fluent builder.
//! [`SelectDefaults`] holds the global defaults a config starts from; they
//! can be loaded from TOML so an application configures all of its selects in
//! one place.
//!
//! ```toml
//! placeholder = "Find..."
//! default_debounce = 300
//! tag_on = "Enter,;"
//! mode = "toggle"
//! limit = 20
//! accessible = true
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures::future::FutureExt;
use selekt_core::UpdateHandler;
use serde::Deserialize;
use serde_json::Value;

use crate::attrs::IdGenerator;
use crate::error::{Result, SelectError};
use crate::item::{AsSpec, Item};
use crate::items::{DisableContext, DisableFn, FilterSpec, SelectionMode, Tagging, DEFAULT_TAG_ON};
use crate::model::{ModelChange, Resolve};
use crate::phrase::{Debounce, PhrasePredicate, ValidSpec, Validators, DEFAULT_DEBOUNCE_MS};
use crate::src::{Fetcher, HttpFetch, ParseSpec, Source};

fn default_placeholder() -> String {
    "Search...".to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_tag_on() -> String {
    DEFAULT_TAG_ON.to_string()
}

/// Global defaults for new selects
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectDefaults {
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default)]
    pub debounce: Debounce,
    #[serde(default = "default_debounce_ms")]
    pub default_debounce: u64,
    /// Comma separated tag trigger keys, an empty entry is the comma key
    #[serde(default = "default_tag_on")]
    pub tag_on: String,
    #[serde(default)]
    pub mode: SelectionMode,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub typeahead: bool,
    #[serde(default)]
    pub autopoint: bool,
    #[serde(default)]
    pub accessible: bool,
}

impl Default for SelectDefaults {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
            debounce: Debounce::default(),
            default_debounce: default_debounce_ms(),
            tag_on: default_tag_on(),
            mode: SelectionMode::default(),
            limit: None,
            typeahead: false,
            autopoint: false,
            accessible: false,
        }
    }
}

impl SelectDefaults {
    /// Parse defaults from a TOML document; missing keys keep their default
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load defaults from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| SelectError::Config(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml_str(&content)
    }
}

/// Everything a select is built from
#[derive(Clone)]
pub struct SelectConfig {
    pub(crate) src: Source,
    pub(crate) params: BTreeMap<String, String>,
    pub(crate) parse: ParseSpec,
    pub(crate) fetcher: Option<Arc<dyn Fetcher>>,
    pub(crate) http: Option<Arc<dyn HttpFetch>>,
    pub(crate) item_as: AsSpec,
    pub(crate) filter: FilterSpec,
    pub(crate) tagging: Tagging,
    pub(crate) tag_on: String,
    pub(crate) mode: SelectionMode,
    pub(crate) disable: Option<DisableFn>,
    pub(crate) multiple: Option<bool>,
    pub(crate) resolve: Resolve,
    pub(crate) valid: ValidSpec,
    pub(crate) validators: Validators,
    pub(crate) debounce: Debounce,
    pub(crate) default_debounce: u64,
    pub(crate) typeahead: bool,
    pub(crate) autopoint: bool,
    pub(crate) limit: Option<usize>,
    pub(crate) accessible: bool,
    pub(crate) id: Option<String>,
    pub(crate) placeholder: String,
    pub(crate) disabled: bool,
    pub(crate) readonly: bool,
    pub(crate) model_value: Value,
    pub(crate) on_model_update: Option<UpdateHandler<Value, ModelChange>>,
    pub(crate) phrase: String,
    pub(crate) on_phrase_update: Option<UpdateHandler<String, ()>>,
    pub(crate) ids: Option<Arc<dyn IdGenerator>>,
}

impl fmt::Debug for SelectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectConfig")
            .field("src", &self.src)
            .field("item_as", &self.item_as)
            .field("filter", &self.filter)
            .field("tagging", &self.tagging)
            .field("mode", &self.mode)
            .field("multiple", &self.multiple)
            .field("resolve", &self.resolve)
            .field("debounce", &self.debounce)
            .field("limit", &self.limit)
            .field("model_value", &self.model_value)
            .field("phrase", &self.phrase)
            .finish_non_exhaustive()
    }
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self::with_defaults(&SelectDefaults::default())
    }
}

impl SelectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from global defaults
    pub fn with_defaults(defaults: &SelectDefaults) -> Self {
        Self {
            src: Source::None,
            params: BTreeMap::new(),
            parse: ParseSpec::Default,
            fetcher: None,
            http: None,
            item_as: AsSpec::default(),
            filter: FilterSpec::Auto,
            tagging: Tagging::Off,
            tag_on: defaults.tag_on.clone(),
            mode: defaults.mode,
            disable: None,
            multiple: None,
            resolve: Resolve::None,
            valid: ValidSpec::default(),
            validators: Validators::new(),
            debounce: defaults.debounce,
            default_debounce: defaults.default_debounce,
            typeahead: defaults.typeahead,
            autopoint: defaults.autopoint,
            limit: defaults.limit,
            accessible: defaults.accessible,
            id: None,
            placeholder: defaults.placeholder.clone(),
            disabled: false,
            readonly: false,
            model_value: Value::Null,
            on_model_update: None,
            phrase: String::new(),
            on_phrase_update: None,
            ids: None,
        }
    }

    /// Option source
    pub fn src(mut self, src: impl Into<Source>) -> Self {
        self.src = src.into();
        self
    }

    /// Named parameter for `{name}` URL tokens and query functions
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn parse(mut self, parse: ParseSpec) -> Self {
        self.parse = parse;
        self
    }

    /// Replace how requests are built and performed
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// HTTP client used for URL sources by the default fetcher
    pub fn http(mut self, http: Arc<dyn HttpFetch>) -> Self {
        self.http = Some(http);
        self
    }

    /// Record mapping, e.g. `"name:id:id"`
    pub fn item_as(mut self, spec: impl Into<AsSpec>) -> Self {
        self.item_as = spec.into();
        self
    }

    pub fn filter(mut self, filter: impl Into<FilterSpec>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Custom filter predicate
    pub fn filter_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Item, &str) -> bool + Send + Sync + 'static,
    {
        self.filter = FilterSpec::predicate(f);
        self
    }

    pub fn tagging(mut self, tagging: impl Into<Tagging>) -> Self {
        self.tagging = tagging.into();
        self
    }

    /// Comma separated tag trigger keys
    pub fn tag_on(mut self, keys: impl Into<String>) -> Self {
        self.tag_on = keys.into();
        self
    }

    pub fn mode(mut self, mode: SelectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Predicate for options that cannot be selected
    pub fn disable<F>(mut self, f: F) -> Self
    where
        F: Fn(&DisableContext, &Item) -> bool + Send + Sync + 'static,
    {
        self.disable = Some(Arc::new(f));
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = Some(multiple);
        self
    }

    /// Resolution of poor model values
    pub fn resolve(mut self, resolve: Resolve) -> Self {
        self.resolve = resolve;
        self
    }

    /// Phrase validation: a bool, an expression like `"min:3"`, or a
    /// [`ValidSpec::Predicate`]
    pub fn valid(mut self, valid: impl Into<ValidSpec>) -> Self {
        self.valid = valid.into();
        self
    }

    /// Register a validator usable in validation expressions
    pub fn validator<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&[String]) -> Result<PhrasePredicate> + Send + Sync + 'static,
    {
        self.validators.register(name, factory);
        self
    }

    pub fn debounce(mut self, debounce: impl Into<Debounce>) -> Self {
        self.debounce = debounce.into();
        self
    }

    /// Delay in milliseconds when debouncing without an explicit duration
    pub fn default_debounce(mut self, ms: u64) -> Self {
        self.default_debounce = ms;
        self
    }

    /// Show the pointed label in the input
    pub fn typeahead(mut self, typeahead: bool) -> Self {
        self.typeahead = typeahead;
        self
    }

    /// Always point at the first candidate after the list changes
    pub fn autopoint(mut self, autopoint: bool) -> Self {
        self.autopoint = autopoint;
        self
    }

    /// Page size of the visible candidate window
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Emit ARIA attributes
    pub fn accessible(mut self, accessible: bool) -> Self {
        self.accessible = accessible;
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Initial model value
    pub fn model_value(mut self, value: Value) -> Self {
        self.model_value = value;
        self
    }

    /// Hand model commits to an owner; the value stays busy until the
    /// returned future completes
    pub fn on_model_update<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, ModelChange) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_model_update = Some(Arc::new(move |value: Value, change: ModelChange| {
            handler(value, change).boxed()
        }));
        self
    }

    /// Initial phrase
    pub fn phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrase = phrase.into();
        self
    }

    /// Hand phrase commits to an owner
    pub fn on_phrase_update<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_phrase_update = Some(Arc::new(move |phrase: String, _: ()| handler(phrase).boxed()));
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }
}
