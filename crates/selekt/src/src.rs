//! Option sources
//!
//! A [`Source`] is where options come from: a static list, a function, an
//! async function or a URL template. Static lists are mapped synchronously;
//! every other source is fetched through an [`AsyncData`] request keyed by
//! the source revision and, for phrase dependent (dynamic) sources, by the
//! phrase and named parameters.
//!
//! Options can also be pushed by the client (tagging). Pushed options stay
//! until the source itself is replaced.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use futures::future::{self, BoxFuture, FutureExt};
use regex::{Captures, Regex};
use selekt_core::{AsyncData, Derived, Dispatch, ReactiveGraph, Request, Signal, WeakRuntime};
use serde_json::Value;

use crate::error::FetchError;
use crate::item::{Item, ItemHook};
use crate::json::{self, FieldPath};
use crate::phrase::PhraseHook;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%s|\{\w+?\}").expect("placeholder pattern is valid"));

static NAMED_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+?)\}").expect("parameter pattern is valid"));

/// Parameters a request is built from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchParams {
    pub phrase: String,
    pub params: BTreeMap<String, String>,
}

impl FetchParams {
    /// Look up `phrase` or a named parameter
    pub fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "phrase" => Some(&self.phrase),
            _ => self.params.get(name).map(String::as_str),
        }
    }
}

pub type SyncSourceFn = Arc<dyn Fn(&FetchParams) -> Value + Send + Sync>;
pub type AsyncSourceFn =
    Arc<dyn Fn(FetchParams) -> BoxFuture<'static, Result<Value, FetchError>> + Send + Sync>;

/// Where options come from
#[derive(Clone, Default)]
pub enum Source {
    #[default]
    None,
    Static(Vec<Value>),
    Sync { f: SyncSourceFn, dynamic: bool },
    Async { f: AsyncSourceFn, dynamic: bool },
    /// URL template with `%s` and `{name}` placeholders
    Url(String),
}

impl Source {
    pub fn items(items: impl IntoIterator<Item = Value>) -> Self {
        Source::Static(items.into_iter().collect())
    }

    /// Function source that ignores the phrase
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&FetchParams) -> Value + Send + Sync + 'static,
    {
        Source::Sync {
            f: Arc::new(f),
            dynamic: false,
        }
    }

    /// Function source whose result depends on the phrase
    pub fn sync_query<F>(f: F) -> Self
    where
        F: Fn(&FetchParams) -> Value + Send + Sync + 'static,
    {
        Source::Sync {
            f: Arc::new(f),
            dynamic: true,
        }
    }

    /// Async source loaded once per revision
    pub fn lazy<F, Fut>(f: F) -> Self
    where
        F: Fn(FetchParams) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        Source::Async {
            f: Arc::new(move |params: FetchParams| f(params).boxed()),
            dynamic: false,
        }
    }

    /// Async source queried with the phrase (server side filtering)
    pub fn query<F, Fut>(f: F) -> Self
    where
        F: Fn(FetchParams) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        Source::Async {
            f: Arc::new(move |params: FetchParams| f(params).boxed()),
            dynamic: true,
        }
    }

    pub fn url(template: impl Into<String>) -> Self {
        Source::Url(template.into())
    }

    /// Anything but a static list
    pub fn is_async(&self) -> bool {
        !matches!(self, Source::None | Source::Static(_))
    }

    /// Results depend on the phrase
    pub fn is_dynamic(&self) -> bool {
        match self {
            Source::Url(template) => PLACEHOLDER.is_match(template),
            Source::Sync { dynamic, .. } | Source::Async { dynamic, .. } => *dynamic,
            Source::None | Source::Static(_) => false,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::None => f.write_str("None"),
            Source::Static(items) => write!(f, "Static({} items)", items.len()),
            Source::Sync { dynamic, .. } => write!(f, "Sync {{ dynamic: {dynamic} }}"),
            Source::Async { dynamic, .. } => write!(f, "Async {{ dynamic: {dynamic} }}"),
            Source::Url(template) => write!(f, "Url({template:?})"),
        }
    }
}

impl From<Vec<Value>> for Source {
    fn from(items: Vec<Value>) -> Self {
        Source::Static(items)
    }
}

impl From<&str> for Source {
    fn from(template: &str) -> Self {
        Source::Url(template.to_owned())
    }
}

/// Expand a URL template
///
/// The first `%s` becomes the encoded phrase, `{name}` tokens the encoded
/// named parameter (`{phrase}` included); unknown tokens are dropped.
pub fn expand_url(template: &str, params: &FetchParams) -> String {
    let phrase = json::encode_uri_component(&params.phrase);
    let expanded = template.replacen("%s", &phrase, 1);
    NAMED_PARAM
        .replace_all(&expanded, |caps: &Captures| {
            params
                .lookup(&caps[1])
                .map(json::encode_uri_component)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Extraction of option records from a response body
#[derive(Clone, Default)]
pub enum ParseSpec {
    /// First array found in the body
    #[default]
    Default,
    Path(FieldPath),
    Custom(Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>),
}

impl ParseSpec {
    pub fn path(path: &str) -> Self {
        ParseSpec::Path(FieldPath::parse(path))
    }

    pub fn parse(&self, body: &Value) -> Vec<Value> {
        match self {
            ParseSpec::Default => json::find_array(body).cloned().unwrap_or_default(),
            ParseSpec::Path(path) => match path.get(body) {
                Some(Value::Array(items)) => items.clone(),
                Some(other) => json::find_array(other).cloned().unwrap_or_default(),
                None => Vec::new(),
            },
            ParseSpec::Custom(parse) => parse(body),
        }
    }
}

impl fmt::Debug for ParseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseSpec::Default => f.write_str("Default"),
            ParseSpec::Path(path) => write!(f, "Path({path})"),
            ParseSpec::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// HTTP GET returning a JSON body
pub trait HttpFetch: Send + Sync {
    fn get(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>>;
}

/// [`HttpFetch`] backed by a reqwest client
#[cfg(feature = "http")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestFetch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl HttpFetch for ReqwestFetch {
    fn get(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>> {
        let request = self.client.get(url);
        let url = url.to_owned();
        async move {
            tracing::debug!(%url, "fetching options");
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok(response.json::<Value>().await?)
        }
        .boxed()
    }
}

/// Stand-in used when the crate is built without HTTP support
#[cfg(not(feature = "http"))]
#[derive(Clone, Debug, Default)]
pub struct NoHttp;

#[cfg(not(feature = "http"))]
impl HttpFetch for NoHttp {
    fn get(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>> {
        let message = format!("cannot fetch {url}: built without the `http` feature");
        future::ready(Err(FetchError::Other(message))).boxed()
    }
}

/// The HTTP client used when none is configured
pub fn default_http() -> Arc<dyn HttpFetch> {
    #[cfg(feature = "http")]
    {
        Arc::new(ReqwestFetch::default())
    }
    #[cfg(not(feature = "http"))]
    {
        Arc::new(NoHttp)
    }
}

/// Turns a source and its parameters into a request
pub trait Fetcher: Send + Sync {
    fn fetch(&self, source: &Source, params: FetchParams) -> Request<Value, FetchError>;
}

/// Dispatches on the source variant, URL templates go through [`HttpFetch`]
#[derive(Clone)]
pub struct DefaultFetcher {
    http: Arc<dyn HttpFetch>,
}

impl DefaultFetcher {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(default_http())
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, source: &Source, params: FetchParams) -> Request<Value, FetchError> {
        match source {
            Source::None => future::ready(Ok(Value::Array(Vec::new()))).boxed(),
            Source::Static(items) => future::ready(Ok(Value::Array(items.clone()))).boxed(),
            Source::Sync { f, .. } => future::ready(Ok(f(&params))).boxed(),
            Source::Async { f, .. } => f(params),
            Source::Url(template) => self.http.get(&expand_url(template, &params)),
        }
    }
}

/// Snapshot of the option source
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceState {
    pub data: Vec<Item>,
    pub busy: bool,
    pub error: Option<FetchError>,
    pub fetched: bool,
    pub is_async: bool,
    pub dynamic: bool,
}

/// Reactive owner of the option source
#[derive(Clone, Copy, Debug)]
pub struct SrcHook {
    source: Signal<Source>,
    revision: Signal<u64>,
    params: Signal<BTreeMap<String, String>>,
    parse: Signal<ParseSpec>,
    fetcher: Signal<Arc<dyn Fetcher>>,
    added: Signal<Vec<Item>>,
    remote: AsyncData<Value, FetchError>,
    parsed: Derived<Vec<Item>>,
    data: Derived<Vec<Item>>,
}

impl SrcHook {
    pub fn new(
        graph: &mut ReactiveGraph,
        item: ItemHook,
        source: Source,
        parse: ParseSpec,
        fetcher: Arc<dyn Fetcher>,
        params: BTreeMap<String, String>,
    ) -> Self {
        let source = graph.create_signal(source);
        let parse = graph.create_signal(parse);
        let remote = AsyncData::new(graph);

        let parsed = graph.create_derived(move |g| {
            let body = match g.get(source) {
                Some(Source::Static(items)) => Value::Array(items),
                Some(Source::None) | None => return Vec::new(),
                Some(_) => match remote.state(g).data {
                    Some(body) => body,
                    None => return Vec::new(),
                },
            };
            let factory = item.factory(g);
            g.with(parse, |spec| spec.parse(&body))
                .unwrap_or_default()
                .into_iter()
                .map(|raw| factory.of_raw(raw))
                .collect()
        });

        let added = graph.create_signal(Vec::<Item>::new());
        let data = graph.create_derived(move |g| {
            let mut data = g.get(added).unwrap_or_default();
            data.extend(g.get_derived(parsed).unwrap_or_default());
            data
        });

        Self {
            source,
            revision: graph.create_signal(0),
            params: graph.create_signal(params),
            parse,
            fetcher: graph.create_signal(fetcher),
            added,
            remote,
            parsed,
            data,
        }
    }

    /// Install the fetch watcher; `enabled` gates every dispatch
    pub fn watch(
        &self,
        graph: &mut ReactiveGraph,
        runtime: WeakRuntime,
        enabled: Derived<bool>,
        phrase: PhraseHook,
    ) {
        let this = *self;
        self.remote.watch(graph, runtime, move |g| {
            if !g.get_derived(enabled).unwrap_or(false) {
                return None;
            }
            let source = g.get(this.source).unwrap_or_default();
            if !source.is_async() {
                return None;
            }
            let revision = g.get(this.revision).unwrap_or(0);
            let fetcher = g.get(this.fetcher)?;

            let mut key = revision.to_string();
            let mut params = FetchParams::default();
            if source.is_dynamic() {
                params.phrase = phrase.value(g);
                params.params = g.get(this.params).unwrap_or_default();
                key = format!("{key}|{}|{:?}", params.phrase, params.params);
            }

            Some(Dispatch {
                key,
                request: Box::new(move || fetcher.fetch(&source, params)),
            })
        });
    }

    /// Options: pushed tags followed by the parsed source records (tracked)
    pub fn data(&self, graph: &mut ReactiveGraph) -> Vec<Item> {
        graph.get_derived(self.data).unwrap_or_default()
    }

    pub fn is_async(&self, graph: &ReactiveGraph) -> bool {
        graph.with(self.source, Source::is_async).unwrap_or(false)
    }

    pub fn is_dynamic(&self, graph: &ReactiveGraph) -> bool {
        graph.with(self.source, Source::is_dynamic).unwrap_or(false)
    }

    pub fn is_busy(&self, graph: &ReactiveGraph) -> bool {
        self.is_async(graph) && self.remote.is_busy(graph)
    }

    /// Whether a response was applied for the current source
    pub fn is_fetched(&self, graph: &ReactiveGraph) -> bool {
        !self.is_async(graph) || self.remote.state(graph).fetched
    }

    pub fn error(&self, graph: &ReactiveGraph) -> Option<FetchError> {
        if !self.is_async(graph) {
            return None;
        }
        self.remote.state(graph).error
    }

    pub fn state(&self, graph: &mut ReactiveGraph) -> SourceState {
        SourceState {
            data: self.data(graph),
            busy: self.is_busy(graph),
            error: self.error(graph),
            fetched: self.is_fetched(graph),
            is_async: self.is_async(graph),
            dynamic: self.is_dynamic(graph),
        }
    }

    /// Fetch again even if nothing changed
    pub fn refresh(&self, graph: &mut ReactiveGraph) {
        self.remote.refresh(graph);
    }

    /// Add client side options, skipping ones that already exist
    pub fn push_tags(&self, graph: &mut ReactiveGraph, items: Vec<Item>) {
        let mut known = graph.get_derived(self.data).unwrap_or_default();
        let mut added = graph.get_untracked(self.added).unwrap_or_default();
        let before = added.len();

        for mut item in items {
            if known.iter().any(|existing| existing.equals(&item)) {
                continue;
            }
            item.added = true;
            known.push(item.clone());
            added.push(item);
        }

        if added.len() != before {
            graph.set(self.added, added);
        }
    }

    /// Replace the source; pushed options are dropped
    pub fn set_src(&self, graph: &mut ReactiveGraph, source: Source) {
        graph.batch(|g| {
            g.set(self.source, source);
            g.update(self.revision, |r| r + 1);
            g.set(self.added, Vec::new());
        });
    }

    pub fn set_params(&self, graph: &mut ReactiveGraph, params: BTreeMap<String, String>) {
        graph.set_if_changed(self.params, params);
    }

    pub fn set_parse(&self, graph: &mut ReactiveGraph, parse: ParseSpec) {
        graph.set(self.parse, parse);
    }

    pub fn set_fetcher(&self, graph: &mut ReactiveGraph, fetcher: Arc<dyn Fetcher>) {
        graph.batch(|g| {
            g.set(self.fetcher, fetcher);
            g.update(self.revision, |r| r + 1);
        });
    }

    /// Records parsed from the source without pushed tags (tracked)
    pub fn parsed(&self, graph: &mut ReactiveGraph) -> Vec<Item> {
        graph.get_derived(self.parsed).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{AsSpec, ItemFactory};
    use crate::phrase::{Debounce, ValidSpec, Validators, DEFAULT_DEBOUNCE_MS};
    use selekt_core::ReactiveRuntime;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    struct Fixture {
        runtime: ReactiveRuntime,
        src: SrcHook,
        phrase: PhraseHook,
        enabled: Signal<bool>,
    }

    fn fixture(source: Source, fetcher: Arc<dyn Fetcher>) -> Fixture {
        fixture_with(source, fetcher, true)
    }

    fn fixture_with(source: Source, fetcher: Arc<dyn Fetcher>, initially_enabled: bool) -> Fixture {
        let runtime = ReactiveRuntime::current().unwrap();
        let weak = runtime.downgrade();
        let (src, phrase, enabled) = runtime.with(|g| {
            g.batch(|g| {
                let item = ItemHook::new(g, AsSpec::parse("name:id:id"));
                let phrase = PhraseHook::new(
                    g,
                    String::new(),
                    None,
                    Validators::new().compile(&ValidSpec::default()).unwrap(),
                    Debounce::Off,
                    DEFAULT_DEBOUNCE_MS,
                );
                let src = SrcHook::new(g, item, source, ParseSpec::Default, fetcher, BTreeMap::new());
                let enabled = g.create_signal(initially_enabled);
                let gate = g.create_derived(move |g| g.get(enabled).unwrap_or(false));
                src.watch(g, weak, gate, phrase.clone());
                (src, phrase, enabled)
            })
        });
        Fixture {
            runtime,
            src,
            phrase,
            enabled,
        }
    }

    struct FakeHttp {
        urls: Mutex<Vec<String>>,
    }

    impl HttpFetch for FakeHttp {
        fn get(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>> {
            self.urls.lock().unwrap().push(url.to_owned());
            let body = json!({"total": 1, "results": [{"id": 1, "name": url}]});
            future::ready(Ok(body)).boxed()
        }
    }

    #[test]
    fn test_source_classification() {
        assert!(!Source::None.is_async());
        assert!(!Source::items(vec![json!(1)]).is_async());
        assert!(Source::url("/api/items").is_async());
        assert!(!Source::url("/api/items").is_dynamic());
        assert!(Source::url("/api/items?q=%s").is_dynamic());
        assert!(Source::url("/api/items?q={phrase}").is_dynamic());
        assert!(!Source::sync(|_| json!([])).is_dynamic());
        assert!(Source::sync_query(|_| json!([])).is_dynamic());
        assert!(Source::query(|_| async { Ok(json!([])) }).is_dynamic());
        assert!(!Source::lazy(|_| async { Ok(json!([])) }).is_dynamic());
    }

    #[test]
    fn test_expand_url() {
        let mut params = FetchParams {
            phrase: "new tag".into(),
            params: BTreeMap::new(),
        };
        params.params.insert("page".into(), "2".into());

        assert_eq!(expand_url("/s?q=%s&again=%s", &params), "/s?q=new%20tag&again=%s");
        assert_eq!(
            expand_url("/s?q={phrase}&page={page}&x={missing}", &params),
            "/s?q=new%20tag&page=2&x="
        );
    }

    #[test]
    fn test_parse_spec() {
        let body = json!({"meta": {"count": 2}, "data": {"rows": [1, 2], "other": [3]}});
        assert_eq!(ParseSpec::Default.parse(&body), vec![json!(1), json!(2)]);
        assert_eq!(ParseSpec::path("data.other").parse(&body), vec![json!(3)]);
        assert!(ParseSpec::path("nope").parse(&body).is_empty());

        let custom = ParseSpec::Custom(Arc::new(|body: &Value| vec![body["meta"]["count"].clone()]));
        assert_eq!(custom.parse(&body), vec![json!(2)]);
    }

    #[tokio::test]
    async fn test_static_source_is_synchronous() {
        let f = fixture(
            Source::items(vec![json!({"id": 1, "name": "A"}), json!({"id": 2, "name": "B"})]),
            Arc::new(DefaultFetcher::default()),
        );

        let state = f.runtime.with(|g| f.src.state(g));
        assert!(!state.is_async);
        assert!(!state.busy);
        assert!(state.fetched);
        assert_eq!(state.data.len(), 2);
        assert_eq!(state.data[0].label, json!("A"));
    }

    #[tokio::test]
    async fn test_async_source_loads_once_enabled() {
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let source = Source::lazy(move |_| {
            *calls_clone.lock().unwrap() += 1;
            async { Ok(json!([{"id": 1, "name": "A"}])) }
        });
        let f = fixture(source, Arc::new(DefaultFetcher::default()));

        assert!(f.runtime.with(|g| f.src.is_busy(g)));
        settle().await;

        let state = f.runtime.with(|g| f.src.state(g));
        assert!(!state.busy);
        assert!(!state.dynamic);
        assert_eq!(state.data.len(), 1);

        // The phrase is not part of the key of a non-dynamic source
        let weak = f.runtime.downgrade();
        f.runtime.with(|g| f.phrase.type_text(g, &weak, "zzz".into(), true));
        settle().await;
        assert_eq!(*calls.lock().unwrap(), 1);

        f.runtime.with(|g| f.src.refresh(g));
        settle().await;
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dynamic_source_follows_phrase() {
        let phrases = Arc::new(Mutex::new(Vec::new()));
        let phrases_clone = phrases.clone();
        let source = Source::query(move |params: FetchParams| {
            phrases_clone.lock().unwrap().push(params.phrase.clone());
            async move { Ok(json!([{"id": 1, "name": params.phrase}])) }
        });
        let f = fixture(source, Arc::new(DefaultFetcher::default()));
        let weak = f.runtime.downgrade();
        settle().await;

        f.runtime.with(|g| f.phrase.type_text(g, &weak, "ab".into(), false));
        settle().await;

        assert_eq!(*phrases.lock().unwrap(), vec!["".to_string(), "ab".to_string()]);
        let data = f.runtime.with(|g| f.src.data(g));
        assert_eq!(data[0].label, json!("ab"));
    }

    #[tokio::test]
    async fn test_disabled_source_waits() {
        let f = fixture_with(
            Source::lazy(|_| async { Ok(json!([1])) }),
            Arc::new(DefaultFetcher::default()),
            false,
        );
        settle().await;
        let state = f.runtime.with(|g| f.src.state(g));
        assert!(!state.busy);
        assert!(!state.fetched);
        assert!(state.data.is_empty());

        f.runtime.with(|g| g.set(f.enabled, true));
        assert!(f.runtime.with(|g| f.src.is_busy(g)));
        settle().await;
        assert_eq!(f.runtime.with(|g| f.src.data(g)).len(), 1);

        // Replacing the source while disabled keeps the previous result
        f.runtime.with(|g| {
            g.set(f.enabled, false);
            f.src.set_src(g, Source::lazy(|_| async { Ok(json!([1, 2])) }));
        });
        settle().await;
        assert_eq!(f.runtime.with(|g| f.src.data(g)).len(), 1);

        f.runtime.with(|g| g.set(f.enabled, true));
        settle().await;
        assert_eq!(f.runtime.with(|g| f.src.data(g)).len(), 2);
    }

    #[tokio::test]
    async fn test_url_source_uses_http_fetch() {
        let http = Arc::new(FakeHttp {
            urls: Mutex::new(Vec::new()),
        });
        let f = fixture(
            Source::url("https://example.test/search?q=%s"),
            Arc::new(DefaultFetcher::new(http.clone())),
        );
        let weak = f.runtime.downgrade();
        settle().await;
        f.runtime.with(|g| f.phrase.type_text(g, &weak, "a b".into(), false));
        settle().await;

        assert_eq!(
            *http.urls.lock().unwrap(),
            vec![
                "https://example.test/search?q=".to_string(),
                "https://example.test/search?q=a%20b".to_string(),
            ]
        );
        let data = f.runtime.with(|g| f.src.data(g));
        assert_eq!(data[0].label, json!("https://example.test/search?q=a%20b"));
    }

    #[tokio::test]
    async fn test_errors_are_kept_in_state() {
        let (tx, rx) = oneshot::channel::<Result<Value, FetchError>>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let source = Source::lazy(move |_| {
            let rx = rx.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => rx.await.unwrap_or(Err(FetchError::Other("dropped".into()))),
                    None => Ok(json!([])),
                }
            }
        });
        let f = fixture(source, Arc::new(DefaultFetcher::default()));
        settle().await;

        tx.send(Err(FetchError::Status(500))).unwrap();
        settle().await;

        let state = f.runtime.with(|g| f.src.state(g));
        assert_eq!(state.error, Some(FetchError::Status(500)));
        assert!(state.data.is_empty());
        assert!(!state.busy);
    }

    #[tokio::test]
    async fn test_push_tags_dedupes_and_resets_with_source() {
        let f = fixture(
            Source::items(vec![json!({"id": 1, "name": "A"})]),
            Arc::new(DefaultFetcher::default()),
        );
        let factory = ItemFactory::new(AsSpec::parse("name:id:id"));
        let existing = factory.of_raw(json!({"id": 1, "name": "A"}));
        let tag = factory.of_phrase("fresh");

        f.runtime.with(|g| f.src.push_tags(g, vec![existing, tag.clone(), tag]));
        let data = f.runtime.with(|g| f.src.data(g));
        assert_eq!(data.len(), 2);
        assert!(data[0].added);
        assert_eq!(data[0].label, json!("fresh"));

        f.runtime.with(|g| f.src.set_src(g, Source::items(vec![json!({"id": 2, "name": "B"})])));
        let data = f.runtime.with(|g| f.src.data(g));
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].label, json!("B"));
    }
}
