//! Selekt
//!
//! Headless state for select and combobox widgets. A [`Select`] owns the
//! phrase, the option source, the selected value and the list state; the
//! host renders from [`Scope`] snapshots and attribute bags and forwards
//! user events back.
//!
//! Features:
//!
//! - static, function, async and URL template sources with stale response
//!   protection
//! - debounced phrase commits and named phrase validators
//! - client side filtering, groups and tagging
//! - single and multiple selection with owner-controlled values
//! - resolution of values that only carry an index
//!
//! # Example
//!
//! ```rust,no_run
//! use selekt::{Key, KeyInput, Select, SelectConfig};
//! use serde_json::json;
//!
//! # async fn run() -> selekt::Result<()> {
//! let select = Select::new(
//!     SelectConfig::new()
//!         .src(vec![
//!             json!({"id": 1, "name": "Apple"}),
//!             json!({"id": 2, "name": "Banana"}),
//!         ])
//!         .item_as("name:id:id"),
//! )?;
//!
//! select.type_text("ban");
//! select.on_key(KeyInput::new(Key::ArrowDown));
//! select.on_key(KeyInput::new(Key::Enter));
//! assert_eq!(select.model_value(), json!(2));
//! # Ok(())
//! # }
//! ```

pub mod attrs;
pub mod config;
pub mod error;
pub mod item;
pub mod items;
pub mod json;
pub mod model;
pub mod phrase;
pub mod pointer;
pub mod service;
pub mod src;
pub mod ui;

pub use attrs::{AttrBag, AttrValue, ElementIds, IdGenerator, SequentialIds};
pub use config::{SelectConfig, SelectDefaults};
pub use error::{FetchError, Result, SelectError};
pub use item::{Accessor, AsSpec, Item, ItemFactory, ItemState};
pub use items::{DisableContext, FilterSpec, SelectionMode, Tagging};
pub use model::{ModelChange, Resolve};
pub use phrase::{Debounce, ValidSpec, Validators};
pub use pointer::Step;
pub use service::{Scope, Select};
pub use src::{DefaultFetcher, FetchParams, Fetcher, HttpFetch, ParseSpec, Source, SourceState};
pub use ui::{Key, KeyInput, KeyResponse};

pub use selekt_core::{Commit, ReactiveRuntime, RuntimeStats};
