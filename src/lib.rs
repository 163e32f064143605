//! # blixt
//!
//! Reactive stores and live templates for Rust.
//!
//! ## Architecture
//!
//! blixt tracks reads instead of declaring dependencies. A getter runs inside
//! an observation, every store key path it reads is recorded, and a write to
//! any of those paths queues exactly one re-run on the next frame.
//!
//! ```text
//! Store write → emit(key, ancestors) → Observation queued → run_frame → after(value)
//! ```
//!
//! Templates build on the same loop: each live expression in the markup is
//! an observation whose `after` callback patches the document.
//!
//! ## Modules
//!
//! - [`store`] - Reactive store, change emission, array mutators, subscriptions
//! - [`observer`] - Observations, content slots, attribute bindings
//! - [`scheduler`] - Frame queue standing in for animation frames
//! - [`dom`] - In-memory document, HTML parser, events
//! - [`template`] - Templates, binder, hydration
//! - [`key`] / [`value`] - Key paths and the dynamic value model
//!
//! ## Example
//!
//! ```ignore
//! use blixt::{Store, dom, reactive, run_frame, template};
//! use serde_json::json;
//!
//! let s = Store::new(json!({ "name": "world" }))?;
//! let root = dom::create_element("main");
//!
//! let greeting = template(["<p>Hello, ", "!</p>"], vec![reactive({
//!     let s = s.clone();
//!     move || s.get("name")
//! })]);
//! greeting.render(Some(root));
//!
//! s.set("name", "blixt")?;
//! run_frame();
//! assert_eq!(dom::inner_html(root), "<p>Hello, blixt!</p>");
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod key;
pub mod observer;
pub mod scheduler;
pub mod store;
pub mod template;
pub mod value;

// Re-export commonly used items
pub use error::{Error, Result};
pub use key::{Key, Symbol};
pub use value::Value;

pub use store::{Callback, Store, StoreState, StoreSubscription, store, subscribe};

pub use observer::{Getter, ObservationSubscription, getter, observe, untracked};

pub use scheduler::{FrameId, cancel_frame, request_frame, run_frame, settle};

pub use template::{Content, Expression, Template, clean_nodes, on, reactive, template};

pub use config::{Options, options, set_options};
