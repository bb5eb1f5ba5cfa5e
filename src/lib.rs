#![doc(html_root_url = "https://docs.rs/block-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod error;
mod event_bus;

pub mod block;
pub mod connect;
pub mod dom;
pub mod history;
pub mod markup;
pub mod props;
pub mod route;
pub mod router;
pub mod store;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use block::{Block, BlockId, Component, WeakBlock};
pub use connect::Connect;
pub use dom::{Document, Event, Node};
pub use error::{Error, Result};
pub use event_bus::{EventBus, ListenerId};
pub use history::{History, MemoryHistory};
pub use props::{Prop, PropBag, Props};
pub use route::{Route, RouteProps, WILDCARD};
pub use router::{Platform, Router, WeakRouter};
pub use store::{Store, StoreEvent, StoreUpdate};
