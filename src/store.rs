//! Global application state.

use crate::{event_bus::EventBus, ListenerId, Result};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::{error, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
	Updated,
}

/// Full state snapshots from before and after one [`Store::set`].
#[derive(Clone, PartialEq)]
pub struct StoreUpdate {
	pub previous: Map<String, Value>,
	pub next: Map<String, Value>,
}

impl Debug for StoreUpdate {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		if cfg!(feature = "dangerous-logging") {
			f.debug_struct("StoreUpdate").field("previous", &self.previous).field("next", &self.next).finish()
		} else {
			f.debug_struct("StoreUpdate")
				.field("previous", &format_args!("{} key(s)", self.previous.len()))
				.field("next", &format_args!("{} key(s)", self.next.len()))
				.finish()
		}
	}
}

struct StoreInner {
	state: RefCell<Map<String, Value>>,
	events: EventBus<StoreEvent, StoreUpdate>,
}

/// The process-wide state bag. Clones refer to the same store.
#[derive(Clone)]
pub struct Store(Rc<StoreInner>);

impl PartialEq for Store {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Store {}

impl Debug for Store {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Store")
			.field("keys", &self.0.state.borrow().len())
			.field("subscribers", &self.0.events.listener_count(&StoreEvent::Updated))
			.finish()
	}
}

thread_local! {
	static INSTANCE: RefCell<Option<Store>> = RefCell::new(None);
}

impl Store {
	/// Returns the store, creating it (seeded with `default_state` through [`set`](`Store::set`)) if there is none yet.
	///
	/// Once a store exists, `default_state` is discarded.
	#[instrument(skip(default_state))]
	pub fn new(default_state: Map<String, Value>) -> Self {
		if let Some(existing) = Self::instance() {
			trace!("Store already exists. Discarding the default state.");
			return existing;
		}

		let store = Self(Rc::new(StoreInner {
			state: RefCell::new(Map::new()),
			events: EventBus::new(),
		}));
		// Nobody can have subscribed yet.
		if let Err(error) = store.set(default_state) {
			error!("Seeding the store failed: {}", error);
		}
		INSTANCE.with(|instance| *instance.borrow_mut() = Some(store.clone()));
		store
	}

	/// The existing store, if one was created on this thread.
	#[must_use]
	pub fn instance() -> Option<Self> {
		INSTANCE.with(|instance| instance.borrow().clone())
	}

	/// Shallow-merges `next` into the state, then synchronously notifies every subscriber.
	///
	/// # Errors
	///
	/// Iff a subscriber fails. The state is updated regardless; later subscribers are not notified.
	#[instrument(skip(self, next), fields(keys = next.len()))]
	pub fn set(&self, next: Map<String, Value>) -> Result<()> {
		let previous = self.state();
		{
			let mut state = self.0.state.borrow_mut();
			for (key, value) in next {
				state.insert(key, value);
			}
		}
		let update = StoreUpdate { previous, next: self.state() };
		if cfg!(feature = "dangerous-logging") {
			trace!(?update, "Store updated.");
		}
		self.0.events.emit(&StoreEvent::Updated, &update)
	}

	/// A snapshot of the current state.
	#[must_use]
	pub fn state(&self) -> Map<String, Value> {
		self.0.state.borrow().clone()
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<Value> {
		self.0.state.borrow().get(key).cloned()
	}

	/// Deserializes the whole state.
	///
	/// # Errors
	///
	/// Iff the state doesn't fit `T`.
	pub fn state_as<T: DeserializeOwned>(&self) -> Result<T> {
		Ok(serde_json::from_value(Value::Object(self.state()))?)
	}

	pub fn on(&self, event: StoreEvent, handler: impl Fn(&StoreUpdate) -> Result<()> + 'static) -> ListenerId {
		self.0.events.on(event, handler)
	}

	pub fn off(&self, event: StoreEvent, id: ListenerId) {
		self.0.events.off(&event, id);
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.0.events.listener_count(&StoreEvent::Updated)
	}
}
