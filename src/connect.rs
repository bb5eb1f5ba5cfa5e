//! Binding components to a slice of [`Store`] state.

use crate::{
	block::{Block, Component},
	props::{Prop, PropBag},
	store::{Store, StoreEvent},
	ListenerId, Result,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::{instrument, trace};

type MapState = Rc<dyn Fn(&Map<String, Value>) -> Map<String, Value>>;
type Action = Rc<dyn Fn(&Store, &[Value]) -> Result<()>>;

/// Builds blocks that receive a mapped slice of the store's state as props and follow its changes.
///
/// ```
/// use block_dom::{Block, Component, Connect, PropBag, Props, Store};
/// use serde_json::{json, Map, Value};
///
/// struct Greeting;
/// impl Component for Greeting {
///     fn render(&self, _: &Props) -> String {
///         "<p>Hello, {{name}}!</p>".to_string()
///     }
/// }
///
/// let store = Store::new(Map::new());
/// store.set(json!({ "user": { "name": "Ada" } }).as_object().cloned().unwrap_or_default())?;
///
/// let greeting = Connect::new(&store, |state| {
///     let mut slice = Map::new();
///     slice.insert("name".to_string(), state.get("user").and_then(|user| user.get("name")).cloned().unwrap_or(Value::Null));
///     slice
/// })
/// .build(Greeting, PropBag::new())?;
///
/// assert_eq!(greeting.element().unwrap().outer_html(), "<p>Hello, Ada!</p>");
/// # Ok::<(), block_dom::Error>(())
/// ```
#[derive(Clone)]
pub struct Connect {
	store: Store,
	map_state: MapState,
	actions: Vec<(String, Action)>,
}

impl Debug for Connect {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connect")
			.field("actions", &self.actions.iter().map(|(name, _)| name).collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

impl Connect {
	pub fn new(store: &Store, map_state: impl Fn(&Map<String, Value>) -> Map<String, Value> + 'static) -> Self {
		Self {
			store: store.clone(),
			map_state: Rc::new(map_state),
			actions: Vec::new(),
		}
	}

	/// Injects a callback prop `name` that runs `action` with the store and the call's arguments.
	#[must_use]
	pub fn dispatch(mut self, name: impl Into<String>, action: impl Fn(&Store, &[Value]) -> Result<()> + 'static) -> Self {
		self.actions.push((name.into(), Rc::new(action)));
		self
	}

	/// Creates the block with the mapped slice merged over `props`, then subscribes it to store updates.
	///
	/// The block's props are written only when the mapped slice actually changes. The subscription ends when the
	/// block is [disposed](`Block::dispose`), or with the first update after the block was dropped.
	///
	/// # Errors
	///
	/// Iff constructing the block fails.
	#[instrument(skip(self, component, props))]
	pub fn build<C: Component>(&self, component: C, props: PropBag) -> Result<Block> {
		let slice = (self.map_state)(&self.store.state());
		let mut props = props.values(slice.clone());
		for (name, action) in &self.actions {
			let store = self.store.clone();
			let action = Rc::clone(action);
			props.insert(name.clone(), Prop::callback(move |_, args| action(&store, args)));
		}
		let block = Block::new(component, props)?;

		let subscription = Rc::new(Cell::new(None::<ListenerId>));
		let last = RefCell::new(slice);
		let map_state = Rc::clone(&self.map_state);
		let weak = block.downgrade();
		let store = self.store.clone();
		let handler_subscription = Rc::clone(&subscription);
		let id = self.store.on(StoreEvent::Updated, move |update| {
			let block = match weak.upgrade() {
				Some(block) => block,
				None => {
					if let Some(id) = handler_subscription.take() {
						trace!("Connected block was dropped. Unsubscribing.");
						store.off(StoreEvent::Updated, id);
					}
					return Ok(());
				}
			};
			let next = map_state(&update.next);
			if *last.borrow() == next {
				trace!(id = %block.id(), "Mapped state unchanged.");
				return Ok(());
			}
			*last.borrow_mut() = next.clone();
			block.set_props(PropBag::new().values(next))
		});

		subscription.set(Some(id));

		let store = self.store.clone();
		block.on_dispose(move || {
			if let Some(id) = subscription.take() {
				store.off(StoreEvent::Updated, id);
			}
		});
		Ok(block)
	}
}
