use crate::Result;
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	hash::Hash,
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{instrument, trace};

type Handler<A> = Rc<dyn Fn(&A) -> Result<()>>;

/// Identifies one registration made through [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
	pub(crate) fn from_raw(raw: u64) -> Self {
		Self(raw)
	}
}

/// Synchronous publish/subscribe registry keyed by event name.
///
/// Handlers for an event run in registration order. [`emit`](`EventBus::emit`) works on a snapshot of the
/// handler list, so handlers may (un)register other handlers while an emission is in progress; such changes
/// take effect with the next emission.
pub struct EventBus<E, A: ?Sized> {
	listeners: RefCell<HashMap<E, Vec<(ListenerId, Handler<A>)>>>,
	next_id: Cell<u64>,
}

impl<E, A: ?Sized> Default for EventBus<E, A>
where
	E: Hash + Eq,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<E, A: ?Sized> Debug for EventBus<E, A>
where
	E: Debug,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let listeners = self.listeners.borrow();
		f.debug_map().entries(listeners.iter().map(|(event, handlers)| (event, handlers.len()))).finish()
	}
}

impl<E, A: ?Sized> EventBus<E, A>
where
	E: Hash + Eq,
{
	#[must_use]
	pub fn new() -> Self {
		Self {
			listeners: RefCell::new(HashMap::new()),
			next_id: Cell::new(0),
		}
	}

	/// Registers `handler` for `event`. Multiple handlers per event are allowed.
	pub fn on(&self, event: E, handler: impl Fn(&A) -> Result<()> + 'static) -> ListenerId {
		let id = ListenerId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		self.listeners.borrow_mut().entry(event).or_default().push((id, Rc::new(handler)));
		id
	}

	/// Removes a previously registered handler.
	///
	/// Removing a handler (or from an event) that isn't registered is a no-op.
	#[instrument(skip(self, event))]
	pub fn off(&self, event: &E, id: ListenerId) {
		let mut listeners = self.listeners.borrow_mut();
		match listeners.get_mut(event) {
			Some(handlers) => {
				let before = handlers.len();
				handlers.retain(|(registered, _)| *registered != id);
				if handlers.len() == before {
					trace!("Listener was not registered for this event. Ignoring.");
				}
				if handlers.is_empty() {
					listeners.remove(event);
				}
			}
			None => trace!("No listeners registered for this event. Ignoring."),
		}
	}

	/// Calls every handler currently registered for `event`, in registration order.
	///
	/// # Errors
	///
	/// Emission stops at the first handler that fails, and that error is returned.
	pub fn emit(&self, event: &E, args: &A) -> Result<()> {
		let handlers: Vec<Handler<A>> = match self.listeners.borrow().get(event) {
			Some(handlers) => handlers.iter().map(|(_, handler)| Rc::clone(handler)).collect(),
			None => return Ok(()),
		};
		for handler in handlers {
			handler(args)?;
		}
		Ok(())
	}

	#[must_use]
	pub fn listener_count(&self, event: &E) -> usize {
		self.listeners.borrow().get(event).map_or(0, Vec::len)
	}
}
