//! Session history backends for the [`Router`](`crate::Router`).

use crate::{event_bus::EventBus, Error, ListenerId, Result};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use tracing::{error, instrument, trace};

/// The parts of the browser's `History` API the router drives.
///
/// `back` and `forward` only *request* a traversal. Its completion is announced later through a pop-state
/// notification carrying the new path, or never if there's nothing to traverse to.
pub trait History {
	fn pathname(&self) -> String;

	/// # Errors
	///
	/// Iff the backend refuses the entry.
	fn push_state(&self, pathname: &str) -> Result<()>;

	/// # Errors
	///
	/// Iff the backend fails.
	fn back(&self) -> Result<()>;

	/// # Errors
	///
	/// Iff the backend fails.
	fn forward(&self) -> Result<()>;

	/// Calls `listener` with the new path after every traversal.
	fn on_pop_state(&self, listener: Box<dyn Fn(&str)>) -> ListenerId;

	fn off_pop_state(&self, id: ListenerId);

	/// Calls `listener` once, after the next traversal.
	fn once_pop_state(&self, listener: Box<dyn FnOnce(&str)>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PopState;

/// An in-memory session history.
///
/// Traversals are announced synchronously. A traversal past either end changes nothing and discards pending
/// [`once_pop_state`](`History::once_pop_state`) listeners instead of keeping them for a later traversal.
pub struct MemoryHistory {
	entries: RefCell<Vec<String>>,
	index: Cell<usize>,
	listeners: EventBus<PopState, str>,
	once: RefCell<Vec<Box<dyn FnOnce(&str)>>>,
}

impl Debug for MemoryHistory {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryHistory")
			.field("entries", &self.entries.borrow().len())
			.field("index", &self.index.get())
			.finish_non_exhaustive()
	}
}

impl MemoryHistory {
	#[must_use]
	pub fn new(initial_pathname: impl Into<String>) -> Self {
		Self {
			entries: RefCell::new(vec![initial_pathname.into()]),
			index: Cell::new(0),
			listeners: EventBus::new(),
			once: RefCell::new(Vec::new()),
		}
	}

	#[must_use]
	pub fn entries(&self) -> Vec<String> {
		self.entries.borrow().clone()
	}

	#[must_use]
	pub fn index(&self) -> usize {
		self.index.get()
	}

	fn traverse(&self, delta: isize) {
		let target = self.index.get().checked_add_signed(delta).filter(|&target| target < self.entries.borrow().len());
		let target = match target {
			Some(target) => target,
			None => {
				trace!("Nothing to traverse to.");
				self.once.borrow_mut().clear();
				return;
			}
		};
		self.index.set(target);
		let pathname = self.pathname();

		if let Err(error) = self.listeners.emit(&PopState, &pathname) {
			error!("Pop-state listener failed: {}", error);
		}
		let once = core::mem::take(&mut *self.once.borrow_mut());
		for listener in once {
			listener(&pathname);
		}
	}
}

impl History for MemoryHistory {
	fn pathname(&self) -> String {
		self.entries.borrow().get(self.index.get()).cloned().unwrap_or_default()
	}

	#[instrument(skip(self))]
	fn push_state(&self, pathname: &str) -> Result<()> {
		if pathname.is_empty() {
			return Err(Error::History("empty pathname".to_string()));
		}
		let mut entries = self.entries.borrow_mut();
		entries.truncate(self.index.get() + 1);
		entries.push(pathname.to_string());
		self.index.set(entries.len() - 1);
		Ok(())
	}

	fn back(&self) -> Result<()> {
		self.traverse(-1);
		Ok(())
	}

	fn forward(&self) -> Result<()> {
		self.traverse(1);
		Ok(())
	}

	fn on_pop_state(&self, listener: Box<dyn Fn(&str)>) -> ListenerId {
		self.listeners.on(PopState, move |pathname| {
			listener(pathname);
			Ok(())
		})
	}

	fn off_pop_state(&self, id: ListenerId) {
		self.listeners.off(&PopState, id);
	}

	fn once_pop_state(&self, listener: Box<dyn FnOnce(&str)>) {
		self.once.borrow_mut().push(listener);
	}
}
