use crate::{block::Block, dom::Document, router::WeakRouter, Error, Result};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use tracing::{instrument, trace};

/// The pattern of the catch-all route.
pub const WILDCARD: &str = "*";

/// Creates a route's component. Called at most once per route.
pub type ComponentFactory = Rc<dyn Fn(&RouteProps) -> Result<Block>>;

/// Runs to completion before each render of its route.
pub type BeforeEnter = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<()>>>;

/// A route's static configuration, which is also all its component's factory gets to see.
#[derive(Debug, Clone)]
pub struct RouteProps {
	pub root_query: String,
	/// The router the route was registered with, for components that navigate.
	pub router: WeakRouter,
}

impl RouteProps {
	#[must_use]
	pub fn new(root_query: impl Into<String>) -> Self {
		Self {
			root_query: root_query.into(),
			router: WeakRouter::default(),
		}
	}
}

/// Binds a path to a lazily created, then reused, component.
pub struct Route {
	pathname: String,
	factory: ComponentFactory,
	props: RouteProps,
	before_enter: Option<BeforeEnter>,
	document: Document,
	block: RefCell<Option<Block>>,
}

impl Debug for Route {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Route")
			.field("pathname", &self.pathname)
			.field("props", &self.props)
			.field("before_enter", &self.before_enter.is_some())
			.field("block", &*self.block.borrow())
			.finish_non_exhaustive()
	}
}

impl Route {
	#[must_use]
	pub fn new(pathname: impl Into<String>, factory: ComponentFactory, props: RouteProps, before_enter: Option<BeforeEnter>, document: Document) -> Self {
		Self {
			pathname: pathname.into(),
			factory,
			props,
			before_enter,
			document,
			block: RefCell::new(None),
		}
	}

	/// The registered pattern.
	#[must_use]
	pub fn pathname(&self) -> &str {
		&self.pathname
	}

	#[must_use]
	pub fn is_wildcard(&self) -> bool {
		self.pathname == WILDCARD
	}

	/// Exact equality, or anything at all for the wildcard route.
	#[must_use]
	pub fn matches(&self, pathname: &str) -> bool {
		self.is_wildcard() || self.pathname == pathname
	}

	/// The live component, once there is one.
	#[must_use]
	pub fn block(&self) -> Option<Block> {
		self.block.borrow().clone()
	}

	#[must_use]
	pub fn props(&self) -> &RouteProps {
		&self.props
	}

	/// Renders the route if `pathname` matches it.
	///
	/// # Errors
	///
	/// See [`render`](`Route::render`).
	pub async fn navigate(&self, pathname: &str) -> Result<()> {
		if self.matches(pathname) {
			self.render().await
		} else {
			trace!(route = %self.pathname, "Path doesn't match. Not rendering.");
			Ok(())
		}
	}

	/// Awaits the pre-entry hook, then shows the existing component, or creates one and appends it to the root.
	///
	/// A newly created component is mounted right after insertion.
	///
	/// # Errors
	///
	/// Iff the pre-entry hook fails (unchanged), the root query matches nothing, or creating, mounting or showing the
	/// component fails.
	#[instrument(skip(self), fields(route = %self.pathname))]
	pub async fn render(&self) -> Result<()> {
		if let Some(before_enter) = &self.before_enter {
			before_enter().await?;
		}

		// Checked only after the hook, since another render of this route may have finished in the meantime.
		let existing = self.block();
		if let Some(block) = existing {
			return block.show();
		}

		let root = self
			.document
			.query_selector(&self.props.root_query)?
			.ok_or_else(|| Error::RootNotFound(self.props.root_query.clone()))?;
		let block = (self.factory)(&self.props)?;
		root.append_child(&block.get_content()?)?;
		*self.block.borrow_mut() = Some(block.clone());
		trace!(id = %block.id(), "Created the route's component.");
		block.dispatch_component_did_mount()
	}

	/// Hides the live component, if any.
	///
	/// # Errors
	///
	/// See [`Block::hide`].
	pub fn leave(&self) -> Result<()> {
		match self.block() {
			Some(block) => block.hide(),
			None => Ok(()),
		}
	}
}
