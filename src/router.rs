//! Single-page navigation over a [`History`] backend.

use crate::{
	block::Block,
	dom::Document,
	history::History,
	route::{BeforeEnter, ComponentFactory, Route, RouteProps},
	Error, ListenerId, Result,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
};
use futures::{
	channel::oneshot,
	future::FutureExt,
	task::{LocalSpawn, LocalSpawnExt},
};
use std::rc::{Rc, Weak};
use tracing::{error, instrument, trace, warn};

/// What a router runs against.
#[derive(Clone)]
pub struct Platform {
	pub document: Document,
	pub history: Rc<dyn History>,
	/// Runs navigations nobody awaits, i.e. those triggered by pop-state notifications.
	pub spawner: Rc<dyn LocalSpawn>,
}

impl Debug for Platform {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Platform").field("document", &self.document).finish_non_exhaustive()
	}
}

type ErrorHandler = Rc<dyn Fn(Error)>;

struct RouterInner {
	root_query: String,
	platform: Platform,
	routes: RefCell<Vec<Rc<Route>>>,
	current: RefCell<Option<Rc<Route>>>,
	pop_state_listener: Cell<Option<ListenerId>>,
	/// Traversals a `back` or `forward` call is waiting on, which the pop-state listener leaves to that call.
	awaited_pops: Cell<usize>,
	error_handler: RefCell<Option<ErrorHandler>>,
}

/// Counts one traversal as awaited for as long as it lives, including when the awaiting future is dropped early.
struct AwaitedPop<'a>(&'a Cell<usize>);

impl<'a> AwaitedPop<'a> {
	fn new(awaited_pops: &'a Cell<usize>) -> Self {
		awaited_pops.set(awaited_pops.get() + 1);
		Self(awaited_pops)
	}
}

impl Drop for AwaitedPop<'_> {
	fn drop(&mut self) {
		self.0.set(self.0.get() - 1);
	}
}

/// The process-wide router. Clones refer to the same router.
#[derive(Clone)]
pub struct Router(Rc<RouterInner>);

/// A non-owning [`Router`] handle.
#[derive(Clone, Default)]
pub struct WeakRouter(Weak<RouterInner>);

impl Debug for WeakRouter {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("WeakRouter").field(&(self.0.strong_count() > 0)).finish()
	}
}

impl WeakRouter {
	#[must_use]
	pub fn upgrade(&self) -> Option<Router> {
		self.0.upgrade().map(Router)
	}
}

impl PartialEq for Router {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Router {}

impl Debug for Router {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Router")
			.field("root_query", &self.0.root_query)
			.field("routes", &self.0.routes.borrow().iter().map(|route| route.pathname().to_string()).collect::<Vec<_>>())
			.field("current", &self.0.current.borrow().as_ref().map(|route| route.pathname().to_string()))
			.finish_non_exhaustive()
	}
}

thread_local! {
	static INSTANCE: RefCell<Option<Router>> = RefCell::new(None);
}

impl Router {
	/// Returns the router, creating it if there is none yet.
	///
	/// Once a router exists, both arguments are discarded.
	#[instrument(skip(platform))]
	pub fn new(root_query: &str, platform: Platform) -> Self {
		if let Some(existing) = Self::instance() {
			trace!("Router already exists. Discarding the new configuration.");
			return existing;
		}

		let router = Self(Rc::new(RouterInner {
			root_query: root_query.to_string(),
			platform,
			routes: RefCell::new(Vec::new()),
			current: RefCell::new(None),
			pop_state_listener: Cell::new(None),
			awaited_pops: Cell::new(0),
			error_handler: RefCell::new(None),
		}));
		INSTANCE.with(|instance| *instance.borrow_mut() = Some(router.clone()));
		router
	}

	/// The existing router, if one was created on this thread.
	#[must_use]
	pub fn instance() -> Option<Self> {
		INSTANCE.with(|instance| instance.borrow().clone())
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakRouter {
		WeakRouter(Rc::downgrade(&self.0))
	}

	#[must_use]
	pub fn root_query(&self) -> &str {
		&self.0.root_query
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.0.platform.document
	}

	#[must_use]
	pub fn history(&self) -> &Rc<dyn History> {
		&self.0.platform.history
	}

	/// Registers a route under this router's root query.
	pub fn use_route(&self, pathname: &str, factory: impl Fn(&RouteProps) -> Result<Block> + 'static) -> &Self {
		self.push_route(pathname, Rc::new(factory), None)
	}

	/// Registers a route whose renders each wait for `before_enter` first.
	pub fn use_route_with<F, Fut>(&self, pathname: &str, factory: F, before_enter: impl Fn() -> Fut + 'static) -> &Self
	where
		F: Fn(&RouteProps) -> Result<Block> + 'static,
		Fut: Future<Output = Result<()>> + 'static,
	{
		let before_enter: BeforeEnter = Rc::new(move || before_enter().boxed_local());
		self.push_route(pathname, Rc::new(factory), Some(before_enter))
	}

	fn push_route(&self, pathname: &str, factory: ComponentFactory, before_enter: Option<BeforeEnter>) -> &Self {
		let props = RouteProps {
			root_query: self.0.root_query.clone(),
			router: self.downgrade(),
		};
		let route = Route::new(pathname, factory, props, before_enter, self.0.platform.document.clone());
		self.0.routes.borrow_mut().push(Rc::new(route));
		self
	}

	/// The route for `pathname`: an exact match if there is one, else the wildcard route.
	#[must_use]
	pub fn get_route(&self, pathname: &str) -> Option<Rc<Route>> {
		let routes = self.0.routes.borrow();
		routes
			.iter()
			.find(|route| !route.is_wildcard() && route.matches(pathname))
			.or_else(|| routes.iter().find(|route| route.is_wildcard()))
			.cloned()
	}

	#[must_use]
	pub fn current_route(&self) -> Option<Rc<Route>> {
		self.0.current.borrow().clone()
	}

	/// Receives the errors of navigations nobody awaits. Without one, they are logged.
	pub fn set_error_handler(&self, handler: impl Fn(Error) + 'static) {
		*self.0.error_handler.borrow_mut() = Some(Rc::new(handler));
	}

	fn report(&self, error: Error) {
		let handler = self.0.error_handler.borrow().clone();
		match handler {
			Some(handler) => handler(error),
			None => error!("Navigation failed: {}", error),
		}
	}

	/// Starts following history traversals, then resolves the current path.
	///
	/// # Errors
	///
	/// [`Error::MissingWildcard`] iff no wildcard route is registered, otherwise as [`go`](`Router::go`).
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		if !self.0.routes.borrow().iter().any(|route| route.is_wildcard()) {
			return Err(Error::MissingWildcard);
		}

		if self.0.pop_state_listener.get().is_none() {
			let weak = self.downgrade();
			let id = self.0.platform.history.on_pop_state(Box::new(move |pathname| {
				if let Some(router) = weak.upgrade() {
					router.on_pop_state(pathname);
				}
			}));
			self.0.pop_state_listener.set(Some(id));
		} else {
			warn!("Router was already started.");
		}

		let pathname = self.0.platform.history.pathname();
		self.resolve(&pathname).await
	}

	fn on_pop_state(&self, pathname: &str) {
		if self.0.awaited_pops.get() > 0 {
			trace!("Traversal is awaited by `back` or `forward`.");
			return;
		}
		self.spawn_resolve(pathname.to_string());
	}

	fn spawn_resolve(&self, pathname: String) {
		let router = self.clone();
		let navigation = async move {
			if let Err(error) = router.resolve(&pathname).await {
				router.report(error);
			}
		};
		if let Err(error) = self.0.platform.spawner.spawn_local(navigation) {
			self.report(error.into());
		}
	}

	/// Pushes a history entry for `pathname`, then resolves it.
	///
	/// # Errors
	///
	/// Iff the history backend fails, nothing matches, or rendering the route fails (including its pre-entry hook).
	#[instrument(skip(self))]
	pub async fn go(&self, pathname: &str) -> Result<()> {
		self.0.platform.history.push_state(pathname)?;
		self.resolve(pathname).await
	}

	/// Like [`go`](`Router::go`), but runs in the background, reporting failures to the error handler.
	///
	/// This is the way to navigate from DOM event handlers.
	pub fn navigate(&self, pathname: &str) {
		match self.0.platform.history.push_state(pathname) {
			Ok(()) => self.spawn_resolve(pathname.to_string()),
			Err(error) => self.report(error),
		}
	}

	/// Requests a backwards traversal and resolves the path it lands on.
	///
	/// Completes without navigating if there's nothing to go back to.
	///
	/// # Errors
	///
	/// Like [`go`](`Router::go`).
	pub async fn back(&self) -> Result<()> {
		self.traverse(|history| history.back()).await
	}

	/// # Errors
	///
	/// Like [`go`](`Router::go`).
	pub async fn forward(&self) -> Result<()> {
		self.traverse(|history| history.forward()).await
	}

	async fn traverse(&self, step: impl FnOnce(&dyn History) -> Result<()>) -> Result<()> {
		let (sender, receiver) = oneshot::channel();
		self.0.platform.history.once_pop_state(Box::new(move |pathname| {
			if sender.send(pathname.to_string()).is_err() {
				trace!("Traversal is no longer awaited.");
			}
		}));

		let awaited = AwaitedPop::new(&self.0.awaited_pops);
		step(&*self.0.platform.history)?;
		let landed = receiver.await.ok();
		drop(awaited);

		match landed {
			Some(pathname) => self.resolve(&pathname).await,
			None => {
				trace!("History didn't move.");
				Ok(())
			}
		}
	}

	#[instrument(skip(self))]
	async fn resolve(&self, pathname: &str) -> Result<()> {
		let route = self.get_route(pathname).ok_or_else(|| Error::NoRoute(pathname.to_string()))?;

		let previous = self.current_route();
		if let Some(previous) = previous {
			if !Rc::ptr_eq(&previous, &route) {
				previous.leave()?;
			}
		}
		*self.0.current.borrow_mut() = Some(Rc::clone(&route));

		route.render().await
	}
}
