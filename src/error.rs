use thiserror::Error;

/// Everything that can go wrong inside the component runtime, the store or the router.
///
/// Nothing here is swallowed internally: operations either fail at the call site or hand the error to the
/// caller's `async` chain.
#[derive(Debug, Error)]
pub enum Error {
	/// A value query ran against a component without the expected node.
	#[error("element not found: {0}")]
	ElementNotFound(String),

	/// Props are merged into, never deleted from.
	#[error("props keys cannot be deleted (tried to delete `{0}`)")]
	PropDeletion(String),

	/// A route's root query matched nothing in the document.
	#[error("no element matches the root query `{0}`")]
	RootNotFound(String),

	/// Nothing, not even a wildcard route, matched the path.
	#[error("no route matches `{0}` and no wildcard route is registered")]
	NoRoute(String),

	/// The router was started without a catch-all route.
	#[error("a wildcard (`*`) route must be registered before the router is started")]
	MissingWildcard,

	#[error("template error at byte {offset}: {message}")]
	Template { offset: usize, message: String },

	#[error("markup error: {0}")]
	Markup(String),

	/// A node was inserted somewhere the tree can't hold it (into a text node, or into its own subtree).
	#[error("hierarchy error: {0}")]
	Hierarchy(String),

	#[error("selector error: {0}")]
	Selector(String),

	#[error("history error: {0}")]
	History(String),

	/// A browser API call failed.
	#[error("browser error: {0}")]
	Browser(String),

	/// Store state didn't have the requested shape.
	#[error("state error: {0}")]
	State(#[from] serde_json::Error),

	#[error("could not spawn navigation task: {0}")]
	Spawn(#[from] futures::task::SpawnError),

	/// Failure reported by application code (lifecycle hooks, pre-entry hooks, actions, handlers).
	#[error("{0}")]
	Hook(Box<dyn std::error::Error>),
}

impl Error {
	pub fn hook(error: impl Into<Box<dyn std::error::Error>>) -> Self {
		Self::Hook(error.into())
	}

	pub(crate) fn template(offset: usize, message: impl Into<String>) -> Self {
		Self::Template { offset, message: message.into() }
	}
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
