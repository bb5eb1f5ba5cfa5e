//! The browser side: loading page markup into a headless [`Document`], mirroring that document back into the real
//! DOM and driving the router through `window.history`.

use crate::{
	dom::{self, Document, Node},
	history::History,
	router::Platform,
	Error, ListenerId, Result,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use futures::{
	future::LocalFutureObj,
	task::{LocalSpawn, SpawnError},
};
use std::rc::{Rc, Weak};
use tracing::{error, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{AddEventListenerOptions, Attr, Element, HtmlElement, HtmlInputElement, HtmlTextAreaElement, NamedNodeMap, NodeList, Text, Window};

fn browser_error(context: &str, error: &JsValue) -> Error {
	match error.dyn_ref::<js_sys::Error>() {
		Some(error) => Error::Browser(format!("{}: {}", context, String::from(error.message()))),
		None => Error::Browser(format!("{}: {:?}", context, error)),
	}
}

fn window() -> Result<Window> {
	web_sys::window().ok_or_else(|| Error::Browser("no `window`".to_string()))
}

fn browser_document() -> Result<web_sys::Document> {
	window()?.document().ok_or_else(|| Error::Browser("no `window.document`".to_string()))
}

fn browser_body() -> Result<HtmlElement> {
	browser_document()?.body().ok_or_else(|| Error::Browser("no `document.body`".to_string()))
}

/// Copies the page's current `<body>` content into a new headless [`Document`].
///
/// # Errors
///
/// Iff there's no browser document.
#[instrument]
pub fn load_document() -> Result<Document> {
	let document = Document::new();
	let body: &web_sys::Node = &browser_body()?;
	load_child_nodes(&document.body(), &body.child_nodes())?;
	Ok(document)
}

fn load_child_nodes(parent: &Node, child_nodes: &NodeList) -> Result<()> {
	for i in 0..child_nodes.length() {
		let child = match child_nodes.item(i) {
			Some(child) => child,
			None => continue,
		};
		if let Some(element) = child.dyn_ref::<Element>() {
			parent.append_child(&load_element(element)?)?;
		} else if let Some(text) = child.dyn_ref::<Text>() {
			parent.append_child(&Node::text(text.data()))?;
		} else {
			trace!("Skipping non-element, non-text node {:?}.", child.node_name());
		}
	}
	Ok(())
}

fn load_element(element: &Element) -> Result<Node> {
	let node = Node::element(&element.tag_name());
	load_attributes(&node, &element.attributes());
	if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
		node.set_value(input.value());
	}
	let web_node: &web_sys::Node = element.as_ref();
	load_child_nodes(&node, &web_node.child_nodes())?;
	Ok(node)
}

fn load_attributes(node: &Node, attributes: &NamedNodeMap) {
	for i in 0..attributes.length() {
		let attribute: Attr = match attributes.item(i) {
			Some(attribute) => attribute,
			None => continue,
		};
		node.set_attribute(&attribute.local_name(), attribute.value());
	}
}

struct MirrorInner {
	document: Document,
	target: Element,
	scheduled: Cell<bool>,
	observer: Cell<Option<ListenerId>>,
	closures: RefCell<Vec<Closure<dyn Fn(web_sys::Event)>>>,
}

impl Drop for MirrorInner {
	fn drop(&mut self) {
		if let Some(id) = self.observer.take() {
			self.document.off_mutation(id);
		}
	}
}

/// Keeps a browser element's content in sync with a headless document's body.
///
/// Mutations are batched: the browser content is rebuilt once per turn of the event loop after the document changed.
/// Browser events on elements with headless listeners are dispatched to the headless node, and typing into inputs
/// updates the headless value.
#[derive(Clone)]
pub struct Mirror(Rc<MirrorInner>);

impl Debug for Mirror {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Mirror")
			.field("document", &self.0.document)
			.field("scheduled", &self.0.scheduled.get())
			.field("closures", &self.0.closures.borrow().len())
			.finish_non_exhaustive()
	}
}

impl Mirror {
	/// Mirrors `document` into the page's `<body>`.
	///
	/// # Errors
	///
	/// Iff there's no browser document or the first sync fails.
	pub fn into_body(document: &Document) -> Result<Self> {
		Self::new(document, browser_body()?.into())
	}

	/// Mirrors `document` into `target`, replacing its content right away.
	///
	/// # Errors
	///
	/// Iff the first sync fails.
	pub fn new(document: &Document, target: Element) -> Result<Self> {
		let mirror = Self(Rc::new(MirrorInner {
			document: document.clone(),
			target,
			scheduled: Cell::new(false),
			observer: Cell::new(None),
			closures: RefCell::new(Vec::new()),
		}));

		let weak = Rc::downgrade(&mirror.0);
		let id = document.on_mutation(move || schedule(&weak));
		mirror.0.observer.set(Some(id));

		mirror.sync()?;
		Ok(mirror)
	}

	/// Rebuilds the browser content now.
	///
	/// # Errors
	///
	/// Iff a browser call fails.
	pub fn sync(&self) -> Result<()> {
		let span = trace_span!("Mirror::sync");
		let _enter = span.enter();

		self.0.scheduled.set(false);
		let browser_document = self.0.target.owner_document().ok_or_else(|| Error::Browser("mirror target has no owner document".to_string()))?;

		// Dropping the old closures is fine once their elements are gone.
		let target: &web_sys::Node = self.0.target.as_ref();
		while let Some(child) = target.first_child() {
			target.remove_child(&child).map_err(|error| browser_error("removeChild", &error))?;
		}
		let old_closures = core::mem::take(&mut *self.0.closures.borrow_mut());
		trace!("Releasing {} event listener closure(s).", old_closures.len());
		drop(old_closures);

		for child in self.0.document.body().children() {
			if let Some(web_child) = self.materialize(&browser_document, &child)? {
				target.append_child(&web_child).map_err(|error| browser_error("appendChild", &error))?;
			}
		}
		Ok(())
	}

	fn materialize(&self, browser_document: &web_sys::Document, node: &Node) -> Result<Option<web_sys::Node>> {
		if let Some(text) = node.text_data() {
			return Ok(Some(browser_document.create_text_node(&text).into()));
		}
		let tag = match node.tag_name() {
			Some(tag) => tag,
			None => {
				if let Some(id) = node.placeholder_id() {
					warn!(placeholder = %id, "Unresolved placeholder. Not mirrored.");
				}
				return Ok(None);
			}
		};

		let element = browser_document.create_element(tag).map_err(|error| browser_error("createElement", &error))?;
		for (name, value) in node.attributes() {
			element.set_attribute(&name, &value).map_err(|error| browser_error("setAttribute", &error))?;
		}
		if let (Some(display), Some(html_element)) = (node.display(), element.dyn_ref::<HtmlElement>()) {
			html_element.style().set_property("display", &display).map_err(|error| browser_error("style.setProperty", &error))?;
		}
		if let Some(value) = node.value() {
			if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
				input.set_value(&value);
			} else if let Some(text_area) = element.dyn_ref::<HtmlTextAreaElement>() {
				text_area.set_value(&value);
			}
		}

		for kind in node.listened_event_kinds() {
			self.forward(&element, node, &kind)?;
		}
		if element.is_instance_of::<HtmlInputElement>() || element.is_instance_of::<HtmlTextAreaElement>() {
			self.track_value(&element, node)?;
		}

		let web_node: &web_sys::Node = element.as_ref();
		for child in node.children() {
			if let Some(web_child) = self.materialize(browser_document, &child)? {
				web_node.append_child(&web_child).map_err(|error| browser_error("appendChild", &error))?;
			}
		}
		Ok(Some(element.into()))
	}

	/// Dispatches browser events of `kind` on `element` to the headless `node`, which does its own bubbling.
	fn forward(&self, element: &Element, node: &Node, kind: &str) -> Result<()> {
		let node = node.clone();
		let kind_owned = kind.to_string();
		let closure = Closure::wrap(Box::new(move |web_event: web_sys::Event| {
			let span = trace_span!("forward", kind = %kind_owned);
			let _enter = span.enter();

			web_event.stop_propagation();
			sync_value(&web_event, &node);
			let event = dom::Event::new(kind_owned.clone());
			node.dispatch_event(&event);
			if event.default_prevented() {
				web_event.prevent_default();
			}
		}) as Box<dyn Fn(web_sys::Event)>);
		element
			.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())
			.map_err(|error| browser_error("addEventListener", &error))?;
		self.0.closures.borrow_mut().push(closure);
		Ok(())
	}

	fn track_value(&self, element: &Element, node: &Node) -> Result<()> {
		let node = node.clone();
		let closure = Closure::wrap(Box::new(move |web_event: web_sys::Event| sync_value(&web_event, &node)) as Box<dyn Fn(web_sys::Event)>);
		element
			.add_event_listener_with_callback("input", closure.as_ref().unchecked_ref())
			.map_err(|error| browser_error("addEventListener", &error))?;
		self.0.closures.borrow_mut().push(closure);
		Ok(())
	}
}

fn sync_value(web_event: &web_sys::Event, node: &Node) {
	let target = match web_event.target() {
		Some(target) => target,
		None => return,
	};
	if let Some(input) = target.dyn_ref::<HtmlInputElement>() {
		node.set_value(input.value());
	} else if let Some(text_area) = target.dyn_ref::<HtmlTextAreaElement>() {
		node.set_value(text_area.value());
	}
}

fn schedule(weak: &Weak<MirrorInner>) {
	let inner = match weak.upgrade() {
		Some(inner) => inner,
		None => return,
	};
	if inner.scheduled.replace(true) {
		return;
	}
	let mirror = Mirror(inner);
	wasm_bindgen_futures::spawn_local(async move {
		if let Err(error) = mirror.sync() {
			error!("Mirroring the document failed: {}", error);
		}
	});
}

/// [`History`] over `window.history`.
pub struct BrowserHistory {
	window: Window,
	history: web_sys::History,
	listeners: RefCell<Vec<(ListenerId, Closure<dyn Fn(web_sys::Event)>)>>,
	next_listener: Cell<u64>,
}

impl Debug for BrowserHistory {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("BrowserHistory").field("listeners", &self.listeners.borrow().len()).finish_non_exhaustive()
	}
}

impl BrowserHistory {
	/// # Errors
	///
	/// Iff there's no `window.history`.
	pub fn new() -> Result<Self> {
		let window = window()?;
		let history = window.history().map_err(|error| browser_error("window.history", &error))?;
		Ok(Self {
			window,
			history,
			listeners: RefCell::new(Vec::new()),
			next_listener: Cell::new(0),
		})
	}
}

fn current_pathname(window: &Window) -> String {
	match window.location().pathname() {
		Ok(pathname) => pathname,
		Err(error) => {
			error!("Could not read `location.pathname`: {:?}", error);
			"/".to_string()
		}
	}
}

impl History for BrowserHistory {
	fn pathname(&self) -> String {
		current_pathname(&self.window)
	}

	fn push_state(&self, pathname: &str) -> Result<()> {
		self.history
			.push_state_with_url(&JsValue::NULL, "", Some(pathname))
			.map_err(|error| Error::History(format!("pushState: {:?}", error)))
	}

	fn back(&self) -> Result<()> {
		self.history.back().map_err(|error| Error::History(format!("back: {:?}", error)))
	}

	fn forward(&self) -> Result<()> {
		self.history.forward().map_err(|error| Error::History(format!("forward: {:?}", error)))
	}

	fn on_pop_state(&self, listener: Box<dyn Fn(&str)>) -> ListenerId {
		let window = self.window.clone();
		let closure = Closure::wrap(Box::new(move |_: web_sys::Event| listener(&current_pathname(&window))) as Box<dyn Fn(web_sys::Event)>);
		if let Err(error) = self.window.add_event_listener_with_callback("popstate", closure.as_ref().unchecked_ref()) {
			error!("Could not listen for `popstate`: {:?}", error);
		}
		let id = ListenerId::from_raw(self.next_listener.get());
		self.next_listener.set(self.next_listener.get() + 1);
		self.listeners.borrow_mut().push((id, closure));
		id
	}

	fn off_pop_state(&self, id: ListenerId) {
		let mut listeners = self.listeners.borrow_mut();
		if let Some(position) = listeners.iter().position(|(registered, _)| *registered == id) {
			let (_, closure) = listeners.remove(position);
			if let Err(error) = self.window.remove_event_listener_with_callback("popstate", closure.as_ref().unchecked_ref()) {
				error!("Could not remove `popstate` listener: {:?}", error);
			}
		}
	}

	fn once_pop_state(&self, listener: Box<dyn FnOnce(&str)>) {
		let window = self.window.clone();
		// Frees itself when called.
		let callback = Closure::once_into_js(move |_: web_sys::Event| listener(&current_pathname(&window)));
		let mut options = AddEventListenerOptions::new();
		options.once(true);
		if let Err(error) = self
			.window
			.add_event_listener_with_callback_and_add_event_listener_options("popstate", callback.unchecked_ref(), &options)
		{
			error!("Could not listen for `popstate`: {:?}", error);
		}
	}
}

/// Spawns onto the browser's microtask queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasmSpawner;

impl LocalSpawn for WasmSpawner {
	fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
		wasm_bindgen_futures::spawn_local(future);
		Ok(())
	}
}

/// Loads the page body into a headless document, mirrors it back and wires up browser history.
///
/// The returned [`Mirror`] must be kept alive for as long as the page should follow the document.
///
/// # Errors
///
/// Iff a browser API is missing or fails.
pub fn browser_platform() -> Result<(Platform, Mirror)> {
	let document = load_document()?;
	let mirror = Mirror::into_body(&document)?;
	let platform = Platform {
		document,
		history: Rc::new(BrowserHistory::new()?),
		spawner: Rc::new(WasmSpawner),
	};
	Ok((platform, mirror))
}
