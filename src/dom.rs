//! A headless document model.
//!
//! Components render into [`Node`] trees that don't need a browser. A [`Document`] owns a `<body>` and
//! announces every mutation below it, which is what the browser mirror in `web` hooks into.

use crate::{block::BlockId, event_bus::EventBus, Error, ListenerId, Result};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter, Write as _},
	iter::Peekable,
	str::Chars,
};
use std::rc::{Rc, Weak};
use tracing::{error, trace};

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr"];

pub(crate) fn is_void_element(tag: &str) -> bool {
	VOID_ELEMENTS.contains(&tag)
}

/// A DOM event travelling from its target up through the target's ancestors.
pub struct Event {
	kind: String,
	target: RefCell<Option<Node>>,
	propagation_stopped: Cell<bool>,
	default_prevented: Cell<bool>,
}

impl Debug for Event {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event")
			.field("kind", &self.kind)
			.field("propagation_stopped", &self.propagation_stopped.get())
			.field("default_prevented", &self.default_prevented.get())
			.finish_non_exhaustive()
	}
}

impl Event {
	#[must_use]
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			target: RefCell::new(None),
			propagation_stopped: Cell::new(false),
			default_prevented: Cell::new(false),
		}
	}

	#[must_use]
	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// The node the event was dispatched on. `None` until dispatched.
	#[must_use]
	pub fn target(&self) -> Option<Node> {
		self.target.borrow().clone()
	}

	pub fn stop_propagation(&self) {
		self.propagation_stopped.set(true);
	}

	pub fn prevent_default(&self) {
		self.default_prevented.set(true);
	}

	#[must_use]
	pub fn default_prevented(&self) -> bool {
		self.default_prevented.get()
	}
}

type DomListener = Rc<dyn Fn(&Event)>;

struct ElementData {
	tag: String,
	attributes: RefCell<Vec<(String, String)>>,
	display: RefCell<Option<String>>,
	value: RefCell<Option<String>>,
	listeners: RefCell<Vec<(String, ListenerId, DomListener)>>,
	next_listener: Cell<u64>,
}

enum Kind {
	Element(ElementData),
	Text(RefCell<String>),
	/// Stands in for a child component's root node until the owner splices it in.
	Placeholder(BlockId),
	Fragment,
}

struct NodeData {
	kind: Kind,
	parent: RefCell<Weak<NodeData>>,
	children: RefCell<Vec<Node>>,
	/// Only set on a document's `<body>`.
	document: RefCell<Weak<DocumentData>>,
}

/// Shared handle to a node. Clones refer to the same node.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Node {}

impl Debug for Node {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &self.0.kind {
			Kind::Element(element) => write!(f, "<{}> ({} child node(s))", element.tag, self.0.children.borrow().len()),
			Kind::Text(text) => {
				if cfg!(feature = "dangerous-logging") {
					write!(f, "#text {:?}", text.borrow())
				} else {
					write!(f, "#text ({} bytes)", text.borrow().len())
				}
			}
			Kind::Placeholder(id) => write!(f, "#placeholder {}", id),
			Kind::Fragment => write!(f, "#fragment ({} child node(s))", self.0.children.borrow().len()),
		}
	}
}

impl Node {
	fn from_kind(kind: Kind) -> Self {
		Self(Rc::new(NodeData {
			kind,
			parent: RefCell::new(Weak::new()),
			children: RefCell::new(Vec::new()),
			document: RefCell::new(Weak::new()),
		}))
	}

	/// Creates a detached element. Tag names are stored in lower case.
	#[must_use]
	pub fn element(tag: &str) -> Self {
		Self::from_kind(Kind::Element(ElementData {
			tag: tag.to_ascii_lowercase(),
			attributes: RefCell::new(Vec::new()),
			display: RefCell::new(None),
			value: RefCell::new(None),
			listeners: RefCell::new(Vec::new()),
			next_listener: Cell::new(0),
		}))
	}

	#[must_use]
	pub fn text(text: impl Into<String>) -> Self {
		Self::from_kind(Kind::Text(RefCell::new(text.into())))
	}

	#[must_use]
	pub fn placeholder(id: BlockId) -> Self {
		Self::from_kind(Kind::Placeholder(id))
	}

	/// A fragment's children move into the parent when the fragment is appended.
	#[must_use]
	pub fn fragment() -> Self {
		Self::from_kind(Kind::Fragment)
	}

	fn element_data(&self) -> Option<&ElementData> {
		match &self.0.kind {
			Kind::Element(element) => Some(element),
			_ => None,
		}
	}

	#[must_use]
	pub fn is_element(&self) -> bool {
		self.element_data().is_some()
	}

	#[must_use]
	pub fn tag_name(&self) -> Option<&str> {
		self.element_data().map(|element| element.tag.as_str())
	}

	#[must_use]
	pub fn placeholder_id(&self) -> Option<BlockId> {
		match self.0.kind {
			Kind::Placeholder(id) => Some(id),
			_ => None,
		}
	}

	/// The data of a text node.
	#[must_use]
	pub fn text_data(&self) -> Option<String> {
		match &self.0.kind {
			Kind::Text(text) => Some(text.borrow().clone()),
			_ => None,
		}
	}

	pub fn set_text_data(&self, data: impl Into<String>) {
		if let Kind::Text(text) = &self.0.kind {
			*text.borrow_mut() = data.into();
			self.notify_mutation();
		}
	}

	#[must_use]
	pub fn parent(&self) -> Option<Node> {
		self.0.parent.borrow().upgrade().map(Node)
	}

	#[must_use]
	pub fn children(&self) -> Vec<Node> {
		self.0.children.borrow().clone()
	}

	#[must_use]
	pub fn element_children(&self) -> Vec<Node> {
		self.0.children.borrow().iter().filter(|child| child.is_element()).cloned().collect()
	}

	#[must_use]
	pub fn first_element_child(&self) -> Option<Node> {
		self.0.children.borrow().iter().find(|child| child.is_element()).cloned()
	}

	fn is_inclusive_ancestor_of(&self, other: &Node) -> bool {
		let mut current = Some(other.clone());
		while let Some(node) = current {
			if node == *self {
				return true;
			}
			current = node.parent();
		}
		false
	}

	fn detach(&self) -> Option<Node> {
		let parent = self.parent()?;
		parent.0.children.borrow_mut().retain(|child| child != self);
		*self.0.parent.borrow_mut() = Weak::new();
		Some(parent)
	}

	/// Appends `child` as last child, moving it out of its current parent first.
	///
	/// # Errors
	///
	/// Iff `self` can't have children or `child` is an inclusive ancestor of `self`.
	pub fn append_child(&self, child: &Node) -> Result<()> {
		if matches!(self.0.kind, Kind::Text(_) | Kind::Placeholder(_)) {
			return Err(Error::Hierarchy(format!("{:?} can't have children", self)));
		}
		if child.is_inclusive_ancestor_of(self) {
			return Err(Error::Hierarchy("can't append a node into its own subtree".to_string()));
		}

		if let Kind::Fragment = child.0.kind {
			for grandchild in child.children() {
				self.append_child(&grandchild)?;
			}
			return Ok(());
		}

		if let Some(old_parent) = child.detach() {
			old_parent.notify_mutation();
		}
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		self.0.children.borrow_mut().push(child.clone());
		self.notify_mutation();
		Ok(())
	}

	/// Puts `replacement` where `self` is and detaches `self`.
	///
	/// Returns `false` (and changes nothing) if `self` has no parent.
	pub fn replace_with(&self, replacement: &Node) -> bool {
		if replacement == self {
			return self.parent().is_some();
		}
		let parent = match self.parent() {
			Some(parent) => parent,
			None => return false,
		};

		if let Some(old_parent) = replacement.detach() {
			if old_parent != parent {
				old_parent.notify_mutation();
			}
		}

		let incoming = match replacement.0.kind {
			Kind::Fragment => replacement.children(),
			_ => vec![replacement.clone()],
		};
		if let Kind::Fragment = replacement.0.kind {
			replacement.0.children.borrow_mut().clear();
		}

		{
			let mut siblings = parent.0.children.borrow_mut();
			let index = match siblings.iter().position(|sibling| sibling == self) {
				Some(index) => index,
				None => {
					error!("Node is missing from its parent's child list.");
					return false;
				}
			};
			for node in &incoming {
				*node.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
			}
			siblings.splice(index..=index, incoming);
		}
		*self.0.parent.borrow_mut() = Weak::new();
		parent.notify_mutation();
		true
	}

	pub fn remove(&self) {
		if let Some(parent) = self.detach() {
			parent.notify_mutation();
		}
	}

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<String> {
		let element = self.element_data()?;
		let attributes = element.attributes.borrow();
		attributes.iter().find(|(n, _)| n == name).map(|(_, value)| value.clone())
	}

	#[must_use]
	pub fn attributes(&self) -> Vec<(String, String)> {
		self.element_data().map_or_else(Vec::new, |element| element.attributes.borrow().clone())
	}

	pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
		if let Some(element) = self.element_data() {
			let value = value.into();
			{
				let mut attributes = element.attributes.borrow_mut();
				match attributes.iter_mut().find(|(n, _)| n == name) {
					Some((_, existing)) => *existing = value,
					None => attributes.push((name.to_ascii_lowercase(), value)),
				}
			}
			self.notify_mutation();
		}
	}

	pub fn remove_attribute(&self, name: &str) {
		if let Some(element) = self.element_data() {
			element.attributes.borrow_mut().retain(|(n, _)| n != name);
			self.notify_mutation();
		}
	}

	#[must_use]
	pub fn id(&self) -> Option<String> {
		self.attribute("id")
	}

	#[must_use]
	pub fn has_class(&self, class: &str) -> bool {
		self.attribute("class").map_or(false, |classes| classes.split_ascii_whitespace().any(|c| c == class))
	}

	/// The inline `display` style, if one is set.
	#[must_use]
	pub fn display(&self) -> Option<String> {
		self.element_data().and_then(|element| element.display.borrow().clone())
	}

	pub fn set_display(&self, display: Option<&str>) {
		if let Some(element) = self.element_data() {
			*element.display.borrow_mut() = display.map(ToString::to_string);
			self.notify_mutation();
		}
	}

	/// The current value of a form control: what was typed or set, falling back to the `value` attribute.
	#[must_use]
	pub fn value(&self) -> Option<String> {
		let element = self.element_data()?;
		let value = element.value.borrow().clone();
		value.or_else(|| self.attribute("value"))
	}

	/// Sets the current value without touching the `value` attribute.
	///
	/// This isn't announced as a mutation, the same way typing into a browser input changes no markup.
	pub fn set_value(&self, value: impl Into<String>) {
		if let Some(element) = self.element_data() {
			*element.value.borrow_mut() = Some(value.into());
		}
	}

	#[must_use]
	pub fn text_content(&self) -> String {
		match &self.0.kind {
			Kind::Text(text) => text.borrow().clone(),
			Kind::Placeholder(_) => String::new(),
			Kind::Element(_) | Kind::Fragment => self.0.children.borrow().iter().map(Node::text_content).collect(),
		}
	}

	/// Attaches a listener for `kind` events dispatched on this node or bubbling up through it.
	///
	/// Non-element nodes don't receive listeners; the returned id is then inert.
	pub fn add_event_listener(&self, kind: impl Into<String>, listener: impl Fn(&Event) + 'static) -> ListenerId {
		match self.element_data() {
			Some(element) => {
				let id = ListenerId::from_raw(element.next_listener.get());
				element.next_listener.set(element.next_listener.get() + 1);
				element.listeners.borrow_mut().push((kind.into(), id, Rc::new(listener)));
				id
			}
			None => ListenerId::from_raw(u64::MAX),
		}
	}

	/// Returns whether a listener was removed.
	pub fn remove_event_listener(&self, id: ListenerId) -> bool {
		match self.element_data() {
			Some(element) => {
				let mut listeners = element.listeners.borrow_mut();
				let before = listeners.len();
				listeners.retain(|(_, registered, _)| *registered != id);
				listeners.len() != before
			}
			None => false,
		}
	}

	#[must_use]
	pub fn listener_count(&self, kind: &str) -> usize {
		self.element_data().map_or(0, |element| element.listeners.borrow().iter().filter(|(k, _, _)| k == kind).count())
	}

	/// Distinct event kinds this element listens for, in first-registration order.
	#[must_use]
	pub fn listened_event_kinds(&self) -> Vec<String> {
		let mut kinds = Vec::new();
		if let Some(element) = self.element_data() {
			for (kind, _, _) in element.listeners.borrow().iter() {
				if !kinds.contains(kind) {
					kinds.push(kind.clone());
				}
			}
		}
		kinds
	}

	/// Runs the event's listeners on this node, then on each ancestor until propagation is stopped.
	pub fn dispatch_event(&self, event: &Event) {
		*event.target.borrow_mut() = Some(self.clone());
		let mut current = Some(self.clone());
		while let Some(node) = current {
			if let Some(element) = node.element_data() {
				let listeners: Vec<DomListener> = element
					.listeners
					.borrow()
					.iter()
					.filter(|(kind, _, _)| *kind == event.kind)
					.map(|(_, _, listener)| Rc::clone(listener))
					.collect();
				for listener in listeners {
					listener(event);
				}
			}
			if event.propagation_stopped.get() {
				break;
			}
			current = node.parent();
		}
	}

	pub fn click(&self) {
		self.dispatch_event(&Event::new("click"));
	}

	/// Whether this node is (inside) the body of a live [`Document`].
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.owner_document().is_some()
	}

	#[must_use]
	pub fn owner_document(&self) -> Option<Document> {
		let mut root = self.clone();
		while let Some(parent) = root.parent() {
			root = parent;
		}
		let document = root.0.document.borrow().upgrade();
		document.map(Document)
	}

	fn notify_mutation(&self) {
		if let Some(document) = self.owner_document() {
			document.notify_mutation();
		}
	}

	fn descendants(&self, out: &mut Vec<Node>) {
		for child in self.0.children.borrow().iter() {
			out.push(child.clone());
			child.descendants(out);
		}
	}

	/// Finds the first descendant (in tree order) matching `selector`.
	///
	/// Supported selectors are compound selectors of `tag`, `#id`, `.class`, `[attribute]` and `[attribute="value"]`,
	/// combined with the descendant combinator (whitespace).
	///
	/// # Errors
	///
	/// Iff `selector` can't be parsed.
	pub fn query_selector(&self, selector: &str) -> Result<Option<Node>> {
		let selector = Selector::parse(selector)?;
		let mut descendants = Vec::new();
		self.descendants(&mut descendants);
		Ok(descendants.into_iter().find(|node| selector.matches(node)))
	}

	/// # Errors
	///
	/// Iff `selector` can't be parsed.
	pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Node>> {
		let selector = Selector::parse(selector)?;
		let mut descendants = Vec::new();
		self.descendants(&mut descendants);
		Ok(descendants.into_iter().filter(|node| selector.matches(node)).collect())
	}

	/// # Errors
	///
	/// Iff `selector` can't be parsed.
	pub fn matches(&self, selector: &str) -> Result<bool> {
		Ok(Selector::parse(selector)?.matches(self))
	}

	#[must_use]
	pub fn find_placeholder(&self, id: BlockId) -> Option<Node> {
		let mut descendants = Vec::new();
		self.descendants(&mut descendants);
		descendants.into_iter().find(|node| node.placeholder_id() == Some(id))
	}

	#[must_use]
	pub fn outer_html(&self) -> String {
		let mut html = String::new();
		self.write_html(&mut html);
		html
	}

	#[must_use]
	pub fn inner_html(&self) -> String {
		let mut html = String::new();
		for child in self.0.children.borrow().iter() {
			child.write_html(&mut html);
		}
		html
	}

	fn write_html(&self, html: &mut String) {
		match &self.0.kind {
			Kind::Element(element) => {
				html.push('<');
				html.push_str(&element.tag);
				let display = element.display.borrow();
				let mut wrote_style = false;
				for (name, value) in element.attributes.borrow().iter() {
					let value = match (name.as_str(), display.as_deref()) {
						("style", Some(display)) => {
							wrote_style = true;
							format!("{}; display: {}", value.trim_end_matches(|c: char| c == ';' || c.is_whitespace()), display)
						}
						_ => value.clone(),
					};
					let _ = write!(html, " {}=\"{}\"", name, escape(&value, true));
				}
				if let (false, Some(display)) = (wrote_style, display.as_deref()) {
					let _ = write!(html, " style=\"display: {}\"", escape(display, true));
				}
				html.push('>');
				if is_void_element(&element.tag) {
					return;
				}
				for child in self.0.children.borrow().iter() {
					child.write_html(html);
				}
				let _ = write!(html, "</{}>", element.tag);
			}
			Kind::Text(text) => html.push_str(&escape(&text.borrow(), false)),
			Kind::Placeholder(id) => {
				let _ = write!(html, "<!--placeholder:{}-->", id);
			}
			Kind::Fragment => {
				for child in self.0.children.borrow().iter() {
					child.write_html(html);
				}
			}
		}
	}
}

fn escape(text: &str, attribute: bool) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' if attribute => escaped.push_str("&quot;"),
			c => escaped.push(c),
		}
	}
	escaped
}

#[derive(Debug, Default)]
struct Compound {
	tag: Option<String>,
	id: Option<String>,
	classes: Vec<String>,
	attributes: Vec<(String, Option<String>)>,
}

impl Compound {
	fn matches(&self, node: &Node) -> bool {
		let tag = match node.tag_name() {
			Some(tag) => tag,
			None => return false,
		};
		self.tag.as_deref().map_or(true, |expected| expected == "*" || expected == tag)
			&& self.id.as_ref().map_or(true, |id| node.id().as_ref() == Some(id))
			&& self.classes.iter().all(|class| node.has_class(class))
			&& self.attributes.iter().all(|(name, value)| match (node.attribute(name), value) {
				(Some(_), None) => true,
				(Some(actual), Some(expected)) => actual == *expected,
				(None, _) => false,
			})
	}
}

fn take_ident(chars: &mut Peekable<Chars<'_>>) -> String {
	let mut name = String::new();
	while let Some(&c) = chars.peek() {
		if c.is_alphanumeric() || c == '-' || c == '_' {
			name.push(c);
			chars.next();
		} else {
			break;
		}
	}
	name
}

#[derive(Debug)]
struct Selector(Vec<Compound>);

impl Selector {
	fn parse(source: &str) -> Result<Self> {
		let invalid = |message: &str| Error::Selector(format!("{} in {:?}", message, source));

		let mut compounds = Vec::new();
		let mut current = Compound::default();
		let mut started = false;
		let mut chars = source.trim().chars().peekable();

		while let Some(c) = chars.next() {
			match c {
				c if c.is_whitespace() => {
					if started {
						compounds.push(core::mem::take(&mut current));
						started = false;
					}
				}
				'#' => {
					let name = take_ident(&mut chars);
					if name.is_empty() {
						return Err(invalid("empty id"));
					}
					current.id = Some(name);
					started = true;
				}
				'.' => {
					let name = take_ident(&mut chars);
					if name.is_empty() {
						return Err(invalid("empty class"));
					}
					current.classes.push(name);
					started = true;
				}
				'[' => {
					let name = take_ident(&mut chars);
					if name.is_empty() {
						return Err(invalid("empty attribute name"));
					}
					let value = match chars.next() {
						Some(']') => None,
						Some('=') => {
							let value = match chars.peek() {
								Some(&quote) if quote == '"' || quote == '\'' => {
									chars.next();
									let mut value = String::new();
									loop {
										match chars.next() {
											Some(c) if c == quote => break,
											Some(c) => value.push(c),
											None => return Err(invalid("unterminated attribute value")),
										}
									}
									value
								}
								_ => take_ident(&mut chars),
							};
							if chars.next() != Some(']') {
								return Err(invalid("expected `]`"));
							}
							Some(value)
						}
						_ => return Err(invalid("expected `]` or `=`")),
					};
					current.attributes.push((name.to_ascii_lowercase(), value));
					started = true;
				}
				'*' => {
					current.tag = Some("*".to_string());
					started = true;
				}
				c if c.is_alphanumeric() => {
					let mut name = c.to_string();
					name.push_str(&take_ident(&mut chars));
					current.tag = Some(name.to_ascii_lowercase());
					started = true;
				}
				other => return Err(invalid(&format!("unsupported character {:?}", other))),
			}
		}
		if started {
			compounds.push(current);
		}
		if compounds.is_empty() {
			return Err(invalid("empty selector"));
		}
		Ok(Self(compounds))
	}

	fn matches(&self, node: &Node) -> bool {
		let (last, ancestors) = match self.0.split_last() {
			Some(split) => split,
			None => return false,
		};
		if !last.matches(node) {
			return false;
		}
		let mut remaining = ancestors.iter().rev().peekable();
		let mut current = node.parent();
		while let Some(compound) = remaining.peek() {
			match current {
				Some(ancestor) => {
					if compound.matches(&ancestor) {
						remaining.next();
					}
					current = ancestor.parent();
				}
				None => return false,
			}
		}
		true
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentEvent {
	/// Something below the body changed: structure, attributes, inline display or text.
	Mutated,
}

struct DocumentData {
	body: Node,
	events: EventBus<DocumentEvent, ()>,
}

/// A live document: nodes below its body are "connected".
#[derive(Clone)]
pub struct Document(Rc<DocumentData>);

impl Debug for Document {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Document").field("body", &self.0.body).finish()
	}
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl Document {
	#[must_use]
	pub fn new() -> Self {
		let body = Node::element("body");
		let data = Rc::new(DocumentData { body, events: EventBus::new() });
		*data.body.0.document.borrow_mut() = Rc::downgrade(&data);
		Self(data)
	}

	/// Creates a document whose body contains the given static markup.
	///
	/// # Errors
	///
	/// Iff `body_markup` isn't well-formed.
	pub fn from_html(body_markup: &str) -> Result<Self> {
		let document = Self::new();
		let fragment = crate::markup::parse_html(body_markup)?;
		document.body().append_child(&fragment)?;
		Ok(document)
	}

	#[must_use]
	pub fn body(&self) -> Node {
		self.0.body.clone()
	}

	/// Like [`Node::query_selector`], but the body itself is a candidate too.
	///
	/// # Errors
	///
	/// Iff `selector` can't be parsed.
	pub fn query_selector(&self, selector: &str) -> Result<Option<Node>> {
		if self.0.body.matches(selector)? {
			return Ok(Some(self.body()));
		}
		self.0.body.query_selector(selector)
	}

	pub fn on_mutation(&self, observer: impl Fn() + 'static) -> ListenerId {
		self.0.events.on(DocumentEvent::Mutated, move |()| {
			observer();
			Ok(())
		})
	}

	pub fn off_mutation(&self, id: ListenerId) {
		self.0.events.off(&DocumentEvent::Mutated, id);
	}

	fn notify_mutation(&self) {
		trace!("Document mutated.");
		if let Err(error) = self.0.events.emit(&DocumentEvent::Mutated, &()) {
			error!("Mutation observer failed: {}", error);
		}
	}
}
