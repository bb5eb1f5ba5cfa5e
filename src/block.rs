//! The component runtime.
//!
//! A [`Block`] owns exactly one root node, its [`Props`] and its named child blocks. Everything it does is driven
//! through a private [`EventBus`] carrying four lifecycle signals: init, render, mounted and updated.
//!
//! Rendering never patches: each render compiles the component's template into a fresh detached tree, splices the
//! children's *existing* root nodes into their placeholders and then swaps the new root in for the old one.

use crate::{
	dom::Node,
	event_bus::EventBus,
	markup::{self, value_text, Binding, Scope, Segment, Template},
	props::{Prop, PropBag, Props},
	Error, ListenerId, Result,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Display, Formatter},
	mem,
};
use rand::{distributions::Alphanumeric, Rng};
use std::rc::{Rc, Weak};
use tracing::{instrument, trace, trace_span, warn};

/// Opaque identity of a block instance, stable for its lifetime.
///
/// It's what ties a placeholder in a parent's compiled markup to the child whose root node replaces it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId([u8; 8]);

impl BlockId {
	fn random() -> Self {
		let mut rng = rand::thread_rng();
		let mut id = [0; 8];
		for byte in &mut id {
			*byte = rng.sample(Alphanumeric);
		}
		Self(id)
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		// Always ASCII alphanumerics.
		core::str::from_utf8(&self.0).unwrap_or_default()
	}
}

impl Display for BlockId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Debug for BlockId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "BlockId({})", self.as_str())
	}
}

/// The extension points of a component variant.
///
/// Only [`render`](`Component::render`) is required. Implementors that keep state do so through interior
/// mutability, since the runtime only ever hands out shared references.
pub trait Component: 'static {
	/// Returns the component's template source (see [`Template`]).
	///
	/// Child blocks and components held in props are available under their keys and are placed with `{{{key}}}`.
	fn render(&self, props: &Props) -> String;

	/// Runs once, before the first render. The place to [`insert_child`](`Block::insert_child`).
	///
	/// # Errors
	///
	/// Aborts construction of the block.
	fn init(&self, _block: &Block) -> Result<()> {
		Ok(())
	}

	/// Runs once, when the block is first attached below a live document, before its children are notified.
	///
	/// # Errors
	///
	/// Stops mount notification and is returned to whoever dispatched it.
	fn component_did_mount(&self, _block: &Block) -> Result<()> {
		Ok(())
	}

	/// Decides whether a props write re-renders the block.
	fn component_did_update(&self, _old_props: &Props, _new_props: &Props) -> bool {
		true
	}

	/// Runs first in [`Block::dispose`].
	///
	/// # Errors
	///
	/// Aborts disposal.
	fn component_will_unmount(&self, _block: &Block) -> Result<()> {
		Ok(())
	}

	/// The root element created at init, and the wrapper of templates that have no root element of their own.
	fn tag_name(&self) -> &str {
		"div"
	}

	/// The `display` value [`Block::show`] sets.
	fn display(&self) -> &str {
		"flex"
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lifecycle {
	Init,
	FlowRender,
	FlowComponentDidMount,
	FlowComponentDidUpdate,
}

enum Signal {
	Plain,
	Update { old: Props, new: Props },
}

struct BlockInner {
	id: BlockId,
	type_name: &'static str,
	component: Rc<dyn Component>,
	element: RefCell<Option<Node>>,
	props: RefCell<Props>,
	children: RefCell<Vec<(String, Block)>>,
	bus: EventBus<Lifecycle, Signal>,
	mounted: Cell<bool>,
	disposed: Cell<bool>,
	attached_listeners: RefCell<Vec<ListenerId>>,
	disposers: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Shared handle to a component instance. Clones refer to the same instance.
#[derive(Clone)]
pub struct Block(Rc<BlockInner>);

impl PartialEq for Block {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Block {}

impl Debug for Block {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Block")
			.field("id", &self.0.id)
			.field("component", &self.0.type_name)
			.field("mounted", &self.0.mounted.get())
			.finish_non_exhaustive()
	}
}

/// A non-owning [`Block`] handle.
#[derive(Clone)]
pub struct WeakBlock(Weak<BlockInner>);

impl Debug for WeakBlock {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str("WeakBlock")
	}
}

impl WeakBlock {
	#[must_use]
	pub fn upgrade(&self) -> Option<Block> {
		self.0.upgrade().map(Block)
	}
}

fn on_lifecycle(bus: &EventBus<Lifecycle, Signal>, weak: &Weak<BlockInner>, event: Lifecycle, handler: fn(&Block, &Signal) -> Result<()>) {
	let weak = weak.clone();
	bus.on(event, move |signal| match weak.upgrade() {
		Some(inner) => handler(&Block(inner), signal),
		None => Ok(()),
	});
}

impl Block {
	/// Creates a component instance and runs its init flow, which includes the first render.
	///
	/// Blocks among `props` become named children; everything else becomes props. This split happens only here.
	///
	/// # Errors
	///
	/// Iff the [`init`](`Component::init`) hook fails or the first render does.
	pub fn new<C: Component>(component: C, props: PropBag) -> Result<Self> {
		Self::from_rc(Rc::new(component), core::any::type_name::<C>(), props)
	}

	fn from_rc(component: Rc<dyn Component>, type_name: &'static str, props: PropBag) -> Result<Self> {
		let (props, children) = props.partition();
		let inner = Rc::new_cyclic(|weak: &Weak<BlockInner>| {
			let bus = EventBus::new();
			on_lifecycle(&bus, weak, Lifecycle::Init, |block, _| block.init_flow());
			on_lifecycle(&bus, weak, Lifecycle::FlowRender, |block, _| block.render_flow());
			on_lifecycle(&bus, weak, Lifecycle::FlowComponentDidMount, |block, _| block.component_did_mount_flow());
			on_lifecycle(&bus, weak, Lifecycle::FlowComponentDidUpdate, |block, signal| match signal {
				Signal::Update { old, new } => block.component_did_update_flow(old, new),
				Signal::Plain => Ok(()),
			});
			BlockInner {
				id: BlockId::random(),
				type_name,
				component,
				element: RefCell::new(None),
				props: RefCell::new(props),
				children: RefCell::new(children),
				bus,
				mounted: Cell::new(false),
				disposed: Cell::new(false),
				attached_listeners: RefCell::new(Vec::new()),
				disposers: RefCell::new(Vec::new()),
			}
		});
		let block = Self(inner);

		let span = trace_span!("Block::new", id = %block.0.id, component = block.0.type_name);
		let _enter = span.enter();
		block.0.bus.emit(&Lifecycle::Init, &Signal::Plain)?;
		Ok(block)
	}

	#[must_use]
	pub fn id(&self) -> BlockId {
		self.0.id
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakBlock {
		WeakBlock(Rc::downgrade(&self.0))
	}

	#[must_use]
	pub fn type_name(&self) -> &'static str {
		self.0.type_name
	}

	/// The current root node. `None` only before the first render.
	#[must_use]
	pub fn element(&self) -> Option<Node> {
		self.0.element.borrow().clone()
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.0.mounted.get()
	}

	/// A snapshot of the current props.
	#[must_use]
	pub fn props(&self) -> Props {
		self.0.props.borrow().clone()
	}

	#[must_use]
	pub fn children(&self) -> Vec<(String, Block)> {
		self.0.children.borrow().clone()
	}

	#[must_use]
	pub fn child(&self, name: &str) -> Option<Block> {
		self.0.children.borrow().iter().find(|(key, _)| key == name).map(|(_, child)| child.clone())
	}

	/// Adds or replaces a named child.
	///
	/// This doesn't render. Call it from [`Component::init`], or follow up with a props write.
	pub fn insert_child(&self, name: impl Into<String>, child: Block) {
		let name = name.into();
		let mut children = self.0.children.borrow_mut();
		match children.iter_mut().find(|(key, _)| *key == name) {
			Some((_, existing)) => *existing = child,
			None => children.push((name, child)),
		}
	}

	fn init_flow(&self) -> Result<()> {
		let span = trace_span!("init", id = %self.0.id);
		let _enter = span.enter();

		*self.0.element.borrow_mut() = Some(Node::element(self.0.component.tag_name()));
		self.0.component.init(self)?;
		self.0.bus.emit(&Lifecycle::FlowRender, &Signal::Plain)
	}

	/// Every component this one splices in: named children first, then blocks held in props.
	fn spliced_blocks(&self) -> Vec<Block> {
		let mut blocks: Vec<Block> = self.0.children.borrow().iter().map(|(_, child)| child.clone()).collect();
		blocks.extend(self.0.props.borrow().blocks());
		blocks
	}

	fn render_flow(&self) -> Result<()> {
		let span = trace_span!("render", id = %self.0.id, component = self.0.type_name);
		let _enter = span.enter();

		let props = self.props();
		let children = self.children();

		let source = self.0.component.render(&props);
		if cfg!(feature = "dangerous-logging") {
			trace!(source = %source, "Compiling template.");
		}
		let template = Template::compile(&source)?;

		let mut scope = Scope::new();
		for (key, prop) in props.iter() {
			match prop {
				Prop::Value(value) => scope.bind(key, Binding::Value(value)),
				Prop::Block(block) => scope.bind(key, Binding::Segments(vec![Segment::Slot(block.id())])),
				Prop::List(items) => scope.bind(key, Binding::Segments(flatten(items))),
				Prop::Events(_) | Prop::Callback(_) => (),
			}
		}
		for (key, child) in &children {
			scope.bind(key, Binding::Segments(vec![Segment::Slot(child.id())]));
		}

		let segments = template.render(&scope);
		let fragment = markup::parse(&segments)?;
		let root = match fragment.first_element_child() {
			Some(root) => root,
			None => {
				let wrapper = Node::element(self.0.component.tag_name());
				wrapper.append_child(&fragment)?;
				wrapper
			}
		};

		for block in self.spliced_blocks() {
			let placeholder = match root.find_placeholder(block.id()) {
				Some(placeholder) => placeholder,
				None => continue,
			};
			match block.element() {
				Some(content) => {
					placeholder.replace_with(&content);
				}
				None => warn!(child = %block.id(), "Child has no root node yet. Leaving its placeholder in place."),
			}
		}

		let old_root = self.0.element.replace(Some(root.clone()));
		if let Some(old_root) = old_root {
			root.set_display(old_root.display().as_deref());
			for id in mem::take(&mut *self.0.attached_listeners.borrow_mut()) {
				old_root.remove_event_listener(id);
			}
			if old_root.replace_with(&root) {
				trace!("Swapped the new root node in.");
			}
		}
		self.attach_events(&root, &props);

		if self.0.mounted.get() {
			for block in self.spliced_blocks() {
				block.dispatch_component_did_mount()?;
			}
		}
		Ok(())
	}

	fn attach_events(&self, root: &Node, props: &Props) {
		let mut attached = self.0.attached_listeners.borrow_mut();
		for (kind, handler) in props.events() {
			let weak = Rc::downgrade(&self.0);
			attached.push(root.add_event_listener(kind, move |event| {
				if let Some(inner) = weak.upgrade() {
					handler(&Block(inner), event);
				}
			}));
		}
	}

	/// Notifies the block (and, recursively, its children) that it is attached below a live document.
	///
	/// Only the first notification reaches [`Component::component_did_mount`].
	///
	/// # Errors
	///
	/// Iff a `component_did_mount` hook fails.
	pub fn dispatch_component_did_mount(&self) -> Result<()> {
		self.0.bus.emit(&Lifecycle::FlowComponentDidMount, &Signal::Plain)
	}

	fn component_did_mount_flow(&self) -> Result<()> {
		if self.0.mounted.replace(true) {
			return Ok(());
		}
		let span = trace_span!("component_did_mount", id = %self.0.id);
		let _enter = span.enter();

		self.0.component.component_did_mount(self)?;
		for block in self.spliced_blocks() {
			block.dispatch_component_did_mount()?;
		}
		Ok(())
	}

	fn component_did_update_flow(&self, old: &Props, new: &Props) -> Result<()> {
		if self.0.component.component_did_update(old, new) {
			self.0.bus.emit(&Lifecycle::FlowRender, &Signal::Plain)
		} else {
			trace!(id = %self.0.id, "Update declined a re-render.");
			Ok(())
		}
	}

	/// Merges `props` into the current props and synchronously runs the update flow once.
	///
	/// Keys are never removed by this. Blocks passed here are stored as props, not as named children.
	///
	/// # Errors
	///
	/// Iff the resulting re-render fails.
	#[instrument(skip(self, props), fields(id = %self.0.id, keys = props.len()))]
	pub fn set_props(&self, props: PropBag) -> Result<()> {
		if props.is_empty() {
			return Ok(());
		}
		let old = self.props();
		self.0.props.borrow_mut().merge(props);
		let new = self.props();
		self.0.bus.emit(&Lifecycle::FlowComponentDidUpdate, &Signal::Update { old, new })
	}

	/// # Errors
	///
	/// See [`set_props`](`Block::set_props`).
	pub fn set_prop(&self, key: impl Into<String>, prop: impl Into<Prop>) -> Result<()> {
		self.set_props(PropBag::new().with(key, prop.into()))
	}

	/// Props can't be deleted.
	///
	/// # Errors
	///
	/// Always.
	pub fn delete_prop(&self, key: &str) -> Result<()> {
		Err(Error::PropDeletion(key.to_string()))
	}

	/// Returns the root node, rendering first if there is none yet.
	///
	/// # Errors
	///
	/// Iff that render fails.
	pub fn get_content(&self) -> Result<Node> {
		if let Some(element) = self.element() {
			return Ok(element);
		}
		self.0.bus.emit(&Lifecycle::FlowRender, &Signal::Plain)?;
		self.element().ok_or_else(|| Error::ElementNotFound(format!("root node of {}", self.0.id)))
	}

	/// # Errors
	///
	/// See [`get_content`](`Block::get_content`).
	pub fn show(&self) -> Result<()> {
		self.get_content()?.set_display(Some(self.0.component.display()));
		Ok(())
	}

	/// # Errors
	///
	/// See [`get_content`](`Block::get_content`).
	pub fn hide(&self) -> Result<()> {
		self.get_content()?.set_display(Some("none"));
		Ok(())
	}

	/// The current value of the form control matching `selector`, which may be the root node itself.
	///
	/// # Errors
	///
	/// [`Error::ElementNotFound`] iff there's no root node or nothing matches, [`Error::Selector`] iff `selector` is
	/// invalid.
	pub fn input_value(&self, selector: &str) -> Result<String> {
		let root = self.element().ok_or_else(|| Error::ElementNotFound(format!("{} (component {} has no root node)", selector, self.0.id)))?;
		let input = if root.matches(selector)? { Some(root) } else { root.query_selector(selector)? };
		let input = input.ok_or_else(|| Error::ElementNotFound(selector.to_string()))?;
		Ok(input.value().unwrap_or_default())
	}

	/// Registers cleanup to run once on [`dispose`](`Block::dispose`).
	pub fn on_dispose(&self, disposer: impl FnOnce() + 'static) {
		self.0.disposers.borrow_mut().push(Box::new(disposer));
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.0.disposed.get()
	}

	/// Permanently tears the block down: runs [`Component::component_will_unmount`], removes the DOM listeners it
	/// attached, runs [`on_dispose`](`Block::on_dispose`) cleanups, disposes its children and detaches its root node.
	///
	/// Disposing twice is a no-op.
	///
	/// # Errors
	///
	/// Iff an unmount hook fails. If this block's own hook fails, nothing was torn down and disposal can be retried.
	#[instrument(skip(self), fields(id = %self.0.id))]
	pub fn dispose(&self) -> Result<()> {
		if self.0.disposed.get() {
			return Ok(());
		}
		self.0.component.component_will_unmount(self)?;
		self.0.disposed.set(true);

		let element = self.element();
		let listeners = mem::take(&mut *self.0.attached_listeners.borrow_mut());
		if let Some(element) = &element {
			for id in listeners {
				element.remove_event_listener(id);
			}
		}

		let disposers = mem::take(&mut *self.0.disposers.borrow_mut());
		trace!("Running {} disposer(s).", disposers.len());
		for disposer in disposers {
			disposer();
		}

		for block in self.spliced_blocks() {
			block.dispose()?;
		}

		if let Some(element) = element {
			element.remove();
		}
		self.0.mounted.set(false);
		Ok(())
	}
}

/// Flattens a mixed list prop. Components become individual slots, everything else is concatenated as text.
fn flatten(items: &[Prop]) -> Vec<Segment> {
	let mut segments = Vec::new();
	for item in items {
		match item {
			Prop::Value(value) => markup::push_markup(&mut segments, &value_text(value)),
			Prop::Block(block) => segments.push(Segment::Slot(block.id())),
			Prop::List(items) => {
				for segment in flatten(items) {
					match segment {
						Segment::Markup(markup) => markup::push_markup(&mut segments, &markup),
						slot @ Segment::Slot(_) => segments.push(slot),
					}
				}
			}
			Prop::Events(_) | Prop::Callback(_) => (),
		}
	}
	segments
}
