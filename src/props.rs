//! Component props: the construction-time [`PropBag`] and the stored, observed [`Props`].

use crate::{
	block::Block,
	dom::Event,
	Result,
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use std::rc::Rc;

/// The key under which declared DOM event handlers live.
pub const EVENTS_KEY: &str = "events";

/// A DOM event handler. It receives the component whose root node it was attached to.
pub type EventHandler = Rc<dyn Fn(&Block, &Event)>;

/// A function-valued prop, called through [`Props::callback`].
pub type Callback = Rc<dyn Fn(&Props, &[Value]) -> Result<()>>;

#[derive(Clone)]
pub enum Prop {
	Value(Value),
	Block(Block),
	/// Mixed values and components, rendered in order. Components become individual placeholders.
	List(Vec<Prop>),
	/// DOM event name to handler, attached to the component's root node after each render.
	Events(Vec<(String, EventHandler)>),
	Callback(Callback),
}

impl Debug for Prop {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(value) => {
				if cfg!(feature = "dangerous-logging") {
					f.debug_tuple("Value").field(value).finish()
				} else {
					f.debug_tuple("Value").field(&format_args!("..")).finish()
				}
			}
			Self::Block(block) => f.debug_tuple("Block").field(&block.id()).finish(),
			Self::List(items) => f.debug_tuple("List").field(items).finish(),
			Self::Events(events) => f.debug_list().entries(events.iter().map(|(kind, _)| kind)).finish(),
			Self::Callback(_) => f.write_str("Callback"),
		}
	}
}

impl From<Value> for Prop {
	fn from(value: Value) -> Self {
		Self::Value(value)
	}
}

impl From<Block> for Prop {
	fn from(block: Block) -> Self {
		Self::Block(block)
	}
}

impl Prop {
	pub fn value(value: impl Into<Value>) -> Self {
		Self::Value(value.into())
	}

	pub fn callback(callback: impl Fn(&Props, &[Value]) -> Result<()> + 'static) -> Self {
		Self::Callback(Rc::new(callback))
	}

	fn blocks(&self, out: &mut Vec<Block>) {
		match self {
			Self::Block(block) => out.push(block.clone()),
			Self::List(items) => {
				for item in items {
					item.blocks(out);
				}
			}
			Self::Value(_) | Self::Events(_) | Self::Callback(_) => (),
		}
	}
}

/// An ordered property bag as passed to [`Block::new`] and [`Block::set_props`].
///
/// Later entries with the same key replace earlier ones in place.
#[derive(Debug, Clone, Default)]
pub struct PropBag(Vec<(String, Prop)>);

impl PropBag {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, key: impl Into<String>, prop: Prop) {
		let key = key.into();
		match self.0.iter_mut().find(|(existing, _)| *existing == key) {
			Some((_, existing)) => *existing = prop,
			None => self.0.push((key, prop)),
		}
	}

	#[must_use]
	pub fn with(mut self, key: impl Into<String>, prop: Prop) -> Self {
		self.insert(key, prop);
		self
	}

	#[must_use]
	pub fn value(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.with(key, Prop::Value(value.into()))
	}

	#[must_use]
	pub fn child(self, key: impl Into<String>, block: Block) -> Self {
		self.with(key, Prop::Block(block))
	}

	#[must_use]
	pub fn list(self, key: impl Into<String>, items: Vec<Prop>) -> Self {
		self.with(key, Prop::List(items))
	}

	#[must_use]
	pub fn callback(self, key: impl Into<String>, callback: impl Fn(&Props, &[Value]) -> Result<()> + 'static) -> Self {
		self.with(key, Prop::callback(callback))
	}

	/// Declares a DOM event handler under [`EVENTS_KEY`].
	#[must_use]
	pub fn on(mut self, event: impl Into<String>, handler: impl Fn(&Block, &Event) + 'static) -> Self {
		let handler: EventHandler = Rc::new(handler);
		match self.0.iter_mut().find(|(key, _)| key == EVENTS_KEY) {
			Some((_, Prop::Events(events))) => events.push((event.into(), handler)),
			Some((_, other)) => *other = Prop::Events(vec![(event.into(), handler)]),
			None => self.0.push((EVENTS_KEY.to_string(), Prop::Events(vec![(event.into(), handler)]))),
		}
		self
	}

	/// Adds every entry of a JSON object as a plain value.
	#[must_use]
	pub fn values(mut self, values: Map<String, Value>) -> Self {
		for (key, value) in values {
			self.insert(key, Prop::Value(value));
		}
		self
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Splits off the top-level components, in order of appearance.
	pub(crate) fn partition(self) -> (Props, Vec<(String, Block)>) {
		let mut props = Props::default();
		let mut children = Vec::new();
		for (key, prop) in self.0 {
			match prop {
				Prop::Block(block) => children.push((key, block)),
				prop => {
					props.0.insert(key, prop);
				}
			}
		}
		(props, children)
	}
}

impl IntoIterator for PropBag {
	type Item = (String, Prop);
	type IntoIter = std::vec::IntoIter<(String, Prop)>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

/// A component's current props.
#[derive(Debug, Clone, Default)]
pub struct Props(HashMap<String, Prop>);

/// A callback prop bound to the props it was read from.
pub struct BoundCallback<'a> {
	props: &'a Props,
	callback: Callback,
}

impl Debug for BoundCallback<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("BoundCallback").finish_non_exhaustive()
	}
}

impl BoundCallback<'_> {
	/// # Errors
	///
	/// Whatever the callback returns.
	pub fn call(&self, args: &[Value]) -> Result<()> {
		(self.callback)(self.props, args)
	}
}

impl Props {
	#[must_use]
	pub fn get(&self, key: &str) -> Option<&Prop> {
		self.0.get(key)
	}

	#[must_use]
	pub fn contains_key(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	#[must_use]
	pub fn value(&self, key: &str) -> Option<&Value> {
		match self.0.get(key)? {
			Prop::Value(value) => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub fn str(&self, key: &str) -> Option<&str> {
		self.value(key).and_then(Value::as_str)
	}

	/// Reads a callback prop, bound to these props.
	#[must_use]
	pub fn callback(&self, key: &str) -> Option<BoundCallback<'_>> {
		match self.0.get(key)? {
			Prop::Callback(callback) => Some(BoundCallback { props: self, callback: Rc::clone(callback) }),
			_ => None,
		}
	}

	/// The declared DOM event handlers.
	#[must_use]
	pub fn events(&self) -> Vec<(String, EventHandler)> {
		match self.0.get(EVENTS_KEY) {
			Some(Prop::Events(events)) => events.clone(),
			_ => Vec::new(),
		}
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Prop)> {
		self.0.iter().map(|(key, prop)| (key.as_str(), prop))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// The plain values only, as a JSON object.
	#[must_use]
	pub fn to_values(&self) -> Map<String, Value> {
		self.0
			.iter()
			.filter_map(|(key, prop)| match prop {
				Prop::Value(value) => Some((key.clone(), value.clone())),
				_ => None,
			})
			.collect()
	}

	/// Components held in props (directly or inside lists), as opposed to named children.
	pub(crate) fn blocks(&self) -> Vec<Block> {
		let mut blocks = Vec::new();
		for prop in self.0.values() {
			prop.blocks(&mut blocks);
		}
		blocks
	}

	/// Shallow merge. Existing keys are overwritten, nothing is removed.
	pub(crate) fn merge(&mut self, bag: PropBag) {
		for (key, prop) in bag {
			self.0.insert(key, prop);
		}
	}
}
