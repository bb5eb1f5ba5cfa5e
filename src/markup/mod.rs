//! Component markup: a handlebars-style template language and the parser that turns its output into nodes.
//!
//! Compiling a template against props yields [`Segment`]s: literal markup interleaved with opaque child
//! placeholders. [`parse`] turns those into a detached fragment in which each placeholder is a
//! [`Node::placeholder`](`crate::dom::Node::placeholder`) that the owning component later swaps for the child's
//! root node.

mod parse;
mod template;

pub use parse::{parse, parse_html};
pub use template::{Binding, Scope, Template};
pub(crate) use template::value_text;

use crate::block::BlockId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
	Markup(String),
	Slot(BlockId),
}

pub(crate) fn push_markup(segments: &mut Vec<Segment>, markup: &str) {
	if markup.is_empty() {
		return;
	}
	match segments.last_mut() {
		Some(Segment::Markup(last)) => last.push_str(markup),
		_ => segments.push(Segment::Markup(markup.to_string())),
	}
}
