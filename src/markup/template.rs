use super::{push_markup, Segment};
use crate::{Error, Result};
use core::slice;
use hashbrown::HashMap;
use serde_json::Value;
use tracing::{instrument, trace};

/// What a top-level name in a template refers to.
#[derive(Debug, Clone)]
pub enum Binding<'a> {
	/// Plain data.
	Value(&'a Value),
	/// Pre-flattened markup and child placeholders, i.e. child components and mixed lists.
	Segments(Vec<Segment>),
}

/// The names a [`Template`] is rendered against.
#[derive(Debug, Default)]
pub struct Scope<'a> {
	bindings: HashMap<&'a str, Binding<'a>>,
}

impl<'a> Scope<'a> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds `name`, replacing an earlier binding of the same name.
	pub fn bind(&mut self, name: &'a str, binding: Binding<'a>) {
		self.bindings.insert(name, binding);
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Binding<'a>> {
		self.bindings.get(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Path {
	parents: usize,
	explicit_this: bool,
	parts: Vec<String>,
}

impl Path {
	fn parse(mut source: &str, offset: usize) -> Result<Self> {
		let mut parents = 0;
		while let Some(rest) = source.strip_prefix("../") {
			parents += 1;
			source = rest;
		}

		if source.is_empty() || source.chars().any(char::is_whitespace) {
			return Err(Error::template(offset, format!("invalid expression {:?}", source)));
		}

		let (explicit_this, rest) = match source {
			"this" | "." => return Ok(Self { parents, explicit_this: true, parts: Vec::new() }),
			_ => match source.strip_prefix("this.").or_else(|| source.strip_prefix("./")) {
				Some(rest) => (true, rest),
				None => (false, source),
			},
		};

		let parts: Vec<String> = rest.split('.').map(ToString::to_string).collect();
		if parts.iter().any(String::is_empty) {
			return Err(Error::template(offset, format!("empty path segment in {:?}", source)));
		}
		Ok(Self { parents, explicit_this, parts })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
	If,
	Unless,
	Each,
}

#[derive(Debug, Clone)]
enum Piece {
	Text(String),
	Escaped(Path),
	Raw(Path),
	Section { kind: SectionKind, path: Path, body: Vec<Piece>, inverse: Vec<Piece> },
}

/// A compiled component template.
///
/// | Syntax | Meaning |
/// |---|---|
/// | `{{path}}` | HTML-escaped value |
/// | `{{{path}}}` | raw value; the way to place child components |
/// | `{{#if path}}…{{else}}…{{/if}}` | conditional |
/// | `{{#unless path}}…{{/unless}}` | inverted conditional |
/// | `{{#each path}}…{{else}}…{{/each}}` | iteration with `this`, `@index` and `@key` |
/// | `{{! comment }}`, `{{!-- comment --}}` | nothing |
///
/// Paths are dotted (`user.name`), may start with `this.` and may climb out of `#each` bodies with `../`.
/// Unknown names render as nothing.
#[derive(Debug, Clone)]
pub struct Template {
	pieces: Vec<Piece>,
}

struct Compiler<'s> {
	source: &'s str,
	position: usize,
}

impl<'s> Compiler<'s> {
	/// Returns the body and, if an `{{else}}` was found, the inverse.
	fn section(&mut self, open: Option<(SectionKind, usize)>) -> Result<(Vec<Piece>, Vec<Piece>)> {
		let mut current = Vec::new();
		let mut body = None;

		loop {
			let rest = &self.source[self.position..];
			let start = match rest.find("{{") {
				Some(start) => start,
				None => {
					if let Some((kind, offset)) = open {
						return Err(Error::template(offset, format!("unclosed {:?} section", kind)));
					}
					if !rest.is_empty() {
						current.push(Piece::Text(rest.to_string()));
					}
					self.position = self.source.len();
					return Ok((current, Vec::new()));
				}
			};
			if start > 0 {
				current.push(Piece::Text(rest[..start].to_string()));
			}
			let offset = self.position + start;
			let tag = &self.source[offset..];

			if tag.starts_with("{{{") {
				let end = tag.find("}}}").ok_or_else(|| Error::template(offset, "unterminated `{{{`"))?;
				current.push(Piece::Raw(Path::parse(tag[3..end].trim(), offset)?));
				self.position = offset + end + 3;
				continue;
			}

			if tag.starts_with("{{!--") {
				let end = tag.find("--}}").ok_or_else(|| Error::template(offset, "unterminated comment"))?;
				self.position = offset + end + 4;
				continue;
			}

			let end = tag.find("}}").ok_or_else(|| Error::template(offset, "unterminated `{{`"))?;
			let inner = tag[2..end].trim();
			self.position = offset + end + 2;

			if inner.starts_with('!') {
				continue;
			}

			if let Some(helper) = inner.strip_prefix('#') {
				let (name, argument) = helper.split_once(char::is_whitespace).ok_or_else(|| Error::template(offset, format!("`{{{{#{}}}}}` needs an argument", helper)))?;
				let kind = match name {
					"if" => SectionKind::If,
					"unless" => SectionKind::Unless,
					"each" => SectionKind::Each,
					other => return Err(Error::template(offset, format!("unknown block helper {:?}", other))),
				};
				let path = Path::parse(argument.trim(), offset)?;
				let (body, inverse) = self.section(Some((kind, offset)))?;
				current.push(Piece::Section { kind, path, body, inverse });
				continue;
			}

			if inner == "else" {
				if open.is_none() || body.is_some() {
					return Err(Error::template(offset, "unexpected `{{else}}`"));
				}
				body = Some(core::mem::take(&mut current));
				continue;
			}

			if let Some(name) = inner.strip_prefix('/') {
				let expected = match open {
					Some((kind, _)) => kind,
					None => return Err(Error::template(offset, format!("unexpected closing tag {:?}", name))),
				};
				let closes = matches!((expected, name.trim()), (SectionKind::If, "if") | (SectionKind::Unless, "unless") | (SectionKind::Each, "each"));
				if !closes {
					return Err(Error::template(offset, format!("{:?} section closed by {:?}", expected, name)));
				}
				return Ok(match body {
					Some(body) => (body, current),
					None => (current, Vec::new()),
				});
			}

			current.push(Piece::Escaped(Path::parse(inner, offset)?));
		}
	}
}

#[derive(Debug)]
enum Item {
	Value(Value),
	Segment(Segment),
}

#[derive(Debug)]
struct Frame {
	this: Item,
	index: usize,
	key: Option<String>,
}

enum Resolved<'r> {
	Value(&'r Value),
	Owned(Value),
	Segments(&'r [Segment]),
}

impl Template {
	/// # Errors
	///
	/// Iff `source` is malformed: unterminated tags, unbalanced or unknown sections, invalid paths.
	#[instrument(skip(source), fields(len = source.len()))]
	pub fn compile(source: &str) -> Result<Self> {
		let mut compiler = Compiler { source, position: 0 };
		let (pieces, _) = compiler.section(None)?;
		trace!("Compiled {} top-level piece(s).", pieces.len());
		Ok(Self { pieces })
	}

	#[must_use]
	pub fn render(&self, scope: &Scope<'_>) -> Vec<Segment> {
		let mut segments = Vec::new();
		let mut frames = Vec::new();
		render_pieces(&self.pieces, scope, &mut frames, &mut segments);
		segments
	}
}

fn render_pieces(pieces: &[Piece], scope: &Scope<'_>, frames: &mut Vec<Frame>, out: &mut Vec<Segment>) {
	for piece in pieces {
		match piece {
			Piece::Text(text) => push_markup(out, text),
			Piece::Escaped(path) => emit(lookup(scope, frames, path), true, out),
			Piece::Raw(path) => emit(lookup(scope, frames, path), false, out),
			Piece::Section { kind: kind @ (SectionKind::If | SectionKind::Unless), path, body, inverse } => {
				let truthy = lookup(scope, frames, path).map_or(false, |resolved| is_truthy(&resolved));
				let branch = if truthy == (*kind == SectionKind::If) { body } else { inverse };
				render_pieces(branch, scope, frames, out);
			}
			Piece::Section { kind: SectionKind::Each, path, body, inverse } => {
				let items: Vec<(Item, Option<String>)> = match lookup(scope, frames, path) {
					Some(Resolved::Value(value)) => each_items(value),
					Some(Resolved::Owned(value)) => each_items(&value),
					Some(Resolved::Segments(segments)) => segments.iter().map(|segment| (Item::Segment(segment.clone()), None)).collect(),
					None => Vec::new(),
				};
				if items.is_empty() {
					render_pieces(inverse, scope, frames, out);
					continue;
				}
				for (index, (this, key)) in items.into_iter().enumerate() {
					frames.push(Frame { this, index, key });
					render_pieces(body, scope, frames, out);
					frames.pop();
				}
			}
		}
	}
}

fn each_items(value: &Value) -> Vec<(Item, Option<String>)> {
	match value {
		Value::Array(items) => items.iter().map(|item| (Item::Value(item.clone()), None)).collect(),
		Value::Object(entries) => entries.iter().map(|(key, item)| (Item::Value(item.clone()), Some(key.clone()))).collect(),
		_ => Vec::new(),
	}
}

fn descend<'r>(mut value: &'r Value, parts: &[String]) -> Option<&'r Value> {
	for part in parts {
		value = match value {
			Value::Object(entries) => entries.get(part)?,
			Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(value)
}

fn lookup<'r>(scope: &'r Scope<'_>, frames: &'r [Frame], path: &Path) -> Option<Resolved<'r>> {
	let visible = &frames[..frames.len().saturating_sub(path.parents)];
	let innermost = visible.last();

	let first = match path.parts.first() {
		Some(first) => first,
		None => {
			return match &innermost?.this {
				Item::Value(value) => Some(Resolved::Value(value)),
				Item::Segment(segment) => Some(Resolved::Segments(slice::from_ref(segment))),
			}
		}
	};

	match first.as_str() {
		"@index" => return innermost.map(|frame| Resolved::Owned(Value::from(frame.index))),
		"@key" => return innermost.and_then(|frame| frame.key.clone()).map(|key| Resolved::Owned(Value::String(key))),
		_ => (),
	}

	if path.explicit_this {
		return match &innermost?.this {
			Item::Value(value) => descend(value, &path.parts).map(Resolved::Value),
			Item::Segment(_) => None,
		};
	}

	for frame in visible.iter().rev() {
		if let Item::Value(value) = &frame.this {
			if let Some(found) = value.get(first.as_str()) {
				return descend(found, &path.parts[1..]).map(Resolved::Value);
			}
		}
	}

	match scope.get(first)? {
		Binding::Value(value) => descend(value, &path.parts[1..]).map(Resolved::Value),
		Binding::Segments(segments) if path.parts.len() == 1 => Some(Resolved::Segments(segments)),
		Binding::Segments(_) => None,
	}
}

fn is_truthy(resolved: &Resolved<'_>) -> bool {
	match resolved {
		Resolved::Value(value) => value_is_truthy(value),
		Resolved::Owned(value) => value_is_truthy(value),
		Resolved::Segments(segments) => !segments.is_empty(),
	}
}

fn value_is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
		Value::String(s) => !s.is_empty(),
		Value::Array(items) => !items.is_empty(),
		Value::Object(_) => true,
	}
}

/// The text a value renders as. Arrays concatenate their items' texts.
pub(crate) fn value_text(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::Bool(b) => b.to_string(),
		Value::Number(n) => n.to_string(),
		Value::String(s) => s.clone(),
		Value::Array(items) => items.iter().map(value_text).collect(),
		Value::Object(_) => value.to_string(),
	}
}

fn escape(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#x27;"),
			'`' => escaped.push_str("&#x60;"),
			'=' => escaped.push_str("&#x3D;"),
			c => escaped.push(c),
		}
	}
	escaped
}

fn emit(resolved: Option<Resolved<'_>>, escaped: bool, out: &mut Vec<Segment>) {
	let text = |text: String| if escaped { escape(&text) } else { text };
	match resolved {
		None => (),
		Some(Resolved::Value(value)) => push_markup(out, &text(value_text(value))),
		Some(Resolved::Owned(value)) => push_markup(out, &text(value_text(&value))),
		Some(Resolved::Segments(segments)) => {
			for segment in segments {
				match segment {
					Segment::Markup(markup) => push_markup(out, &text(markup.clone())),
					Segment::Slot(id) => out.push(Segment::Slot(*id)),
				}
			}
		}
	}
}
