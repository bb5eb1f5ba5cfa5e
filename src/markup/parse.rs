use super::Segment;
use crate::{dom::is_void_element, dom::Node, Error, Result};
use tracing::{instrument, trace, trace_span, warn};

/// Elements whose content is taken verbatim up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

/// Parses static markup into a detached fragment.
///
/// # Errors
///
/// Iff the markup is malformed (see [`parse`]).
pub fn parse_html(markup: &str) -> Result<Node> {
	parse(&[Segment::Markup(markup.to_string())])
}

/// Parses template output into a detached fragment, turning each [`Segment::Slot`] into a placeholder node.
///
/// The parser is lenient about unclosed elements (they are closed at the end of input) and stray end tags
/// (ignored), but a tag must not span a slot.
///
/// # Errors
///
/// Iff a tag, comment or quoted attribute value is unterminated within its markup segment.
#[instrument(skip(segments), fields(segments = segments.len()))]
pub fn parse(segments: &[Segment]) -> Result<Node> {
	let fragment = Node::fragment();
	let mut open = vec![fragment.clone()];

	for segment in segments {
		match segment {
			Segment::Markup(markup) => parse_markup(markup, &mut open)?,
			Segment::Slot(id) => top(&open).append_child(&Node::placeholder(*id))?,
		}
	}

	if open.len() > 1 {
		trace!("Implicitly closing {} element(s) at end of input.", open.len() - 1);
	}
	Ok(fragment)
}

fn top(open: &[Node]) -> &Node {
	// The fragment at the bottom is never popped.
	&open[open.len() - 1]
}

fn unterminated(what: &str, markup: &str, at: usize) -> Error {
	if cfg!(feature = "dangerous-logging") {
		Error::Markup(format!("unterminated {} at byte {} of {:?}", what, at, markup))
	} else {
		Error::Markup(format!("unterminated {} at byte {}", what, at))
	}
}

fn parse_markup(markup: &str, open: &mut Vec<Node>) -> Result<()> {
	let span = trace_span!("parse_markup", len = markup.len());
	let _enter = span.enter();

	let mut i = 0;
	while i < markup.len() {
		let rest = &markup[i..];

		if rest.starts_with("<!--") {
			let end = rest.find("-->").ok_or_else(|| unterminated("comment", markup, i))?;
			i += end + 3;
			continue;
		}

		if rest.starts_with("<!") || rest.starts_with("<?") {
			let end = rest.find('>').ok_or_else(|| unterminated("declaration", markup, i))?;
			i += end + 1;
			continue;
		}

		if rest.starts_with("</") {
			let end = rest.find('>').ok_or_else(|| unterminated("end tag", markup, i))?;
			let name = rest[2..end].trim().to_ascii_lowercase();
			match open.iter().skip(1).rposition(|node| node.tag_name() == Some(name.as_str())) {
				Some(position) => open.truncate(position + 1),
				None => warn!("Ignoring stray end tag </{}>.", name),
			}
			i += end + 1;
			continue;
		}

		if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
			i += parse_start_tag(markup, i, open)?;
			continue;
		}

		// Text runs up to the next thing that looks like markup.
		let mut end = rest.len();
		for (offset, _) in rest.match_indices('<').skip_while(|&(offset, _)| offset == 0) {
			let after = &rest[offset + 1..];
			if after.starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?') {
				end = offset;
				break;
			}
		}
		push_text(&rest[..end], open)?;
		i += end;
	}
	Ok(())
}

fn push_text(raw: &str, open: &[Node]) -> Result<()> {
	// Indentation between tags isn't content.
	if raw.trim().is_empty() && raw.contains('\n') {
		return Ok(());
	}
	if raw.is_empty() {
		return Ok(());
	}
	top(open).append_child(&Node::text(decode_entities(raw)))
}

/// Parses the start tag beginning at `markup[start]` and returns its length.
fn parse_start_tag(markup: &str, start: usize, open: &mut Vec<Node>) -> Result<usize> {
	let bytes = markup.as_bytes();
	let mut i = start + 1;

	let name_start = i;
	while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
		i += 1;
	}
	let element = Node::element(&markup[name_start..i]);
	let mut self_closing = false;

	loop {
		while i < bytes.len() && bytes[i].is_ascii_whitespace() {
			i += 1;
		}
		match bytes.get(i) {
			None => return Err(unterminated("start tag", markup, start)),
			Some(b'>') => {
				i += 1;
				break;
			}
			Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
				self_closing = true;
				i += 2;
				break;
			}
			Some(b'/') => {
				i += 1;
				continue;
			}
			Some(_) => (),
		}

		let name_start = i;
		while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'>' | b'/') {
			i += 1;
		}
		let name = markup[name_start..i].to_ascii_lowercase();

		while i < bytes.len() && bytes[i].is_ascii_whitespace() {
			i += 1;
		}
		let value = if bytes.get(i) == Some(&b'=') {
			i += 1;
			while i < bytes.len() && bytes[i].is_ascii_whitespace() {
				i += 1;
			}
			match bytes.get(i) {
				Some(&quote) if quote == b'"' || quote == b'\'' => {
					let value_start = i + 1;
					let length = markup[value_start..].find(char::from(quote)).ok_or_else(|| unterminated("attribute value", markup, i))?;
					i = value_start + length + 1;
					decode_entities(&markup[value_start..value_start + length])
				}
				_ => {
					let value_start = i;
					while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
						i += 1;
					}
					decode_entities(&markup[value_start..i])
				}
			}
		} else {
			String::new()
		};
		if !name.is_empty() && element.attribute(&name).is_none() {
			element.set_attribute(&name, value);
		}
	}

	top(open).append_child(&element)?;

	let tag = element.tag_name().unwrap_or_default().to_string();
	if self_closing || is_void_element(&tag) {
		return Ok(i - start);
	}

	if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
		let closing = format!("</{}", tag);
		let rest = &markup[i..];
		let end = rest.to_ascii_lowercase().find(&closing).ok_or_else(|| unterminated("raw text element", markup, start))?;
		let content = &rest[..end];
		if !content.is_empty() {
			let text = if tag == "textarea" { decode_entities(content) } else { content.to_string() };
			element.append_child(&Node::text(text))?;
		}
		let close_end = rest[end..].find('>').ok_or_else(|| unterminated("end tag", markup, i + end))?;
		return Ok(i + end + close_end + 1 - start);
	}

	open.push(element);
	Ok(i - start)
}

pub(crate) fn decode_entities(text: &str) -> String {
	if !text.contains('&') {
		return text.to_string();
	}

	let mut decoded = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(amp) = rest.find('&') {
		decoded.push_str(&rest[..amp]);
		let candidate = &rest[amp..];
		let semicolon = candidate.find(';').filter(|&semicolon| semicolon <= 10);
		let replacement = semicolon.and_then(|semicolon| {
			let entity = &candidate[1..semicolon];
			let c = match entity {
				"amp" => Some('&'),
				"lt" => Some('<'),
				"gt" => Some('>'),
				"quot" => Some('"'),
				"apos" => Some('\''),
				"nbsp" => Some('\u{a0}'),
				_ => entity
					.strip_prefix("#x")
					.or_else(|| entity.strip_prefix("#X"))
					.map(|hex| u32::from_str_radix(hex, 16))
					.or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
					.and_then(|parsed| parsed.ok())
					.and_then(char::from_u32),
			};
			c.map(|c| (c, semicolon))
		});
		match replacement {
			Some((c, semicolon)) => {
				decoded.push(c);
				rest = &candidate[semicolon + 1..];
			}
			None => {
				decoded.push('&');
				rest = &candidate[1..];
			}
		}
	}
	decoded.push_str(rest);
	decoded
}
