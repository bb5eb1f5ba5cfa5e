
use block_dom::{Block, Component, Document, Error, Event, Prop, PropBag, Props, Result};
use components_::{init_logging, label, Probe, Static};
use serde_json::json;
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

#[test]
fn construction_partitions_props_and_children() {
	init_logging();

	let (probe, calls) = Probe::new(r#"<div class="card">{{title}}{{{icon}}}</div>"#);
	let icon = label("i");
	let block = Block::new(probe, PropBag::new().value("title", "Chats").child("icon", icon.clone())).unwrap();

	assert_eq!(calls.init.get(), 1);
	assert_eq!(calls.renders.get(), 1);
	assert_eq!(block.child("icon"), Some(icon.clone()));
	assert!(block.props().get("icon").is_none());
	assert_eq!(block.props().str("title"), Some("Chats"));
	assert_eq!(block.element().unwrap().outer_html(), r#"<div class="card">Chats<span class="label">i</span></div>"#);
}

#[test]
fn children_are_spliced_in_declaration_order() {
	init_logging();

	let first = label("one");
	let second = label("two");
	let parent = Block::new(
		Static(r#"<nav>{{{first}}}{{{second}}}</nav>"#),
		PropBag::new().child("first", first.clone()).child("second", second.clone()),
	)
	.unwrap();

	let root = parent.element().unwrap();
	let spliced = root.element_children();
	assert_eq!(spliced.len(), 2);
	assert_eq!(Some(spliced[0].clone()), first.element());
	assert_eq!(Some(spliced[1].clone()), second.element());
	assert!(root.find_placeholder(first.id()).is_none());
}

#[test]
fn prop_writes_update_synchronously_and_once() {
	init_logging();

	let (probe, calls) = Probe::new("<p>{{a}}-{{b}}</p>");
	let block = Block::new(probe, PropBag::new().value("a", 1)).unwrap();

	block.set_props(PropBag::new().value("a", 2).value("b", 3)).unwrap();

	let updates = calls.updates.borrow();
	assert_eq!(updates.len(), 1);
	let (old, new) = &updates[0];
	assert_eq!(old.value("a"), Some(&json!(1)));
	assert_eq!(old.value("b"), None);
	assert_eq!(new.value("a"), Some(&json!(2)));
	assert_eq!(new.value("b"), Some(&json!(3)));
	assert_eq!(calls.renders.get(), 2);
	assert_eq!(block.element().unwrap().text_content(), "2-3");
}

#[test]
fn declined_updates_do_not_render() {
	init_logging();

	let (mut probe, calls) = Probe::new("<p>{{a}}</p>");
	probe.rerender = false;
	let block = Block::new(probe, PropBag::new().value("a", 1)).unwrap();
	let root = block.element();

	block.set_prop("a", json!(2)).unwrap();

	assert_eq!(calls.updates.borrow().len(), 1);
	assert_eq!(calls.renders.get(), 1);
	assert_eq!(block.element(), root);
	assert_eq!(block.props().value("a"), Some(&json!(2)));
}

#[test]
fn rerendering_with_unchanged_props_is_structurally_identical() {
	init_logging();

	let first = label("one");
	let second = label("two");
	let parent = Block::new(
		Static(r#"<nav class="{{kind}}">{{{first}}}<hr>{{{second}}}</nav>"#),
		PropBag::new().value("kind", "tabs").child("first", first.clone()).child("second", second.clone()),
	)
	.unwrap();
	let document = Document::new();
	document.body().append_child(&parent.get_content().unwrap()).unwrap();

	let before = parent.element().unwrap();
	let html = before.outer_html();

	parent.set_prop("kind", json!("tabs")).unwrap();

	let after = parent.element().unwrap();
	assert_ne!(before, after);
	assert_eq!(after.outer_html(), html);
	assert_eq!(after.element_children()[0], first.element().unwrap());
	assert_eq!(after.element_children()[2], second.element().unwrap());
	assert_eq!(document.body().children(), [after]);
	assert!(before.parent().is_none());
}

#[test]
fn list_props_are_flattened() {
	init_logging();

	let block = Block::new(
		Static("<ul>{{{items}}}</ul>"),
		PropBag::new().list("items", vec![Prop::value("<b>a</b>"), Prop::Block(label("x")), Prop::value(1), label("y").into()]),
	)
	.unwrap();

	assert_eq!(block.element().unwrap().outer_html(), r#"<ul><b>a</b><span class="label">x</span>1<span class="label">y</span></ul>"#);
}

struct Wide;
impl Component for Wide {
	fn render(&self, _: &Props) -> String {
		"<aside>{{text}}</aside>".to_string()
	}

	fn display(&self) -> &str {
		"block"
	}
}

#[test]
fn show_hide_and_display_preservation() {
	init_logging();

	let block = Block::new(Wide, PropBag::new().value("text", "a")).unwrap();
	block.hide().unwrap();
	assert_eq!(block.element().unwrap().display().as_deref(), Some("none"));

	block.set_prop("text", json!("b")).unwrap();
	let root = block.element().unwrap();
	assert_eq!(root.text_content(), "b");
	assert_eq!(root.display().as_deref(), Some("none"));

	block.show().unwrap();
	assert_eq!(block.element().unwrap().display().as_deref(), Some("block"));
}

#[test]
fn props_cannot_be_deleted() {
	let block = label("x");
	assert!(matches!(block.delete_prop("text"), Err(Error::PropDeletion(key)) if key == "text"));
	assert_eq!(block.props().str("text"), Some("x"));
}

#[test]
fn input_values() {
	init_logging();

	let form = Block::new(Static(r#"<form><input name="login" value="ada"></form>"#), PropBag::new()).unwrap();
	assert_eq!(form.input_value("input[name=login]").unwrap(), "ada");

	form.element().unwrap().query_selector("input").unwrap().unwrap().set_value("grace");
	assert_eq!(form.input_value("[name=login]").unwrap(), "grace");

	assert!(matches!(form.input_value("textarea"), Err(Error::ElementNotFound(_))));
	assert!(matches!(form.input_value("input >"), Err(Error::Selector(_))));

	let input = Block::new(Static(r#"<input value="x">"#), PropBag::new()).unwrap();
	assert_eq!(input.input_value("input").unwrap(), "x");
}

#[test]
fn declared_events_follow_the_root_node() {
	init_logging();

	let clicks = Rc::new(Cell::new(0));
	let button = Block::new(
		Static("<button>{{label}}</button>"),
		PropBag::new().value("label", "Send").on("click", {
			let clicks = Rc::clone(&clicks);
			move |block: &Block, event: &Event| {
				clicks.set(clicks.get() + 1);
				event.prevent_default();
				block.set_prop("label", json!(format!("Sent {}", clicks.get()))).unwrap();
			}
		}),
	)
	.unwrap();

	let first_root = button.element().unwrap();
	first_root.click();
	assert_eq!(clicks.get(), 1);

	let second_root = button.element().unwrap();
	assert_ne!(first_root, second_root);
	assert_eq!(second_root.text_content(), "Sent 1");
	assert_eq!(first_root.listener_count("click"), 0);
	assert_eq!(second_root.listener_count("click"), 1);

	second_root.click();
	assert_eq!(clicks.get(), 2);
	assert_eq!(button.element().unwrap().text_content(), "Sent 2");
}

#[test]
fn callbacks_are_bound_to_their_props() {
	let seen = Rc::new(RefCell::new(Vec::new()));
	let block = Block::new(
		Static("<p></p>"),
		PropBag::new().value("name", "ada").callback("greet", {
			let seen = Rc::clone(&seen);
			move |props: &Props, args: &[serde_json::Value]| {
				seen.borrow_mut().push((props.str("name").map(ToString::to_string), args.to_vec()));
				Ok(())
			}
		}),
	)
	.unwrap();

	block.props().callback("greet").unwrap().call(&[json!(1)]).unwrap();
	assert!(block.props().callback("name").is_none());
	assert_eq!(*seen.borrow(), [(Some("ada".to_string()), vec![json!(1)])]);
}

#[test]
fn mounting_happens_once_and_reaches_new_children() {
	init_logging();

	let (child_probe, child_calls) = Probe::new("<i></i>");
	let child = Block::new(child_probe, PropBag::new()).unwrap();
	let (parent_probe, parent_calls) = Probe::new("<div>{{{child}}}{{{extra}}}</div>");
	let parent = Block::new(parent_probe, PropBag::new().child("child", child)).unwrap();

	parent.dispatch_component_did_mount().unwrap();
	parent.dispatch_component_did_mount().unwrap();
	assert_eq!(parent_calls.mounted.get(), 1);
	assert_eq!(child_calls.mounted.get(), 1);
	assert!(parent.is_mounted());

	let (extra_probe, extra_calls) = Probe::new("<b></b>");
	let extra = Block::new(extra_probe, PropBag::new()).unwrap();
	assert_eq!(extra_calls.mounted.get(), 0);

	parent.set_prop("extra", extra.clone()).unwrap();
	assert_eq!(extra_calls.mounted.get(), 1);
	assert_eq!(child_calls.mounted.get(), 1);
	assert_eq!(parent.element().unwrap().outer_html(), "<div><i></i><b></b></div>");
}

struct WithIcon;
impl Component for WithIcon {
	fn render(&self, _: &Props) -> String {
		"<a>{{{icon}}}</a>".to_string()
	}

	fn init(&self, block: &Block) -> Result<()> {
		block.insert_child("icon", label("*"));
		Ok(())
	}
}

#[test]
fn init_can_populate_children() {
	let block = Block::new(WithIcon, PropBag::new()).unwrap();
	assert_eq!(block.element().unwrap().outer_html(), r#"<a><span class="label">*</span></a>"#);
}

struct Section;
impl Component for Section {
	fn render(&self, props: &Props) -> String {
		props.str("markup").unwrap_or_default().to_string()
	}

	fn tag_name(&self) -> &str {
		"section"
	}
}

#[test]
fn markup_without_a_root_element_is_wrapped() {
	let empty = Block::new(Static(""), PropBag::new()).unwrap();
	assert_eq!(empty.element().unwrap().outer_html(), "<div></div>");

	let text = Block::new(Section, PropBag::new().value("markup", "just {{text}}").value("text", "words")).unwrap();
	assert_eq!(text.element().unwrap().outer_html(), "<section>just words</section>");

	let child = label("c");
	let bare_child = Block::new(Static("{{{child}}}"), PropBag::new().child("child", child.clone())).unwrap();
	let root = bare_child.element().unwrap();
	assert_eq!(root.tag_name(), Some("div"));
	assert_eq!(root.children(), [child.element().unwrap()]);
}

#[test]
fn template_errors_surface_from_construction() {
	assert!(matches!(Block::new(Static("{{#if open}}"), PropBag::new()), Err(Error::Template { .. })));
	assert!(matches!(Block::new(Static("<p title=\"x></p>"), PropBag::new()), Err(Error::Markup(_))));
}

struct Failing;
impl Component for Failing {
	fn render(&self, _: &Props) -> String {
		String::new()
	}

	fn init(&self, _: &Block) -> Result<()> {
		Err(Error::hook("no session"))
	}
}

#[test]
fn init_errors_surface_from_construction() {
	let error = Block::new(Failing, PropBag::new()).unwrap_err();
	assert!(matches!(error, Error::Hook(_)));
}

#[test]
fn dispose_tears_everything_down() {
	init_logging();

	let (child_probe, child_calls) = Probe::new("<i></i>");
	let child = Block::new(child_probe, PropBag::new()).unwrap();
	let (parent_probe, parent_calls) = Probe::new("<div>{{{child}}}</div>");
	let parent = Block::new(parent_probe, PropBag::new().child("child", child.clone()).on("click", |_, _| ())).unwrap();

	let document = Document::new();
	let root = parent.get_content().unwrap();
	document.body().append_child(&root).unwrap();
	parent.dispatch_component_did_mount().unwrap();

	let disposed = Rc::new(Cell::new(0));
	{
		let disposed = Rc::clone(&disposed);
		parent.on_dispose(move || disposed.set(disposed.get() + 1));
	}

	parent.dispose().unwrap();
	parent.dispose().unwrap();

	assert_eq!(parent_calls.unmounted.get(), 1);
	assert_eq!(child_calls.unmounted.get(), 1);
	assert_eq!(disposed.get(), 1);
	assert!(parent.is_disposed() && child.is_disposed());
	assert!(!parent.is_mounted());
	assert_eq!(root.listener_count("click"), 0);
	assert!(document.body().children().is_empty());
}

struct Reluctant(Rc<Cell<bool>>);

impl Component for Reluctant {
	fn render(&self, _: &Props) -> String {
		"<div></div>".to_string()
	}

	fn component_will_unmount(&self, _: &Block) -> Result<()> {
		if self.0.get() {
			Ok(())
		} else {
			Err(Error::hook("still busy"))
		}
	}
}

#[test]
fn failed_disposal_can_be_retried() {
	let ready = Rc::new(Cell::new(false));
	let block = Block::new(Reluctant(Rc::clone(&ready)), PropBag::new()).unwrap();
	let document = Document::new();
	document.body().append_child(&block.get_content().unwrap()).unwrap();

	let cleaned_up = Rc::new(Cell::new(false));
	{
		let cleaned_up = Rc::clone(&cleaned_up);
		block.on_dispose(move || cleaned_up.set(true));
	}

	assert_eq!(block.dispose().unwrap_err().to_string(), "still busy");
	assert!(!block.is_disposed());
	assert!(!cleaned_up.get());
	assert_eq!(document.body().children().len(), 1);

	ready.set(true);
	block.dispose().unwrap();
	assert!(block.is_disposed());
	assert!(cleaned_up.get());
	assert!(document.body().children().is_empty());
}
