use block_dom::{Document, Error, Event, Node};
use std::{cell::RefCell, rc::Rc};

#[test]
fn selectors() {
	let document = Document::from_html(
		r#"<div id="app" class="root wide">
			<ul class="chats">
				<li class="chat active" data-id="1">One</li>
				<li class="chat" data-id="2">Two</li>
			</ul>
		</div>"#,
	)
	.unwrap();

	assert_eq!(document.query_selector("body").unwrap(), Some(document.body()));
	assert!(document.query_selector("#app.root.wide").unwrap().is_some());
	assert!(document.query_selector("#app.narrow").unwrap().is_none());

	let active = document.query_selector("ul .chat.active").unwrap().unwrap();
	assert_eq!(active.text_content(), "One");
	assert_eq!(document.body().query_selector_all("#app li[data-id]").unwrap().len(), 2);
	assert_eq!(document.body().query_selector(r#"li[data-id="2"]"#).unwrap().unwrap().text_content(), "Two");

	assert!(matches!(document.query_selector("li > a"), Err(Error::Selector(_))));
	assert!(matches!(document.query_selector(""), Err(Error::Selector(_))));
}

#[test]
fn display_is_serialized_into_style() {
	let node = Node::element("div");
	node.set_attribute("style", "color: red;");
	node.set_display(Some("none"));
	assert_eq!(node.outer_html(), r#"<div style="color: red; display: none"></div>"#);

	let bare = Node::element("SPAN");
	bare.set_display(Some("flex"));
	assert_eq!(bare.outer_html(), r#"<span style="display: flex"></span>"#);
}

#[test]
fn events_bubble_until_stopped() {
	let outer = Node::element("div");
	let inner = Node::element("button");
	outer.append_child(&inner).unwrap();

	let log = Rc::new(RefCell::new(Vec::new()));
	{
		let log = Rc::clone(&log);
		outer.add_event_listener("click", move |event| log.borrow_mut().push(format!("outer {}", event.target().and_then(|target| target.tag_name().map(ToString::to_string)).unwrap_or_default())));
	}
	let stopper = {
		let log = Rc::clone(&log);
		inner.add_event_listener("click", move |event| {
			log.borrow_mut().push("inner".to_string());
			event.stop_propagation();
		})
	};

	inner.click();
	assert_eq!(*log.borrow(), ["inner"]);

	assert!(inner.remove_event_listener(stopper));
	inner.dispatch_event(&Event::new("click"));
	assert_eq!(*log.borrow(), ["inner", "outer button"]);
}

#[test]
fn mutations_below_the_body_are_announced() {
	let document = Document::new();
	let count = Rc::new(RefCell::new(0));
	let observer = {
		let count = Rc::clone(&count);
		document.on_mutation(move || *count.borrow_mut() += 1)
	};

	let detached = Node::element("p");
	detached.set_attribute("class", "x");
	assert_eq!(*count.borrow(), 0);

	document.body().append_child(&detached).unwrap();
	assert_eq!(*count.borrow(), 1);
	assert!(detached.is_connected());

	detached.set_display(Some("none"));
	assert_eq!(*count.borrow(), 2);

	detached.set_value("typed");
	assert_eq!(*count.borrow(), 2);

	document.off_mutation(observer);
	detached.remove();
	assert_eq!(*count.borrow(), 2);
	assert!(!detached.is_connected());
}

#[test]
fn hierarchy_errors() {
	let parent = Node::element("div");
	let child = Node::element("span");
	parent.append_child(&child).unwrap();

	assert!(matches!(child.append_child(&parent), Err(Error::Hierarchy(_))));
	assert!(matches!(Node::text("x").append_child(&Node::element("b")), Err(Error::Hierarchy(_))));
}
