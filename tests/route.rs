
use block_dom::{
	route::{BeforeEnter, ComponentFactory},
	Document, Error, Route, RouteProps, WILDCARD,
};
use components_::{init_logging, page_factory};
use futures::{executor::block_on, future::FutureExt};
use rstest::rstest;
use std::{cell::Cell, rc::Rc};

fn app() -> Document {
	Document::from_html(r#"<div id="app"></div>"#).unwrap()
}

fn route(pathname: &str, document: &Document, created: &Rc<Cell<usize>>, before_enter: Option<BeforeEnter>) -> Route {
	let factory: ComponentFactory = Rc::new(page_factory("page", Rc::clone(created)));
	Route::new(pathname, factory, RouteProps::new("#app"), before_enter, document.clone())
}

#[rstest]
#[case("/a", "/a", true)]
#[case("/a", "/a/", false)]
#[case("/a", "/b", false)]
#[case("/a", "*", false)]
#[case(WILDCARD, "/a", true)]
#[case(WILDCARD, "/anything/at/all", true)]
#[case(WILDCARD, WILDCARD, true)]
fn matching(#[case] pattern: &str, #[case] pathname: &str, #[case] expected: bool) {
	let route = route(pattern, &app(), &Rc::default(), None);
	assert_eq!(route.matches(pathname), expected);
	assert_eq!(route.is_wildcard(), pattern == WILDCARD);
}

#[test]
fn renders_once_then_reuses_the_component() {
	init_logging();

	let document = app();
	let created = Rc::new(Cell::new(0));
	let route = route("/chats", &document, &created, None);

	route.leave().unwrap();
	assert!(route.block().is_none());

	block_on(route.render()).unwrap();
	let block = route.block().unwrap();
	assert_eq!(created.get(), 1);
	assert!(block.is_mounted());
	let root = document.query_selector("#app").unwrap().unwrap();
	assert_eq!(root.inner_html(), r#"<section class="page"></section>"#);

	route.leave().unwrap();
	assert_eq!(block.element().unwrap().display().as_deref(), Some("none"));

	block_on(route.render()).unwrap();
	assert_eq!(created.get(), 1);
	assert_eq!(route.block(), Some(block.clone()));
	assert_eq!(block.element().unwrap().display().as_deref(), Some("flex"));
	assert_eq!(root.children().len(), 1);
}

#[test]
fn navigate_only_renders_matching_paths() {
	let document = app();
	let created = Rc::new(Cell::new(0));
	let route = route("/settings", &document, &created, None);

	block_on(route.navigate("/chats")).unwrap();
	assert_eq!(created.get(), 0);

	block_on(route.navigate("/settings")).unwrap();
	assert_eq!(created.get(), 1);
	assert_eq!(route.pathname(), "/settings");
}

#[test]
fn missing_root_is_an_error() {
	let document = Document::from_html("<main></main>").unwrap();
	let created = Rc::new(Cell::new(0));
	let route = route("/", &document, &created, None);

	assert!(matches!(block_on(route.render()), Err(Error::RootNotFound(query)) if query == "#app"));
	assert!(route.block().is_none());
	assert_eq!(created.get(), 0);
}

#[test]
fn before_enter_runs_first_and_its_failure_propagates() {
	init_logging();

	let document = app();
	let created = Rc::new(Cell::new(0));
	let allowed = Rc::new(Cell::new(false));
	let calls = Rc::new(Cell::new(0));

	let before_enter: BeforeEnter = {
		let allowed = Rc::clone(&allowed);
		let calls = Rc::clone(&calls);
		let created = Rc::clone(&created);
		Rc::new(move || {
			let allowed = allowed.get();
			calls.set(calls.get() + 1);
			assert_eq!(created.get(), 0, "hook must run before the component is created");
			async move {
				if allowed {
					Ok(())
				} else {
					Err(Error::hook("not logged in"))
				}
			}
			.boxed_local()
		})
	};
	let route = route("/settings", &document, &created, Some(before_enter));

	let error = block_on(route.render()).unwrap_err();
	assert_eq!(error.to_string(), "not logged in");
	assert!(route.block().is_none());

	allowed.set(true);
	block_on(route.render()).unwrap();
	assert_eq!(calls.get(), 2);
	assert_eq!(created.get(), 1);
}
