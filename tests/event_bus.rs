use block_dom::{Error, EventBus};
use std::{cell::RefCell, rc::Rc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Event {
	Saved,
	Closed,
}

#[test]
fn handlers_run_in_registration_order_with_arguments() {
	let bus = EventBus::<Event, (u32, &str)>::new();
	let log = Rc::new(RefCell::new(Vec::new()));

	for name in ["first", "second", "third"] {
		let log = Rc::clone(&log);
		bus.on(Event::Saved, move |(n, text)| {
			log.borrow_mut().push(format!("{} {} {}", name, n, text));
			Ok(())
		});
	}

	bus.emit(&Event::Saved, &(7, "x")).unwrap();
	assert_eq!(*log.borrow(), ["first 7 x", "second 7 x", "third 7 x"]);

	bus.emit(&Event::Closed, &(0, "")).unwrap();
	assert_eq!(log.borrow().len(), 3);
}

#[test]
fn off_removes_only_that_handler() {
	let bus = EventBus::<Event, ()>::new();
	let log = Rc::new(RefCell::new(Vec::new()));

	let a = {
		let log = Rc::clone(&log);
		bus.on(Event::Saved, move |()| {
			log.borrow_mut().push('a');
			Ok(())
		})
	};
	{
		let log = Rc::clone(&log);
		bus.on(Event::Saved, move |()| {
			log.borrow_mut().push('b');
			Ok(())
		});
	}

	bus.off(&Event::Saved, a);
	bus.emit(&Event::Saved, &()).unwrap();
	assert_eq!(*log.borrow(), ['b']);
	assert_eq!(bus.listener_count(&Event::Saved), 1);
}

#[test]
fn off_for_unregistered_handlers_is_a_no_op() {
	let bus = EventBus::<Event, ()>::new();
	let id = bus.on(Event::Saved, |()| Ok(()));

	bus.off(&Event::Closed, id);
	bus.off(&Event::Saved, id);
	bus.off(&Event::Saved, id);

	assert_eq!(bus.listener_count(&Event::Saved), 0);
}

#[test]
fn failing_handler_stops_emission() {
	let bus = EventBus::<Event, ()>::new();
	let reached = Rc::new(RefCell::new(false));

	bus.on(Event::Saved, |()| Err(Error::hook("nope")));
	{
		let reached = Rc::clone(&reached);
		bus.on(Event::Saved, move |()| {
			*reached.borrow_mut() = true;
			Ok(())
		});
	}

	let error = bus.emit(&Event::Saved, &()).unwrap_err();
	assert_eq!(error.to_string(), "nope");
	assert!(!*reached.borrow());
}

#[test]
fn handlers_registered_during_emission_wait_for_the_next_one() {
	let bus = Rc::new(EventBus::<Event, ()>::new());
	let count = Rc::new(RefCell::new(0));

	{
		let weak = Rc::downgrade(&bus);
		let count = Rc::clone(&count);
		bus.on(Event::Saved, move |()| {
			if let Some(bus) = weak.upgrade() {
				let count = Rc::clone(&count);
				bus.on(Event::Closed, move |()| {
					*count.borrow_mut() += 1;
					Ok(())
				});
			}
			Ok(())
		});
	}

	bus.emit(&Event::Saved, &()).unwrap();
	assert_eq!(*count.borrow(), 0);
	bus.emit(&Event::Closed, &()).unwrap();
	assert_eq!(*count.borrow(), 1);
}
