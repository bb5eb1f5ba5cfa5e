use block_dom::{
	markup::{parse, parse_html, Binding, Scope, Segment, Template},
	Error,
};
use rstest::rstest;
use serde_json::{json, Value};

fn render(source: &str, data: &Value) -> String {
	let template = Template::compile(source).unwrap();
	let mut scope = Scope::new();
	if let Value::Object(entries) = data {
		for (key, value) in entries {
			scope.bind(key, Binding::Value(value));
		}
	}
	match template.render(&scope).as_slice() {
		[] => String::new(),
		[Segment::Markup(markup)] => markup.clone(),
		other => panic!("unexpected segments {:?}", other),
	}
}

#[test]
fn escaped_and_raw_values() {
	let data = json!({ "text": "<b>\"hi\" & 'bye'</b>" });
	assert_eq!(render("{{text}}", &data), "&lt;b&gt;&quot;hi&quot; &amp; &#x27;bye&#x27;&lt;/b&gt;");
	assert_eq!(render("{{{text}}}", &data), "<b>\"hi\" & 'bye'</b>");
}

#[test]
fn dotted_paths_and_missing_names() {
	let data = json!({ "user": { "name": "Ada", "tags": ["x", "y"] } });
	assert_eq!(render("{{user.name}}/{{user.tags.1}}/{{user.missing}}/{{nobody}}", &data), "Ada/y//");
}

#[rstest]
#[case(json!(true), "yes")]
#[case(json!(1), "yes")]
#[case(json!("text"), "yes")]
#[case(json!({}), "yes")]
#[case(json!([0]), "yes")]
#[case(json!(false), "no")]
#[case(json!(0), "no")]
#[case(json!(""), "no")]
#[case(json!(null), "no")]
#[case(json!([]), "no")]
fn truthiness(#[case] flag: Value, #[case] expected: &str) {
	let data = json!({ "flag": flag });
	assert_eq!(render("{{#if flag}}yes{{else}}no{{/if}}", &data), expected);
	let inverted = if expected == "yes" { "" } else { "not" };
	assert_eq!(render("{{#unless flag}}not{{/unless}}", &data), inverted);
}

#[test]
fn each_over_arrays_and_objects() {
	let data = json!({
		"chats": [{ "title": "A" }, { "title": "B" }],
		"counts": { "unread": 2 },
		"owner": "me",
	});
	assert_eq!(
		render("{{#each chats}}<li data-index=\"{{@index}}\">{{title}} of {{../owner}}</li>{{/each}}", &data),
		"<li data-index=\"0\">A of me</li><li data-index=\"1\">B of me</li>",
	);
	assert_eq!(render("{{#each counts}}{{@key}}={{this}}{{/each}}", &data), "unread=2");
	assert_eq!(render("{{#each nothing}}x{{else}}empty{{/each}}", &data), "empty");
}

#[test]
fn comments_render_nothing() {
	assert_eq!(render("a{{! note }}b{{!-- {{not}} a tag --}}c", &json!({})), "abc");
}

#[rstest]
#[case("{{#if x}}open")]
#[case("{{#if x}}{{/each}}")]
#[case("{{/if}}")]
#[case("{{name")]
#[case("{{{name}}")]
#[case("{{#with x}}{{/with}}")]
#[case("{{else}}")]
#[case("{{a..b}}")]
fn malformed_templates_are_rejected(#[case] source: &str) {
	assert!(matches!(Template::compile(source), Err(Error::Template { .. })));
}

#[test]
fn segments_bind_child_slots() {
	let document_fragment = {
		let child = block_dom::Block::new(StaticSpan, block_dom::PropBag::new()).unwrap();
		let template = Template::compile("<div>{{{child}}}<p>{{{items}}}</p></div>").unwrap();
		let mut scope = Scope::new();
		scope.bind("child", Binding::Segments(vec![Segment::Slot(child.id())]));
		scope.bind("items", Binding::Segments(vec![Segment::Markup("<i>1</i>".to_string()), Segment::Slot(child.id())]));
		let segments = template.render(&scope);
		assert_eq!(segments.iter().filter(|segment| matches!(segment, Segment::Slot(_))).count(), 2);

		let fragment = parse(&segments).unwrap();
		assert!(fragment.find_placeholder(child.id()).is_some());
		fragment
	};
	let html = document_fragment.inner_html();
	assert!(html.starts_with("<div><!--placeholder:"), "{}", html);
	assert!(html.contains("<p><i>1</i><!--placeholder:"), "{}", html);
}

struct StaticSpan;
impl block_dom::Component for StaticSpan {
	fn render(&self, _: &block_dom::Props) -> String {
		"<span></span>".to_string()
	}
}

#[test]
fn parser_handles_void_raw_text_and_entities() {
	let fragment = parse_html(
		"
		<form class=a  data-x='1 &amp; 2'>
			<input name=login value=\"&lt;me&gt;\">
			<br/>
			<textarea>a &lt; b</textarea>
			<script>if (a < b) {}</script>
		</form>
		<!-- gone -->",
	)
	.unwrap();

	let form = fragment.first_element_child().unwrap();
	assert_eq!(form.attribute("class").as_deref(), Some("a"));
	assert_eq!(form.attribute("data-x").as_deref(), Some("1 & 2"));
	assert_eq!(form.element_children().len(), 4);

	let input = form.query_selector("input[name=login]").unwrap().unwrap();
	assert_eq!(input.value().as_deref(), Some("<me>"));
	assert!(input.children().is_empty());

	assert_eq!(form.query_selector("textarea").unwrap().unwrap().text_content(), "a < b");
	assert_eq!(form.query_selector("script").unwrap().unwrap().text_content(), "if (a < b) {}");
	assert_eq!(fragment.element_children().len(), 1);
}

#[test]
fn parser_is_lenient_about_structure() {
	let fragment = parse_html("<div><p>one</span><p>two</div>trailing").unwrap();
	assert_eq!(fragment.inner_html(), "<div><p>one<p>two</p></p></div>trailing");
}

#[rstest]
#[case("<div")]
#[case("<div title=\"x>")]
#[case("<!-- open")]
#[case("<script>never closed")]
fn unterminated_markup_is_rejected(#[case] markup: &str) {
	assert!(matches!(parse_html(markup), Err(Error::Markup(_))));
}
