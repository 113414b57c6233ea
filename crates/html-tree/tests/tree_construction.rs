//! End-to-end tree construction checks: parse, inspect or re-serialize,
//! and hold the tree link invariants throughout.

use html_tree::{parse, parse_fragment, Error, Node, NodeKind, ParseOptions};
use pretty_assertions::assert_str_eq;

fn roundtrip(input: &str) -> String {
    let doc = parse(input.as_bytes(), ParseOptions::default()).expect("parse failed");
    doc.arena().assert_consistent(doc.root());
    doc.render()
}

fn roundtrip_with(input: &str, options: ParseOptions) -> String {
    let doc = parse(input.as_bytes(), options).expect("parse failed");
    doc.arena().assert_consistent(doc.root());
    doc.render()
}

#[test]
fn links_document() {
    let rendered = roundtrip(
        "<p>Links:</p><ul><li><a href=\"foo\">Foo</a><li><a href=\"/bar/baz\">BarBaz</a></ul>",
    );
    assert_str_eq!(
        rendered,
        "<html><head></head><body><p>Links:</p><ul><li><a href=\"foo\">Foo</a></li>\
         <li><a href=\"/bar/baz\">BarBaz</a></li></ul></body></html>"
    );
}

#[test]
fn empty_input_builds_the_skeleton() {
    assert_str_eq!(roundtrip(""), "<html><head></head><body></body></html>");
}

#[test]
fn eof_inside_a_tag_terminates_cleanly() {
    assert_str_eq!(
        roundtrip("before<div class='x"),
        "<html><head></head><body>before</body></html>"
    );
}

#[test]
fn body_fragment_yields_children() {
    let fragment = parse_fragment(
        "<p>Links:</p>".as_bytes(),
        Some(Node::element("body")),
        ParseOptions::default(),
    )
    .expect("fragment parse failed");

    assert_eq!(fragment.nodes().len(), 1);
    let p = fragment.nodes()[0];
    let arena = fragment.arena();
    assert_eq!(arena.get(p).kind, NodeKind::Element);
    assert_eq!(arena.get(p).data, "p");
    let text = arena.first_child(p).expect("p has text");
    assert_eq!(arena.get(text).kind, NodeKind::Text);
    assert_eq!(arena.get(text).data, "Links:");
    assert_str_eq!(fragment.render(), "<p>Links:</p>");
}

#[test]
fn inconsistent_fragment_context_is_rejected() {
    let mut context = Node::element("frameset");
    // The name says "table" while the atom still says "frameset".
    context.data = "table".to_string();
    let result = parse_fragment("<p>x</p>".as_bytes(), Some(context), ParseOptions::default());
    assert!(matches!(result, Err(Error::InconsistentNode)));
}

#[test]
fn fragment_context_in_raw_text_mode() {
    let fragment = parse_fragment(
        "<b>not bold</b>".as_bytes(),
        Some(Node::element("title")),
        ParseOptions::default(),
    )
    .expect("fragment parse failed");
    // Inside a title context everything is RCDATA text.
    assert_eq!(fragment.nodes().len(), 1);
    assert_eq!(
        fragment.arena().get(fragment.nodes()[0]).kind,
        NodeKind::Text
    );
}

#[test]
fn noscript_with_scripting_disabled_parses_its_content() {
    let rendered = roundtrip_with(
        "<noscript><img src='frontpage.png'/></noscript><p><img src='doc.png'/></p>",
        ParseOptions {
            scripting: false,
            ..ParseOptions::default()
        },
    );
    assert_str_eq!(
        rendered,
        "<html><head><noscript></noscript></head><body><img src=\"frontpage.png\"/>\
         <p><img src=\"doc.png\"/></p></body></html>"
    );
}

#[test]
fn noscript_with_scripting_enabled_is_raw_text() {
    let rendered = roundtrip("<body><noscript><img src='x'/></noscript>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><noscript><img src='x'/></noscript></body></html>"
    );
}

#[test]
fn misnested_formatting_is_adopted() {
    let rendered = roundtrip("<p>1<b>2<i>3</b>4</i>5</p>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><p>1<b>2<i>3</i></b><i>4</i>5</p></body></html>"
    );
}

#[test]
fn adoption_agency_with_a_furthest_block() {
    let rendered = roundtrip("<b>1<div>2</b>3</div>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><b>1</b><div><b>2</b>3</div></body></html>"
    );
}

#[test]
fn repeated_anchors_eject_prior_entries() {
    let rendered = roundtrip("<a href=1>one<a href=2>two");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><a href=\"1\">one</a><a href=\"2\">two</a></body></html>"
    );
}

#[test]
fn table_text_is_foster_parented() {
    let rendered = roundtrip("<table><tr><td>x</td></tr>y</table>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body>y<table><tbody><tr><td>x</td></tr></tbody></table>\
         </body></html>"
    );
}

#[test]
fn table_implies_tbody_and_rows() {
    let rendered = roundtrip("<table><td>a<td>b</table>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><table><tbody><tr><td>a</td><td>b</td></tr></tbody>\
         </table></body></html>"
    );
}

#[test]
fn quirks_mode_keeps_tables_inside_paragraphs() {
    // No doctype: quirks mode, the <p> stays open around the table.
    let quirky = roundtrip("<p>x<table></table>");
    assert_str_eq!(
        quirky,
        "<html><head></head><body><p>x<table></table></p></body></html>"
    );

    let standard = roundtrip("<!DOCTYPE html><p>x<table></table>");
    assert_str_eq!(
        standard,
        "<!DOCTYPE html><html><head></head><body><p>x</p><table></table></body></html>"
    );
}

#[test]
fn doctype_identifiers_render_back() {
    let rendered = roundtrip(
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \
         \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">x",
    );
    assert_str_eq!(
        rendered,
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \
         \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">\
         <html><head></head><body>x</body></html>"
    );
}

#[test]
fn quirks_flag_is_reported() {
    let doc = parse("<p>x".as_bytes(), ParseOptions::default()).unwrap();
    assert!(doc.quirks());
    let doc = parse("<!DOCTYPE html><p>x".as_bytes(), ParseOptions::default()).unwrap();
    assert!(!doc.quirks());
}

#[test]
fn template_content_stays_in_the_template() {
    let rendered = roundtrip("<template><li>x</li></template>");
    assert_str_eq!(
        rendered,
        "<html><head><template><li>x</li></template></head><body></body></html>"
    );
}

#[test]
fn select_nests_options_flat() {
    let rendered = roundtrip("<select><option>a<option>b</select>c");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><select><option>a</option><option>b</option></select>c\
         </body></html>"
    );
}

#[test]
fn input_closes_an_open_select() {
    let rendered = roundtrip("<select><option>a<input>b");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><select><option>a</option></select><input/>b</body></html>"
    );
}

#[test]
fn svg_foreign_object_is_an_html_island() {
    let rendered = roundtrip("<p><svg><foreignobject><p>x</p></foreignobject></svg></p>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><p><svg><foreignObject><p>x</p></foreignObject></svg>\
         </p></body></html>"
    );
}

#[test]
fn math_text_integration_point() {
    let rendered = roundtrip("<math><mi>x</mi><mo>+</mo></math>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><math><mi>x</mi><mo>+</mo></math></body></html>"
    );
}

#[test]
fn foreign_content_breaks_out_on_html_tags() {
    let rendered = roundtrip("<svg><rect/><p>out");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><svg><rect></rect></svg><p>out</p></body></html>"
    );
}

#[test]
fn svg_attribute_case_is_adjusted() {
    let rendered = roundtrip("<svg viewbox='0 0 1 1' xlink:href='#a'></svg>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><svg viewBox=\"0 0 1 1\" xlink:href=\"#a\"></svg>\
         </body></html>"
    );
}

#[test]
fn script_content_is_not_escaped() {
    let rendered = roundtrip("<script>if (a < b && c) { d(); }</script>");
    assert_str_eq!(
        rendered,
        "<html><head><script>if (a < b && c) { d(); }</script></head><body></body></html>"
    );
}

#[test]
fn textarea_leading_newline_round_trips() {
    // The parse eats the first newline; with two in the input the stored
    // text still leads with one, and the serializer re-inserts the eaten
    // newline so the output re-parses to the same tree.
    let rendered = roundtrip("<body><textarea>\n\nline</textarea>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><textarea>\n\nline</textarea></body></html>"
    );
    let again = roundtrip(&rendered);
    assert_str_eq!(again, rendered);

    // A single leading newline disappears from the tree entirely.
    let rendered = roundtrip("<body><textarea>\nline</textarea>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><textarea>line</textarea></body></html>"
    );
}

#[test]
fn frameset_replaces_the_body() {
    let rendered = roundtrip("<frameset><frame></frameset>");
    assert_str_eq!(
        rendered,
        "<html><head></head><frameset><frame/></frameset></html>"
    );
}

#[test]
fn comments_attach_where_they_appear() {
    let rendered = roundtrip("<!--pre--><p>x</p><!--post-->");
    assert_str_eq!(
        rendered,
        "<!--pre--><html><head></head><body><p>x</p><!--post--></body></html>"
    );
}

#[test]
fn entities_decode_into_text_and_attributes() {
    let rendered = roundtrip("<p title='a&amp;b'>x &lt; y &notin; z</p>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><p title=\"a&amp;b\">x &lt; y \u{2209} z</p></body></html>"
    );
}

#[test]
fn max_buf_bounds_the_parse() {
    let input = format!("<p>ok</p><div title=\"{}\">big</div>", "x".repeat(4096));
    let result = parse(
        input.as_bytes(),
        ParseOptions {
            max_buf: 256,
            ..ParseOptions::default()
        },
    );
    assert!(matches!(result, Err(Error::BufferExceeded)));

    // Small tokens parse fine under the same cap.
    let doc = parse(
        "<p>ok</p>".as_bytes(),
        ParseOptions {
            max_buf: 256,
            ..ParseOptions::default()
        },
    )
    .expect("small tokens fit the cap");
    assert_str_eq!(doc.render(), "<html><head></head><body><p>ok</p></body></html>");
}

#[test]
fn heading_siblings_do_not_nest() {
    let rendered = roundtrip("<h1>a<h2>b");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><h1>a</h1><h2>b</h2></body></html>"
    );
}

#[test]
fn definition_list_items_close_each_other() {
    let rendered = roundtrip("<dl><dt>t<dd>d<dt>t2</dl>");
    assert_str_eq!(
        rendered,
        "<html><head></head><body><dl><dt>t</dt><dd>d</dd><dt>t2</dt></dl></body></html>"
    );
}

#[test]
fn stray_end_tags_are_ignored() {
    let rendered = roundtrip("a</div></span>b");
    assert_str_eq!(rendered, "<html><head></head><body>ab</body></html>");
}

#[test]
fn html_attributes_merge_onto_the_root() {
    let rendered = roundtrip("<html lang=en><body><html lang=fr data-x=1>");
    assert_str_eq!(
        rendered,
        "<html lang=\"en\" data-x=\"1\"><head></head><body></body></html>"
    );
}

#[test]
fn trees_stay_consistent_on_hostile_inputs() {
    let inputs = [
        "<b><i><u></b>x</u></i>",
        "<table><table><td><td>",
        "<p><table><p><table><p>",
        "<select><select><option><select>",
        "<svg><math><mi><p></p></mi></math></svg>",
        "<template><template><td></template>",
        "<a><a><a><a><a>link",
        "</></p></br><!---",
        "<form><form><input></form>",
        "<frameset><body><frameset>",
    ];
    for input in inputs {
        let doc = parse(input.as_bytes(), ParseOptions::default())
            .unwrap_or_else(|e| panic!("parse of {input:?} failed: {e}"));
        doc.arena().assert_consistent(doc.root());
    }
}
