use html_tree::{parse, ParseOptions};

fn main() {
    divan::main();
}

/// A synthetic document heavy on the common paths: nested blocks, inline
/// formatting, attributes, tables, and entities.
fn sample_document() -> String {
    let mut html = String::from("<!DOCTYPE html><html><head><title>bench</title></head><body>");
    for i in 0..500 {
        html.push_str(&format!(
            "<div class=\"row r{i}\" data-index=\"{i}\"><h2>Section {i}</h2>\
             <p>Some <b>bold</b> and <i>italic</i> text &amp; an <a href=\"/item/{i}\">anchor</a>.</p>\
             <table><tr><td>a{i}</td><td>b{i}</td></tr></table></div>"
        ));
    }
    html.push_str("</body></html>");
    html
}

#[divan::bench]
fn parse_synthetic_document(bencher: divan::Bencher) {
    let input = sample_document();
    bencher.bench(|| {
        parse(input.as_bytes(), ParseOptions::default()).expect("bench input must parse")
    });
}
