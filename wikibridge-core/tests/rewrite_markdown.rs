use wikibridge_core::contract::Dialect;
use wikibridge_core::rewrite::rewrite;

fn markdown(body: &str) -> String {
    rewrite(body, Dialect::Markdown)
}

#[test]
fn atx_headings_map_by_hash_count() {
    assert_eq!(markdown("# Title\n\nText"), "= Title =\n\nText");
    assert_eq!(markdown("### Deep ###"), "=== Deep ===");
    assert_eq!(markdown("###### Six"), "====== Six ======");
}

#[test]
fn emphasis_inside_inline_code_stays_literal() {
    assert_eq!(markdown("Run `*not bold*` now"), "Run ##*not bold*## now");
}

#[test]
fn bold_before_italic() {
    assert_eq!(markdown("**bold** and *italic*"), "**bold** and //italic//");
    assert_eq!(markdown("__bold__ and _italic_"), "**bold** and //italic//");
    assert_eq!(markdown("***both***"), "**//both//**");
}

#[test]
fn underscores_inside_words_are_not_emphasis() {
    assert_eq!(markdown("call snake_case_name here"), "call snake_case_name here");
}

#[test]
fn strikethrough() {
    assert_eq!(markdown("~~old~~ new"), "--old-- new");
}

#[test]
fn fenced_code_keeps_language_and_content() {
    let out = markdown("```rust\nlet x = *y * 2;\n```\n\nafter");
    assert_eq!(out, "{{code language=\"rust\"}}\nlet x = *y * 2;\n{{/code}}\n\nafter");
}

#[test]
fn fenced_code_without_language() {
    assert_eq!(markdown("~~~\n# not a heading\n~~~"), "{{code}}\n# not a heading\n{{/code}}");
}

#[test]
fn links_and_empty_link_text() {
    assert_eq!(markdown("see [the docs](https://d.example/x)"), "see [[the docs>>https://d.example/x]]");
    assert_eq!(markdown("[](http://x)"), "[[http://x>>http://x]]");
    assert_eq!(markdown("<https://example.com>"), "[[https://example.com>>https://example.com]]");
}

#[test]
fn link_text_emphasis_is_rewritten() {
    assert_eq!(markdown("[**Docs**](http://d)"), "[[**Docs**>>http://d]]");
}

#[test]
fn images_carry_alt_text() {
    assert_eq!(markdown("![logo](img/logo.png)"), "[[image:img/logo.png||alt=\"logo\"]]");
    assert_eq!(markdown("![](img/logo.png \"Logo\")"), "[[image:img/logo.png]]");
}

#[test]
fn badge_image_inside_link() {
    let out = markdown("[![ci](https://b.example/badge.svg)](https://ci.example)");
    assert_eq!(
        out,
        "[[[[image:https://b.example/badge.svg||alt=\"ci\"]]>>https://ci.example]]"
    );
}

#[test]
fn horizontal_rules() {
    assert_eq!(markdown("a\n\n---\n\nb"), "a\n\n----\n\nb");
    assert_eq!(markdown("a\n\n* * *\n\nb"), "a\n\n----\n\nb");
}

#[test]
fn tables_mark_header_cells() {
    let out = markdown("| Host | IP |\n|------|:--:|\n| gw | 10.0.0.1 |\n\nafter");
    assert_eq!(out, "|=Host|=IP\n|gw|10.0.0.1\n\nafter");
}

#[test]
fn list_nesting_is_preserved() {
    assert_eq!(markdown("- a\n    - b\n        - c\n- d"), "* a\n** b\n*** c\n* d");
    assert_eq!(markdown("1. First\n2. Second\n   - Sub"), "1. First\n1. Second\n1*. Sub");
}

#[test]
fn list_items_keep_inline_markup() {
    assert_eq!(markdown("* *item* with `code`"), "* //item// with ##code##");
}

#[test]
fn inline_html_is_reduced() {
    assert_eq!(
        markdown(r#"<p align="center"><img src="a.png" alt="A"></p>"#),
        "[[image:a.png||alt=\"A\"]]"
    );
    assert_eq!(markdown("line<br>next"), "line\nnext");
    assert_eq!(markdown("a < b and c > d"), "a < b and c > d");
}

#[test]
fn entities_decode() {
    assert_eq!(markdown("AT&amp;T &copy; 2024"), "AT&T \u{a9} 2024");
}

#[test]
fn canonical_forms_are_fixed_points() {
    let canonical = "= Title =\n\n**bold** and //italic// see [[here>>http://x]]";
    assert_eq!(markdown(canonical), canonical);
    let once = markdown("# Title\n\n**bold** and *italic* see [here](http://x)");
    assert_eq!(once, canonical);
    assert_eq!(markdown(&once), once);
}

#[test]
fn malformed_input_never_panics() {
    for input in ["```", "[unclosed](", "**", "*", "| a |\n|--", "\\", "<", "&#x110000;"] {
        let _ = markdown(input);
    }
}

#[test]
fn link_target_keeps_balanced_parentheses() {
    assert_eq!(
        markdown("[x](http://a/(b))"),
        "[[x>>http://a/(b)]]"
    );
    assert_eq!(
        markdown("See [Rust](https://en.wikipedia.org/wiki/Rust_(programming_language)) too"),
        "See [[Rust>>https://en.wikipedia.org/wiki/Rust_(programming_language)]] too"
    );
}

#[test]
fn image_target_keeps_balanced_parentheses() {
    assert_eq!(
        markdown("![plan](img/floor(1).png)"),
        "[[image:img/floor(1).png||alt=\"plan\"]]"
    );
}
