//! Confluence storage format (XHTML + `ac:`/`ri:` elements) to canonical markup.
//!
//! Stage order is fixed; see [`rewrite`]. Regexes are non-greedy and dot-all,
//! and none of them use backreferences, so paired tags are matched per tag name.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::{
    code_block_markup, collapse_blank_lines, decode_entities, heading_markup, image_markup,
    link_markup, quote_param, strip_token_delimiters, Stash,
};

pub(crate) fn rewrite(body: &str) -> String {
    let mut stash = Stash::default();
    let text = strip_token_delimiters(body);
    let text = unwrap_cdata(&text);
    let text = headings(&text);
    let text = structured_macros(&text, &mut stash);
    let text = preformatted(&text, &mut stash);
    let text = inline_code(&text, &mut stash);
    let text = emphasis(&text);
    let text = links(&text);
    let text = images(&text);
    let text = lists(&text);
    let text = tables(&text, &mut stash);
    let text = breaks_and_paragraphs(&text);
    let text = strip_tags(&text);
    let text = decode_entities(&text);
    let text = collapse_blank_lines(&text);
    stash.restore(&text)
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

static CDATA: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<!\[CDATA\[(.*?)\]\]>"));
static XML_DECL: LazyLock<Regex> = LazyLock::new(|| re(r"<\?xml[^>]*\?>"));

/// CDATA content is literal text; re-escape it so no later stage sees it as tags.
fn unwrap_cdata(text: &str) -> String {
    let text = XML_DECL.replace_all(text, "");
    CDATA
        .replace_all(&text, |caps: &Captures<'_>| {
            caps[1]
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
        })
        .into_owned()
}

static HEADINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    (1..=6)
        .map(|level| re(&format!(r"(?s)<h{level}\b[^>]*>(.*?)</h{level}>")))
        .collect()
});
static INNER_NEWLINES: LazyLock<Regex> = LazyLock::new(|| re(r"\s*\n\s*"));

fn headings(text: &str) -> String {
    let mut out = text.to_string();
    for (idx, pattern) in HEADINGS.iter().enumerate() {
        let level = idx + 1;
        out = pattern
            .replace_all(&out, |caps: &Captures<'_>| {
                let inner = INNER_NEWLINES.replace_all(&caps[1], " ");
                format!("\n\n{}\n\n", heading_markup(level, &inner))
            })
            .into_owned();
    }
    out
}

const MACRO_OPEN: &str = "<ac:structured-macro";
const MACRO_CLOSE: &str = "</ac:structured-macro>";
const CALLOUTS: &[&str] = &["info", "warning", "note", "tip"];

static SELF_CLOSING_MACRO: LazyLock<Regex> =
    LazyLock::new(|| re(r"<ac:structured-macro\b([^>]*?)/>"));
static MACRO_NAME: LazyLock<Regex> = LazyLock::new(|| re(r#"ac:name="([^"]*)""#));
static MACRO_PARAM: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?s)<ac:parameter\b[^>]*?ac:name="([^"]*)"[^>]*>(.*?)</ac:parameter>"#));
static RICH_BODY: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)<ac:rich-text-body>(.*)</ac:rich-text-body>"));
static PLAIN_BODY: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)<ac:plain-text-body>(.*?)</ac:plain-text-body>"));

/// Resolve structured macros innermost first, so a code macro inside a callout
/// is stashed before the callout is rendered around it.
fn structured_macros(text: &str, stash: &mut Stash) -> String {
    let mut out = SELF_CLOSING_MACRO
        .replace_all(text, |caps: &Captures<'_>| {
            match macro_name(&caps[1]).as_str() {
                "toc" => "\n\n{{toc/}}\n\n".to_string(),
                _ => String::new(),
            }
        })
        .into_owned();

    while let Some(close) = out.find(MACRO_CLOSE) {
        let end = close + MACRO_CLOSE.len();
        let Some(open) = out[..close].rfind(MACRO_OPEN) else {
            // Stray closing tag.
            out.replace_range(close..end, "");
            continue;
        };
        let Some(open_end) = out[open..close].find('>').map(|i| open + i + 1) else {
            out.replace_range(close..end, "");
            continue;
        };
        let rendered = render_macro(&out[open..open_end], &out[open_end..close], stash);
        out.replace_range(open..end, &rendered);
    }
    out
}

fn macro_name(attrs: &str) -> String {
    MACRO_NAME
        .captures(attrs)
        .map(|c| c[1].to_ascii_lowercase())
        .unwrap_or_default()
}

fn render_macro(open_tag: &str, inner: &str, stash: &mut Stash) -> String {
    let name = macro_name(open_tag);
    let params: HashMap<String, String> = MACRO_PARAM
        .captures_iter(inner)
        .map(|c| (c[1].to_ascii_lowercase(), strip_tags(&c[2]).trim().to_string()))
        .collect();
    let without_params = MACRO_PARAM.replace_all(inner, "");
    let rich = RICH_BODY.captures(&without_params).map(|c| c[1].to_string());
    let plain = PLAIN_BODY.captures(&without_params).map(|c| c[1].to_string());

    match name.as_str() {
        "code" | "noformat" => {
            let code = decode_entities(&plain.or(rich).unwrap_or_default());
            let language = params.get("language").map(String::as_str);
            let token = stash.put(code_block_markup(language, &code));
            format!("\n\n{token}\n\n")
        }
        "toc" => "\n\n{{toc/}}\n\n".to_string(),
        callout if CALLOUTS.contains(&callout) => {
            let body = rich.or(plain).unwrap_or_default();
            let open = match params.get("title").filter(|t| !t.is_empty()) {
                Some(title) => format!("{{{{{callout} title=\"{}\"}}}}", quote_param(&decode_entities(title))),
                None => format!("{{{{{callout}}}}}"),
            };
            format!("\n\n{open}\n{body}\n{{{{/{callout}}}}}\n\n")
        }
        other => {
            let body = rich.or(plain).unwrap_or_else(|| without_params.into_owned());
            if strip_tags(&body).trim().is_empty() {
                // Parameter-only macros (status, jira, anchor) keep their values inline.
                let values: Vec<String> = MACRO_PARAM
                    .captures_iter(inner)
                    .map(|c| strip_tags(&c[2]).trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                return values.join(" ");
            }
            let label = if other.is_empty() { "macro" } else { other };
            format!(
                "\n\n{{{{box title=\"{}\"}}}}\n{body}\n{{{{/box}}}}\n\n",
                quote_param(label)
            )
        }
    }
}

static PRE: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<pre\b[^>]*>(.*?)</pre>"));
static LANGUAGE_CLASS: LazyLock<Regex> =
    LazyLock::new(|| re(r#"class="[^"]*\blanguage-([A-Za-z0-9_+#-]+)"#));

fn preformatted(text: &str, stash: &mut Stash) -> String {
    PRE.replace_all(text, |caps: &Captures<'_>| {
        let inner = &caps[1];
        let language = LANGUAGE_CLASS
            .captures(&caps[0])
            .map(|c| c[1].to_string());
        let code = decode_entities(&strip_tags(inner));
        let token = stash.put(code_block_markup(language.as_deref(), &code));
        format!("\n\n{token}\n\n")
    })
    .into_owned()
}

static CODE_SPAN: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<code\b[^>]*>(.*?)</code>"));

fn inline_code(text: &str, stash: &mut Stash) -> String {
    CODE_SPAN
        .replace_all(text, |caps: &Captures<'_>| {
            let code = decode_entities(&strip_tags(&caps[1]));
            if code.trim().is_empty() {
                return code;
            }
            stash.put(format!("##{code}##"))
        })
        .into_owned()
}

/// (tag, canonical marker). Bold tags come first.
const EMPHASIS: &[(&str, &str)] = &[
    ("strong", "**"),
    ("b", "**"),
    ("em", "//"),
    ("i", "//"),
    ("u", "__"),
    ("s", "--"),
    ("del", "--"),
    ("strike", "--"),
    ("sup", "^^"),
    ("sub", ",,"),
];

static EMPHASIS_TAGS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    EMPHASIS
        .iter()
        .map(|(tag, marker)| (re(&format!(r"(?s)<{tag}(?:\s[^>]*)?>(.+?)</{tag}>")), *marker))
        .collect()
});

fn emphasis(text: &str) -> String {
    let mut out = text.to_string();
    for (pattern, marker) in EMPHASIS_TAGS.iter() {
        out = pattern
            .replace_all(&out, |caps: &Captures<'_>| {
                let inner = &caps[1];
                if strip_tags(inner).trim().is_empty() {
                    inner.to_string()
                } else {
                    format!("{marker}{inner}{marker}")
                }
            })
            .into_owned();
    }
    out
}

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?s)<a\b[^>]*?\bhref="([^"]*)"[^>]*>(.*?)</a>"#));
static AC_LINK: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<ac:link\b[^>]*>(.*?)</ac:link>"));
static RI_PAGE: LazyLock<Regex> = LazyLock::new(|| re(r#"<ri:page\b[^>]*?ri:content-title="([^"]*)""#));
static RI_ATTACHMENT: LazyLock<Regex> =
    LazyLock::new(|| re(r#"<ri:attachment\b[^>]*?ri:filename="([^"]*)""#));
static RI_URL: LazyLock<Regex> = LazyLock::new(|| re(r#"<ri:url\b[^>]*?ri:value="([^"]*)""#));
static RI_USER: LazyLock<Regex> = LazyLock::new(|| re(r#"<ri:user\b[^>]*?ri:(?:username|userkey|account-id)="([^"]*)""#));
static LINK_BODY: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?s)<ac:(?:plain-text-link-body|link-body)>(.*?)</ac:(?:plain-text-link-body|link-body)>")
});

fn links(text: &str) -> String {
    let text = ANCHOR.replace_all(text, |caps: &Captures<'_>| {
        let (href, label) = (&caps[1], &caps[2]);
        if has_visible_content(label) {
            link_markup(label, href)
        } else {
            link_markup("", href)
        }
    });
    AC_LINK
        .replace_all(&text, |caps: &Captures<'_>| {
            let inner = &caps[1];
            let target = RI_PAGE
                .captures(inner)
                .map(|c| c[1].to_string())
                .or_else(|| RI_ATTACHMENT.captures(inner).map(|c| format!("attach:{}", &c[1])))
                .or_else(|| RI_URL.captures(inner).map(|c| c[1].to_string()))
                .or_else(|| RI_USER.captures(inner).map(|c| format!("user:{}", &c[1])));
            let label = LINK_BODY
                .captures(inner)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            match target {
                Some(target) if has_visible_content(&label) => link_markup(&label, &target),
                Some(target) => {
                    let shown = target.strip_prefix("attach:").unwrap_or(&target).to_string();
                    link_markup(&shown, &target)
                }
                None => label,
            }
        })
        .into_owned()
}

fn has_visible_content(html: &str) -> bool {
    !strip_tags(html).trim().is_empty() || html.contains("<ac:image") || html.contains("<img")
}

static AC_IMAGE: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<ac:image\b([^>]*)>(.*?)</ac:image>"));
static IMG: LazyLock<Regex> = LazyLock::new(|| re(r"<img\b([^>]*?)/?>"));
static AC_ALT: LazyLock<Regex> = LazyLock::new(|| re(r#"\bac:alt="([^"]*)""#));
static SRC: LazyLock<Regex> = LazyLock::new(|| re(r#"\bsrc="([^"]*)""#));
static ALT: LazyLock<Regex> = LazyLock::new(|| re(r#"\balt="([^"]*)""#));

fn images(text: &str) -> String {
    let text = AC_IMAGE.replace_all(text, |caps: &Captures<'_>| {
        let alt = AC_ALT.captures(&caps[1]).map(|c| c[1].to_string());
        let inner = &caps[2];
        let reference = RI_ATTACHMENT
            .captures(inner)
            .or_else(|| RI_URL.captures(inner))
            .map(|c| c[1].to_string());
        match reference {
            Some(reference) => image_markup(&reference, alt.as_deref()),
            None => String::new(),
        }
    });
    IMG.replace_all(&text, |caps: &Captures<'_>| {
        let attrs = &caps[1];
        match SRC.captures(attrs) {
            Some(src) => {
                let alt = ALT.captures(attrs).map(|c| c[1].to_string());
                image_markup(&src[1], alt.as_deref())
            }
            None => String::new(),
        }
    })
    .into_owned()
}

static LI_OPEN_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| re(r"(<li\b[^>]*>)\s*<p\b[^>]*>"));
static LI_CLOSE_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| re(r"</p>\s*(</li>)"));
static LI_TRAILING_BREAK: LazyLock<Regex> = LazyLock::new(|| re(r"(?:<br\b[^>]*/?>\s*)+(</li>)"));
static LIST_TAG: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)<(/?)(ul|ol|li)\b[^>]*>"));

#[derive(Clone, Copy, PartialEq)]
enum ListKind {
    Bullet,
    Numbered,
}

fn list_marker(stack: &[ListKind]) -> String {
    if stack.is_empty() {
        return "*".to_string();
    }
    let mut marker: String = stack
        .iter()
        .map(|k| match k {
            ListKind::Bullet => '*',
            ListKind::Numbered => '1',
        })
        .collect();
    if stack.contains(&ListKind::Numbered) {
        marker.push('.');
    }
    marker
}

/// Nesting depth is kept; only the marker syntax changes. Line breaks inside an
/// item become `\\` so the item stays on its line.
fn lists(text: &str) -> String {
    let text = LI_OPEN_PARAGRAPH.replace_all(text, "${1}");
    let text = LI_CLOSE_PARAGRAPH.replace_all(&text, "${1}");
    let text = LI_TRAILING_BREAK.replace_all(&text, "${1}");
    let text = cell_lists(&text);

    let mut out = String::with_capacity(text.len());
    let mut stack: Vec<ListKind> = Vec::new();
    let mut after_item_open = false;
    let mut last = 0;
    for caps in LIST_TAG.captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        let segment = &text[last..whole.start()];
        let segment = if stack.is_empty() {
            Cow::Borrowed(segment)
        } else {
            BR.replace_all(segment, r"\\")
        };
        let segment = segment.as_ref();
        last = whole.end();
        if after_item_open {
            out.push_str(segment.trim_start());
        } else if stack.is_empty() || !segment.trim().is_empty() {
            out.push_str(segment);
        }
        after_item_open = false;

        let closing = !caps[1].is_empty();
        match (closing, caps[2].to_ascii_lowercase().as_str()) {
            (false, tag @ ("ul" | "ol")) => {
                if stack.is_empty() {
                    out.push('\n');
                }
                stack.push(if tag == "ol" { ListKind::Numbered } else { ListKind::Bullet });
            }
            (true, "ul") | (true, "ol") => {
                stack.pop();
                if stack.is_empty() {
                    out.push_str("\n\n");
                }
            }
            (false, _) => {
                out.push('\n');
                out.push_str(&list_marker(&stack));
                out.push(' ');
                after_item_open = true;
            }
            (true, _) => {}
        }
    }
    let rest = &text[last..];
    out.push_str(if after_item_open { rest.trim_start() } else { rest });
    out
}

/// A list inside a table cell cannot keep its line structure, so its items are
/// joined with `\\` line breaks and lose their markers.
fn cell_lists(text: &str) -> String {
    CELL.replace_all(text, |caps: &Captures<'_>| {
        let (Some(whole), Some(content)) = (caps.get(0), caps.get(2)) else {
            return caps[0].to_string();
        };
        if !LIST_TAG.is_match(content.as_str()) {
            return whole.as_str().to_string();
        }
        let items: Vec<String> = LIST_TAG
            .split(content.as_str())
            .map(|piece| BR.replace_all(piece, " ").trim().to_string())
            .filter(|piece| !strip_tags(piece).trim().is_empty())
            .collect();
        let (start, end) = (content.start() - whole.start(), content.end() - whole.start());
        format!(
            "{}{}{}",
            &whole.as_str()[..start],
            items.join(r"\\"),
            &whole.as_str()[end..]
        )
    })
    .into_owned()
}

static TABLE: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<table\b[^>]*>(.*?)</table>"));
static ROW: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<tr\b[^>]*>(.*?)</tr>"));
static CELL: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<(th|td)\b[^>]*>(.*?)</t[hd]>"));
static CELL_BREAKS: LazyLock<Regex> = LazyLock::new(|| re(r"<p\b[^>]*>|</p>|<br\s*/?>"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| re(r"\s+"));

/// One physical line per row; header cells get `|=`, body cells `|`.
fn tables(text: &str, stash: &mut Stash) -> String {
    TABLE
        .replace_all(text, |caps: &Captures<'_>| {
            let mut rows: Vec<String> = Vec::new();
            for row in ROW.captures_iter(&caps[1]) {
                let mut line = String::new();
                for cell in CELL.captures_iter(&row[1]) {
                    let marker = if cell[1].eq_ignore_ascii_case("th") { "|=" } else { "|" };
                    let content = CELL_BREAKS.replace_all(&cell[2], " ");
                    let content = WHITESPACE.replace_all(&content, " ");
                    let content = inline_code_blocks(content.trim(), stash);
                    line.push_str(marker);
                    line.push_str(&content);
                }
                if !line.is_empty() {
                    rows.push(line);
                }
            }
            format!("\n\n{}\n\n", rows.join("\n"))
        })
        .into_owned()
}

static TOKEN: LazyLock<Regex> = LazyLock::new(|| re("\u{E000}([0-9]+)\u{E001}"));
static CODE_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)\A\{\{code\b[^\n]*\}\}\n(.*)\n\{\{/code\}\}\z"));

/// A stashed code block inside a cell becomes inline monospace: one verbatim
/// span per line, joined with `\\`.
fn inline_code_blocks(cell: &str, stash: &mut Stash) -> String {
    TOKEN
        .replace_all(cell, |caps: &Captures<'_>| {
            let code = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| stash.fragment(idx))
                .and_then(|fragment| CODE_FRAGMENT.captures(fragment))
                .map(|c| {
                    c[1].lines()
                        .filter(|l| !l.trim().is_empty())
                        .map(|l| format!("{{{{{{{l}}}}}}}"))
                        .collect::<Vec<_>>()
                        .join(r"\\")
                });
            match code {
                Some(code) => stash.put(format!("##{code}##")),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

static BR: LazyLock<Regex> = LazyLock::new(|| re(r"<br\b[^>]*/?>"));
static HR: LazyLock<Regex> = LazyLock::new(|| re(r"<hr\b[^>]*/?>"));
static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<p\b[^>]*>(.*?)</p>"));

fn breaks_and_paragraphs(text: &str) -> String {
    let text = BR.replace_all(text, "\n");
    let text = HR.replace_all(&text, "\n\n----\n\n");
    PARAGRAPH.replace_all(&text, "\n\n${1}\n\n").into_owned()
}

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| re(r"<[^<>]+>"));

fn strip_tags(text: &str) -> String {
    ANY_TAG.replace_all(text, "").into_owned()
}
