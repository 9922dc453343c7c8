//! Markdown (README-style, CommonMark subset) to canonical markup.
//!
//! Fenced code, inline code, escapes, images, links and list markers are all
//! stashed before emphasis runs, because every one of them can contain `*` or `_`.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::{
    code_block_markup, collapse_blank_lines, decode_entities, heading_markup, image_markup,
    link_markup, strip_token_delimiters, Stash,
};

pub(crate) fn rewrite(body: &str) -> String {
    let mut stash = Stash::default();
    let text = strip_token_delimiters(&body.replace("\r\n", "\n"));
    let text = fenced_code(&text, &mut stash);
    let text = inline_code(&text, &mut stash);
    let text = escapes(&text, &mut stash);
    let text = headings(&text);
    let text = horizontal_rules(&text);
    let text = images(&text, &mut stash);
    let text = links(&text, &mut stash);
    let text = tables(&text);
    let text = lists(&text, &mut stash);
    let text = emphasis(&text);
    let text = html(&text);
    let text = decode_entities(&text);
    let text = collapse_blank_lines(&text);
    stash.restore(&text)
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| re(r"^ {0,3}(`{3,}|~{3,})[ \t]*([^`\s]*)"));

/// Fences close on a line of the same character at least as long as the opener;
/// an unclosed fence runs to the end of the document.
fn fenced_code(text: &str, stash: &mut Stash) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(caps) = FENCE.captures(line) else {
            out.push(line.to_string());
            continue;
        };
        let fence = caps[1].to_string();
        let language = caps[2].to_string();
        let fence_char = fence.chars().next().unwrap_or('`');
        let mut code: Vec<&str> = Vec::new();
        for inner in lines.by_ref() {
            let trimmed = inner.trim();
            if trimmed.len() >= fence.len() && trimmed.chars().all(|c| c == fence_char) {
                break;
            }
            code.push(inner);
        }
        let language = (!language.is_empty()).then_some(language.as_str());
        out.push(String::new());
        out.push(stash.put(code_block_markup(language, &code.join("\n"))));
        out.push(String::new());
    }
    out.join("\n")
}

static DOUBLE_TICK_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"``[ ]?([^`\n](?:[^\n]*?[^`\n])?)[ ]?``"));
static SINGLE_TICK_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"`([^`\n]+)`"));

fn inline_code(text: &str, stash: &mut Stash) -> String {
    let text = DOUBLE_TICK_CODE.replace_all(text, |caps: &Captures<'_>| stash.put(format!("##{}##", &caps[1])));
    SINGLE_TICK_CODE
        .replace_all(&text, |caps: &Captures<'_>| stash.put(format!("##{}##", &caps[1])))
        .into_owned()
}

static ESCAPE: LazyLock<Regex> = LazyLock::new(|| re(r"\\([\\`*_{}\[\]()#+\-.!~|<>])"));

fn escapes(text: &str, stash: &mut Stash) -> String {
    ESCAPE
        .replace_all(text, |caps: &Captures<'_>| stash.put(caps[1].to_string()))
        .into_owned()
}

static ATX_HEADING: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^ {0,3}(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$"));

fn headings(text: &str) -> String {
    ATX_HEADING
        .replace_all(text, |caps: &Captures<'_>| heading_markup(caps[1].len(), &caps[2]))
        .into_owned()
}

static RULE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?m)^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
});

fn horizontal_rules(text: &str) -> String {
    RULE.replace_all(text, "----").into_owned()
}

/// Link and image targets may hold one level of balanced parentheses.
const TARGET: &str = r"((?:[^()\s>]|\([^()\s>]*\))+)";

static IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(r#"!\[([^\]\n]*)\]\(\s*<?{TARGET}>?(?:\s+"[^"]*")?\s*\)"#))
});

fn images(text: &str, stash: &mut Stash) -> String {
    IMAGE
        .replace_all(text, |caps: &Captures<'_>| {
            stash.put(image_markup(&caps[2], Some(&caps[1])))
        })
        .into_owned()
}

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(r#"\[([^\]\n]*)\]\(\s*<?{TARGET}>?(?:\s+"[^"]*")?\s*\)"#))
});
static AUTOLINK: LazyLock<Regex> = LazyLock::new(|| re(r"<((?:https?|ftp|mailto):[^<>\s]+)>"));

fn links(text: &str, stash: &mut Stash) -> String {
    let text = LINK.replace_all(text, |caps: &Captures<'_>| {
        let label = emphasis(&caps[1]);
        stash.put(link_markup(&label, &caps[2]))
    });
    AUTOLINK
        .replace_all(&text, |caps: &Captures<'_>| stash.put(link_markup("", &caps[1])))
        .into_owned()
}

static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| re(r"^\s*\|?\s*:?-+:?\s*(?:\|\s*:?-+:?\s*)+\|?\s*$|^\s*\|\s*:?-+:?\s*\|\s*$"));

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(|c| c.trim().to_string()).collect()
}

/// A pipe row followed by a dash separator starts a table; it continues while
/// lines carry pipes.
fn tables(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        let is_header = line.contains('|')
            && lines
                .get(idx + 1)
                .is_some_and(|next| TABLE_SEPARATOR.is_match(next));
        if !is_header {
            out.push(line.to_string());
            idx += 1;
            continue;
        }
        out.push(split_row(line).iter().map(|c| format!("|={c}")).collect());
        idx += 2;
        while idx < lines.len() && lines[idx].contains('|') && !lines[idx].trim().is_empty() {
            out.push(split_row(lines[idx]).iter().map(|c| format!("|{c}")).collect());
            idx += 1;
        }
    }
    out.join("\n")
}

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| re(r"^([ \t]*)([-*+]|\d{1,9}[.)])[ \t]+(.*)$"));

#[derive(Clone, Copy, PartialEq)]
enum ListKind {
    Bullet,
    Numbered,
}

fn indent_width(indent: &str) -> usize {
    indent.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum()
}

/// Indentation levels become repeated markers (`**`, `11.`); the number of
/// levels is unchanged.
fn lists(text: &str, stash: &mut Stash) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut stack: Vec<(usize, ListKind)> = Vec::new();
    for line in text.lines() {
        let Some(caps) = LIST_ITEM.captures(line) else {
            if !line.trim().is_empty() && !line.starts_with([' ', '\t']) {
                stack.clear();
            }
            out.push(line.to_string());
            continue;
        };
        let width = indent_width(&caps[1]);
        let kind = if caps[2].starts_with(['-', '*', '+']) {
            ListKind::Bullet
        } else {
            ListKind::Numbered
        };
        while stack.last().is_some_and(|(w, _)| *w > width) {
            stack.pop();
        }
        match stack.last_mut() {
            Some((w, k)) if *w == width => *k = kind,
            _ => stack.push((width, kind)),
        }
        let mut marker: String = stack
            .iter()
            .map(|(_, k)| if *k == ListKind::Bullet { '*' } else { '1' })
            .collect();
        if stack.iter().any(|(_, k)| *k == ListKind::Numbered) {
            marker.push('.');
        }
        out.push(format!("{} {}", stash.put(marker), &caps[3]));
    }
    out.join("\n")
}

static BOLD_ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| re(r"\*\*\*([^*\n]+?)\*\*\*"));
static BOLD_ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| re(r"\b___([^_\n]+?)___\b"));
static BOLD_STAR: LazyLock<Regex> = LazyLock::new(|| re(r"\*\*([^*\n]+?)\*\*"));
static BOLD_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| re(r"\b__([^_\n]+?)__\b"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| re(r"~~([^~\n]+?)~~"));
// Italic never starts or ends next to another marker of the same kind, so it
// cannot match inside a bold run.
static ITALIC_STAR: LazyLock<Regex> =
    LazyLock::new(|| re(r"(^|[^*\w])\*([^*\s](?:[^*\n]*[^*\s])?)\*($|[^*\w])"));
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(^|[^_\w])_([^_\s](?:[^_\n]*[^_\s])?)_($|[^_\w])"));

/// Bold before italic; canonical bold (`**`) is a fixed point.
fn emphasis(text: &str) -> String {
    let text = BOLD_ITALIC_STAR.replace_all(text, "**//${1}//**");
    let text = BOLD_ITALIC_UNDERSCORE.replace_all(&text, "**//${1}//**");
    let text = BOLD_STAR.replace_all(&text, "**${1}**");
    let text = BOLD_UNDERSCORE.replace_all(&text, "**${1}**");
    let text = STRIKE.replace_all(&text, "--${1}--");
    let text = replace_until_stable(&ITALIC_STAR, &text);
    replace_until_stable(&ITALIC_UNDERSCORE, &text)
}

/// Adjacent spans share a boundary character, so one pass can miss the second.
/// Every replacement removes two markers, which bounds the loop.
fn replace_until_stable(pattern: &Regex, text: &str) -> String {
    let mut out = text.to_string();
    while pattern.is_match(&out) {
        out = pattern.replace_all(&out, "${1}//${2}//${3}").into_owned();
    }
    out
}

static HTML_IMG: LazyLock<Regex> = LazyLock::new(|| re(r"<img\b([^>]*?)/?>"));
static SRC: LazyLock<Regex> = LazyLock::new(|| re(r#"\bsrc="([^"]*)""#));
static ALT: LazyLock<Regex> = LazyLock::new(|| re(r#"\balt="([^"]*)""#));
static HTML_BR: LazyLock<Regex> = LazyLock::new(|| re(r"<br\s*/?>"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| re(r"</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>"));

/// Inline HTML: images and breaks are mapped, other tags lose their decoration.
fn html(text: &str) -> String {
    let text = HTML_IMG.replace_all(text, |caps: &Captures<'_>| match SRC.captures(&caps[1]) {
        Some(src) => {
            let alt = ALT.captures(&caps[1]).map(|c| c[1].to_string());
            image_markup(&src[1], alt.as_deref())
        }
        None => String::new(),
    });
    let text = HTML_BR.replace_all(&text, "\n");
    HTML_TAG.replace_all(&text, "").into_owned()
}
