//! Markup rewriting: source dialects to canonical XWiki 2.1 markup.
//!
//! Each dialect is converted by an explicit, ordered pipeline of pure
//! string-to-string stages. Ordering invariants:
//!
//! - Anything that must come out verbatim (code blocks, inline code, and in
//!   Markdown also links, images and list markers) is moved into a [`Stash`]
//!   as soon as it is recognised. Later stages only ever see an opaque token,
//!   so emphasis markers inside code can never be rewritten.
//! - Bold is matched before italic wherever the two share a marker character.
//! - Remaining tags are stripped before entities are decoded, so decoded text
//!   can never be mistaken for markup.
//! - Blank-line collapsing runs last and only on stashed-out text.
//!
//! The rewriter is total: it never fails and never drops text wholesale.
//! Unmappable constructs lose their decoration and keep their inner text.

mod confluence;
mod docx;
mod entities;
mod markdown;

use regex::Regex;
use std::sync::LazyLock;

use crate::contract::{Dialect, DocumentBody, Paragraph};
use crate::error::MigrationError;

pub use entities::decode_entities;

/// Convert `body`, written in `dialect`, into canonical markup.
///
/// For [`Dialect::DocxParagraphs`] the text is read as one unstyled paragraph
/// per line.
pub fn rewrite(body: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::ConfluenceStorage => confluence::rewrite(body),
        Dialect::Markdown => markdown::rewrite(body),
        Dialect::DocxParagraphs => docx::rewrite_plain(body),
    }
}

/// Convert a Word paragraph stream into canonical markup.
pub fn rewrite_paragraphs(paragraphs: &[Paragraph]) -> String {
    docx::rewrite_paragraphs(paragraphs)
}

/// Convert a document body in its declared dialect.
///
/// The only failure is a paragraph stream declared as a markup dialect: there is
/// no text to rewrite.
pub fn rewrite_body(body: &DocumentBody, dialect: Dialect) -> Result<String, MigrationError> {
    match (body, dialect) {
        (DocumentBody::Markup(text), dialect) => Ok(rewrite(text, dialect)),
        (DocumentBody::Paragraphs(paragraphs), Dialect::DocxParagraphs) => {
            Ok(rewrite_paragraphs(paragraphs))
        }
        (DocumentBody::Paragraphs(_), dialect) => Err(MigrationError::Transform(format!(
            "paragraph stream cannot be read as {dialect} markup"
        ))),
    }
}

const TOKEN_OPEN: char = '\u{E000}';
const TOKEN_CLOSE: char = '\u{E001}';

/// Holds finished canonical fragments out of reach of later stages.
#[derive(Default)]
pub(crate) struct Stash {
    fragments: Vec<String>,
}

impl Stash {
    /// Store a fragment and return the token that stands in for it.
    pub(crate) fn put(&mut self, fragment: String) -> String {
        let token = format!("{TOKEN_OPEN}{}{TOKEN_CLOSE}", self.fragments.len());
        self.fragments.push(fragment);
        token
    }

    pub(crate) fn fragment(&self, index: usize) -> Option<&str> {
        self.fragments.get(index).map(String::as_str)
    }

    /// Replace every token with its fragment. Fragments may contain tokens of
    /// fragments stashed before them, so restoration runs newest first.
    pub(crate) fn restore(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (idx, fragment) in self.fragments.iter().enumerate().rev() {
            let token = format!("{TOKEN_OPEN}{idx}{TOKEN_CLOSE}");
            out = out.replace(&token, fragment);
        }
        out
    }
}

/// Input must never contain token delimiters of its own.
pub(crate) fn strip_token_delimiters(text: &str) -> String {
    text.chars()
        .filter(|c| *c != TOKEN_OPEN && *c != TOKEN_CLOSE)
        .collect()
}

static WHITESPACE_ONLY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]+$").expect("valid regex"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Collapse runs of blank lines to a single blank line and trim the ends.
pub(crate) fn collapse_blank_lines(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = WHITESPACE_ONLY_LINE.replace_all(&text, "");
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Quote a macro parameter value (XWiki escapes with `~`).
pub(crate) fn quote_param(value: &str) -> String {
    value.replace('~', "~~").replace('"', "~\"")
}

/// Canonical image embed with optional alt text.
pub(crate) fn image_markup(reference: &str, alt: Option<&str>) -> String {
    match alt.map(str::trim).filter(|a| !a.is_empty()) {
        Some(alt) => format!("[[image:{reference}||alt=\"{}\"]]", quote_param(alt)),
        None => format!("[[image:{reference}]]"),
    }
}

/// Canonical code block; the language is only emitted when the source had one.
pub(crate) fn code_block_markup(language: Option<&str>, code: &str) -> String {
    let code = code.trim_matches('\n');
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(lang) => format!("{{{{code language=\"{}\"}}}}\n{code}\n{{{{/code}}}}", quote_param(lang)),
        None => format!("{{{{code}}}}\n{code}\n{{{{/code}}}}"),
    }
}

/// Canonical link; an absent label reuses the target.
pub(crate) fn link_markup(label: &str, target: &str) -> String {
    let label = label.trim();
    if label.is_empty() {
        format!("[[{target}>>{target}]]")
    } else {
        format!("[[{label}>>{target}]]")
    }
}

/// Canonical heading line of the given depth (1..=6).
pub(crate) fn heading_markup(level: usize, text: &str) -> String {
    let marks = "=".repeat(level.clamp(1, 6));
    format!("{marks} {} {marks}", text.trim())
}
