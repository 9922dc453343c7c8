//! Word paragraph streams to canonical markup.

use super::{collapse_blank_lines, heading_markup};
use crate::contract::{Paragraph, Run};

/// Style-name substrings checked in order; the first hit decides the line shape.
enum LineShape {
    Heading(usize),
    Bullet,
    Body,
}

fn shape_of(style: &str) -> LineShape {
    let style = style.to_lowercase();
    if style.contains("heading 1") {
        LineShape::Heading(1)
    } else if style.contains("heading 2") {
        LineShape::Heading(2)
    } else if style.contains("heading 3") {
        LineShape::Heading(3)
    } else if style.contains("list") {
        LineShape::Bullet
    } else {
        LineShape::Body
    }
}

/// Markers wrap only the trimmed core; surrounding spaces stay outside them.
fn render_run(run: &Run) -> Option<String> {
    if run.text.is_empty() {
        return None;
    }
    let core = run.text.trim();
    if core.is_empty() || !(run.bold || run.italic) {
        return Some(run.text.clone());
    }
    let start = run.text.len() - run.text.trim_start().len();
    let (lead, trail) = (&run.text[..start], &run.text[start + core.len()..]);
    Some(match (run.bold, run.italic) {
        (true, true) => format!("{lead}**//{core}//**{trail}"),
        (true, false) => format!("{lead}**{core}**{trail}"),
        _ => format!("{lead}//{core}//{trail}"),
    })
}

fn render_paragraph(paragraph: &Paragraph) -> String {
    let text = paragraph.text();
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    match shape_of(&paragraph.style) {
        LineShape::Heading(level) => heading_markup(level, text),
        LineShape::Bullet => format!("* {text}"),
        LineShape::Body => {
            let parts: String = paragraph.runs.iter().filter_map(render_run).collect();
            if parts.trim().is_empty() {
                text.to_string()
            } else {
                parts.trim().to_string()
            }
        }
    }
}

pub(crate) fn rewrite_paragraphs(paragraphs: &[Paragraph]) -> String {
    let lines: Vec<String> = paragraphs.iter().map(render_paragraph).collect();
    collapse_blank_lines(&lines.join("\n"))
}

/// Plain text read as one unstyled paragraph per line.
pub(crate) fn rewrite_plain(text: &str) -> String {
    let paragraphs: Vec<Paragraph> = text
        .lines()
        .map(|line| Paragraph {
            style: String::new(),
            runs: vec![Run::plain(line)],
        })
        .collect();
    rewrite_paragraphs(&paragraphs)
}
