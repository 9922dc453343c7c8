//! Word (OOXML) reader producing the paragraph stream the rewriter consumes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::contract::{Paragraph, Run};

/// Maximum decompressed bytes read from a single zip entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";

#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("not a docx archive: {0}")]
    Archive(String),
    #[error("missing part {0}")]
    MissingPart(&'static str),
    #[error("zip entry {name} exceeds size limit ({limit} bytes)")]
    TooLarge { name: &'static str, limit: u64 },
    #[error("malformed xml in {part}: {message}")]
    Xml { part: &'static str, message: String },
}

/// Read every body paragraph of a `.docx` file, in document order.
///
/// Style ids are resolved to style names through `word/styles.xml`; a missing
/// styles part or an unknown id keeps the id itself.
pub fn read_docx(bytes: &[u8]) -> Result<Vec<Paragraph>, DocxError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| DocxError::Archive(e.to_string()))?;
    let document = read_entry(&mut archive, DOCUMENT_PART)?.ok_or(DocxError::MissingPart(DOCUMENT_PART))?;
    let styles = match read_entry(&mut archive, STYLES_PART)? {
        Some(xml) => style_names(&xml)?,
        None => HashMap::new(),
    };
    paragraphs(&document, &styles)
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &'static str,
) -> Result<Option<Vec<u8>>, DocxError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(DocxError::Archive(e.to_string())),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| DocxError::Archive(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(DocxError::TooLarge {
            name,
            limit: MAX_XML_ENTRY_BYTES,
        });
    }
    Ok(Some(out))
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// `<w:b/>` switches on; `w:val="0"`, `"false"` or `"none"` switches off.
fn toggle_on(e: &BytesStart<'_>) -> bool {
    !matches!(attr(e, b"val").as_deref(), Some("0" | "false" | "none"))
}

fn style_names(xml: &[u8]) -> Result<HashMap<String, String>, DocxError> {
    let mut names = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"style" => {
                current = attr(&e, b"styleId");
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"name" => {
                if let (Some(id), Some(name)) = (&current, attr(&e, b"val")) {
                    names.insert(id.clone(), name);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"style" => current = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocxError::Xml {
                    part: STYLES_PART,
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

#[derive(Default)]
struct Walk {
    paragraph: Option<Paragraph>,
    run: Option<Run>,
    in_run_props: bool,
    in_text: bool,
}

impl Walk {
    fn element(&mut self, e: &BytesStart<'_>, styles: &HashMap<String, String>) {
        match e.local_name().as_ref() {
            b"pStyle" => {
                if let (Some(paragraph), Some(id)) = (self.paragraph.as_mut(), attr(e, b"val")) {
                    paragraph.style = styles.get(&id).cloned().unwrap_or(id);
                }
            }
            b"b" if self.in_run_props => {
                if let Some(run) = self.run.as_mut() {
                    run.bold = toggle_on(e);
                }
            }
            b"i" if self.in_run_props => {
                if let Some(run) = self.run.as_mut() {
                    run.italic = toggle_on(e);
                }
            }
            b"tab" if !self.in_run_props => self.push_text("\t"),
            b"br" | b"cr" => self.push_text("\n"),
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(run) = self.run.as_mut() {
            run.text.push_str(text);
        }
    }

    fn close_run(&mut self) {
        if let (Some(run), Some(paragraph)) = (self.run.take(), self.paragraph.as_mut()) {
            paragraph.runs.push(run);
        }
        self.in_run_props = false;
        self.in_text = false;
    }
}

fn paragraphs(xml: &[u8], styles: &HashMap<String, String>) -> Result<Vec<Paragraph>, DocxError> {
    let mut out = Vec::new();
    let mut walk = Walk::default();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => walk.paragraph = Some(Paragraph::default()),
                b"r" => walk.run = Some(Run::default()),
                b"rPr" if walk.run.is_some() => walk.in_run_props = true,
                b"t" if walk.run.is_some() => walk.in_text = true,
                _ => walk.element(&e, styles),
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => out.push(Paragraph::default()),
                _ => walk.element(&e, styles),
            },
            Ok(Event::Text(t)) if walk.in_text => {
                let text = t.unescape().map_err(|e| DocxError::Xml {
                    part: DOCUMENT_PART,
                    message: e.to_string(),
                })?;
                walk.push_text(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => walk.in_text = false,
                b"rPr" => walk.in_run_props = false,
                b"r" => walk.close_run(),
                b"p" => {
                    walk.close_run();
                    if let Some(paragraph) = walk.paragraph.take() {
                        out.push(paragraph);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocxError::Xml {
                    part: DOCUMENT_PART,
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
