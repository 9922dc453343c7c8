use std::io::{Cursor, Write};
use wikibridge_core::docx::{read_docx, DocxError};
use wikibridge_core::rewrite::rewrite_paragraphs;

const STYLES: &str = r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/></w:style>
<w:style w:type="paragraph" w:styleId="ListParagraph"><w:name w:val="List Paragraph"/></w:style>
</w:styles>"#;

const DOCUMENT: &str = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Release Notes</w:t></w:r></w:p>
<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Important</w:t></w:r><w:r><w:t xml:space="preserve"> text</w:t></w:r></w:p>
<w:p/>
<w:p/>
<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Changes</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="ListParagraph"/></w:pPr><w:r><w:t>Faster sync</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="ListParagraph"/></w:pPr><w:r><w:t>Fewer retries</w:t></w:r></w:p>
<w:p><w:r><w:rPr><w:b/><w:i/></w:rPr><w:t>Both</w:t></w:r><w:r><w:br/><w:t>next &amp; last</w:t></w:r></w:p>
<w:sectPr/>
</w:body></w:document>"#;

fn build_docx(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn word_document_renders_to_canonical_markup() {
    let bytes = build_docx(&[("word/styles.xml", STYLES), ("word/document.xml", DOCUMENT)]);
    let paragraphs = read_docx(&bytes).expect("valid docx");
    assert_eq!(paragraphs.len(), 8);
    assert_eq!(paragraphs[0].style, "heading 1");
    assert_eq!(paragraphs[5].style, "List Paragraph");

    assert_eq!(
        rewrite_paragraphs(&paragraphs),
        "= Release Notes =\n**Important** text\n\n== Changes ==\n* Faster sync\n* Fewer retries\n**//Both//**\nnext & last"
    );
}

#[test]
fn missing_styles_part_keeps_style_ids() {
    let bytes = build_docx(&[("word/document.xml", DOCUMENT)]);
    let paragraphs = read_docx(&bytes).expect("styles part is optional");
    assert_eq!(paragraphs[0].style, "Heading1");
    assert_eq!(paragraphs[5].style, "ListParagraph");
    // "Heading1" does not contain "heading 1", so it renders as body text.
    assert!(rewrite_paragraphs(&paragraphs).starts_with("Release Notes\n"));
}

#[test]
fn missing_document_part_is_reported() {
    let bytes = build_docx(&[("word/styles.xml", STYLES)]);
    assert!(matches!(read_docx(&bytes), Err(DocxError::MissingPart("word/document.xml"))));
}

#[test]
fn malformed_document_xml_is_an_xml_error() {
    let bytes = build_docx(&[("word/document.xml", "<w:document><w:body><w:p></w:body>")]);
    let err = read_docx(&bytes).unwrap_err();
    assert!(matches!(err, DocxError::Xml { .. }), "got {err:?}");
}
