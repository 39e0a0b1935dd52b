//! Plain-text extraction for uploaded training files.
//!
//! Supports PDF (via `pdf-extract`), the OOXML family (DOCX, PPTX, XLSX; ZIP
//! archives read with `zip` and parsed with `quick-xml`), and any `text/*`
//! type decoded as UTF-8. Content types come from the upload header or, when
//! absent or generic, from the file extension ([`content_type_for`]).

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Zip-bomb guard: largest decompressed size read from one archive entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document extraction failed: {0}")]
    Ooxml(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
}

/// Guess a content type from a file name's extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        "md" | "markdown" => MIME_MARKDOWN,
        "csv" => MIME_CSV,
        "txt" | "text" | "log" | "rst" => MIME_TEXT,
        _ => MIME_OCTET_STREAM,
    }
}

/// Pick the effective content type for an upload: a specific declared type
/// wins; a missing or generic one falls back to the extension.
pub fn resolve_content_type(declared: Option<&str>, filename: &str) -> String {
    let declared = declared
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != MIME_OCTET_STREAM);
    declared.unwrap_or_else(|| content_type_for(filename).to_string())
}

pub fn is_markdown(content_type: &str) -> bool {
    content_type == MIME_MARKDOWN
}

/// Extract plain text from `bytes` of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        ct if ct.starts_with("text/") => {
            let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::NotUtf8)?;
            Ok(text.trim_start_matches('\u{feff}').to_string())
        }
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn ooxml_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

/// An OOXML container with bounded entry reads.
struct Package<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    fn open(bytes: &'a [u8]) -> Result<Self, ExtractError> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(ooxml_err)?;
        Ok(Self { archive })
    }

    fn has(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>, ExtractError> {
        let entry = self
            .archive
            .by_name(name)
            .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
        let mut out = Vec::new();
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut out)
            .map_err(ooxml_err)?;
        if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ExtractError::Ooxml(format!(
                "{} exceeds size limit ({} bytes)",
                name, MAX_XML_ENTRY_BYTES
            )));
        }
        Ok(out)
    }

    /// Entry names `{prefix}N.xml`, ordered by `N`.
    fn numbered(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<(u32, String)> = self
            .archive
            .file_names()
            .filter_map(|n| {
                let number = n.strip_prefix(prefix)?.strip_suffix(".xml")?;
                Some((number.parse().unwrap_or(u32::MAX), n.to_string()))
            })
            .collect();
        names.sort();
        names.into_iter().map(|(_, n)| n).collect()
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut package = Package::open(bytes)?;
    if !package.has("word/document.xml") {
        return Err(ExtractError::Ooxml("word/document.xml not found".to_string()));
    }
    let xml = package.read("word/document.xml")?;
    paragraph_text(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut package = Package::open(bytes)?;
    let mut slides = Vec::new();
    for name in package.numbered("ppt/slides/slide") {
        let text = paragraph_text(&package.read(&name)?)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

/// Collect `<t>` runs, one line per `<p>` paragraph. Works for both
/// WordprocessingML (`w:`) and DrawingML (`a:`) since only local names are
/// compared.
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                current.push_str(&te.unescape().map_err(ooxml_err)?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        paragraphs.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut package = Package::open(bytes)?;
    let shared_strings = if package.has("xl/sharedStrings.xml") {
        read_shared_strings(&package.read("xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let mut sheets = Vec::new();
    for name in package
        .numbered("xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let text = sheet_rows(&package.read(&name)?, &shared_strings)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n\n"))
}

/// Each `<si>` entry's concatenated `<t>` runs (rich text has several).
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(ooxml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of a worksheet, space-separated within a row and one row per
/// line. Shared-string cells are resolved; inline strings and numbers are
/// kept as written.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut shared = false;
    let mut in_value = false;
    let mut cells = 0usize;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    while cells < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().map_err(ooxml_err)?;
                let value = raw.trim();
                let resolved = if value.is_empty() {
                    None
                } else if shared {
                    value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i))
                        .cloned()
                } else {
                    Some(value.to_string())
                };
                if let Some(v) = resolved {
                    row.push(v);
                    cells += 1;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join(" "));
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" "));
    }
    Ok(rows.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for("Manual.PDF"), MIME_PDF);
        assert_eq!(content_type_for("notes.md"), MIME_MARKDOWN);
        assert_eq!(content_type_for("deck.pptx"), MIME_PPTX);
        assert_eq!(content_type_for("faq.txt"), MIME_TEXT);
        assert_eq!(content_type_for("binary"), MIME_OCTET_STREAM);
    }

    #[test]
    fn declared_type_wins_unless_generic() {
        assert_eq!(
            resolve_content_type(Some("text/plain; charset=utf-8"), "a.pdf"),
            "text/plain"
        );
        assert_eq!(resolve_content_type(Some(MIME_OCTET_STREAM), "a.pdf"), MIME_PDF);
        assert_eq!(resolve_content_type(None, "a.docx"), MIME_DOCX);
    }

    #[test]
    fn text_types_decode_utf8() {
        assert_eq!(extract_text("\u{feff}héllo".as_bytes(), "text/plain").unwrap(), "héllo");
        assert!(matches!(
            extract_text(&[0xff, 0xfe, 0xfd], "text/csv"),
            Err(ExtractError::NotUtf8)
        ));
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "image/png").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Opening hours</w:t></w:r><w:r><w:t xml:space="preserve"> are 9 to 5.</w:t></w:r></w:p><w:p><w:r><w:t>Closed &amp; quiet on Sundays.</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", xml)]);
        assert_eq!(
            extract_text(&bytes, MIME_DOCX).unwrap(),
            "Opening hours are 9 to 5.\nClosed & quiet on Sundays."
        );
    }

    #[test]
    fn docx_without_document_xml_fails() {
        let bytes = zip_with(&[("word/other.xml", "<x/>")]);
        assert!(matches!(extract_text(&bytes, MIME_DOCX), Err(ExtractError::Ooxml(_))));
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |t: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:cSld></p:sld>"#,
                t
            )
        };
        let s1 = slide("first");
        let s2 = slide("second");
        let s10 = slide("tenth");
        let bytes = zip_with(&[
            ("ppt/slides/slide10.xml", &s10),
            ("ppt/slides/slide2.xml", &s2),
            ("ppt/slides/slide1.xml", &s1),
        ]);
        assert_eq!(extract_text(&bytes, MIME_PPTX).unwrap(), "first\n\nsecond\n\ntenth");
    }

    #[test]
    fn xlsx_resolves_shared_strings_and_numbers() {
        let shared = r#"<sst><si><t>Plan</t></si><si><r><t>Price</t></r><r><t> (EUR)</t></r></si><si><t>Basic</t></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>9.5</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_with(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(
            extract_text(&bytes, MIME_XLSX).unwrap(),
            "Plan Price (EUR)\nBasic 9.5"
        );
    }

    #[test]
    fn xlsx_without_shared_strings() {
        let sheet = r#"<worksheet><sheetData><row><c t="inlineStr"><is><t>inline</t></is></c><c><v>42</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_with(&[("xl/worksheets/sheet1.xml", sheet)]);
        assert_eq!(extract_text(&bytes, MIME_XLSX).unwrap(), "inline 42");
    }
}
