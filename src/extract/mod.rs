// Text extraction for supported document formats


use fancy_regex::Regex;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use quick_xml::events::Event as XmlEvent;
use scraper::{ElementRef, Html, Node, Selector};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static EXCESS_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Basic facts about a source file
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub filename: String,
    /// Lowercase with leading dot, empty when the file has no extension
    pub extension: String,
    pub size_bytes: u64,
    /// Size in MiB rounded to two decimals
    pub size_mb: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    /// Cleaned text
    pub text: String,
    pub info: FileInfo,
}

#[inline]
pub fn file_info(path: &Path) -> Result<FileInfo, ExtractError> {
    let metadata = fs::metadata(path)?;
    let size_bytes = metadata.len();

    Ok(FileInfo {
        filename: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        extension: normalized_extension(path),
        size_bytes,
        size_mb: (size_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0,
    })
}

/// Lowercase extension of `path` including the leading dot
#[inline]
pub fn normalized_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Extract and clean the text of a supported document.
#[inline]
pub fn extract_document(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    let info = file_info(path)?;

    let raw = match info.extension.as_str() {
        ".txt" => extract_plain_text(path)?,
        ".md" | ".markdown" => markdown_to_text(&fs::read_to_string(path)?),
        ".html" | ".htm" => html_to_text(&String::from_utf8_lossy(&fs::read(path)?)),
        ".pdf" => extract_pdf(path)?,
        ".docx" => extract_docx(path)?,
        other => return Err(ExtractError::UnsupportedFormat(other.to_string())),
    };

    let text = clean_text(&raw);
    debug!(
        "Extracted {} characters from {}",
        text.chars().count(),
        path.display()
    );

    Ok(ExtractedDocument { text, info })
}

fn extract_plain_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            debug!(
                "{} is not valid UTF-8, decoding as Latin-1",
                path.display()
            );
            Ok(e.into_bytes().iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Render Markdown as plain text, keeping only the text of headings,
/// emphasis, links and code.
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(content) | Event::Code(content) => text.push_str(&content),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Start(Tag::Item) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                text.push_str("\n\n");
            }
            Event::End(TagEnd::Item) => text.push('\n'),
            Event::Rule => text.push_str("\n\n"),
            _ => {}
        }
    }

    text
}

/// Visible text of an HTML document, skipping scripts and styles.
#[inline]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());
    match body {
        Some(body) => collect_text(body, &mut raw),
        None => collect_text(document.root_element(), &mut raw),
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if matches!(name, "script" | "style" | "noscript" | "template") {
                    continue;
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    let block = matches!(
                        name,
                        "p" | "div" | "br" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                            | "section" | "article" | "pre" | "blockquote"
                    );
                    if block {
                        out.push('\n');
                    }
                    collect_text(child_element, out);
                    if block {
                        out.push('\n');
                    }
                }
            }
            _ => {}
        }
    }
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let document = lopdf::Document::load(path).map_err(|e| ExtractError::Extraction {
        path: path.to_path_buf(),
        reason: format!("failed to parse PDF: {}", e),
    })?;

    let mut pages_text = Vec::new();
    for (page_number, _) in document.get_pages() {
        match document.extract_text(&[page_number]) {
            Ok(text) if !text.trim().is_empty() => pages_text.push(text),
            Ok(_) => {}
            Err(e) => warn!(
                "Failed to extract text from page {} of {}: {}",
                page_number,
                path.display(),
                e
            ),
        }
    }

    Ok(pages_text.join("\n\n"))
}

fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let failed = |reason: String| ExtractError::Extraction {
        path: path.to_path_buf(),
        reason,
    };

    let mut archive = zip::ZipArchive::new(fs::File::open(path)?)
        .map_err(|e| failed(format!("not a DOCX archive: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| failed(format!("missing word/document.xml: {}", e)))?
        .read_to_string(&mut xml)?;

    docx_to_text(&xml).map_err(|e| failed(format!("malformed document.xml: {}", e)))
}

/// Text of a WordprocessingML body: non-empty body paragraphs, then one
/// line per table row with its non-empty cells joined by ` | `, all
/// separated by blank lines. Tables nested in cells and text boxes are
/// skipped.
#[inline]
pub fn docx_to_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = quick_xml::Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut table_depth = 0usize;
    let mut skip_depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            XmlEvent::Start(e) => match e.local_name().as_ref() {
                b"txbxContent" => skip_depth += 1,
                _ if skip_depth > 0 => {}
                b"tbl" => table_depth += 1,
                _ if table_depth > 1 => {}
                b"tr" => row.clear(),
                b"tc" => cell.clear(),
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            XmlEvent::End(e) => match e.local_name().as_ref() {
                b"txbxContent" => skip_depth = skip_depth.saturating_sub(1),
                _ if skip_depth > 0 => {}
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ if table_depth > 1 => {}
                b"t" => in_text = false,
                b"p" if table_depth == 0 => {
                    if !paragraph.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut paragraph));
                    }
                }
                b"p" => cell.push(std::mem::take(&mut paragraph)),
                b"tc" => {
                    let text = cell.join("\n");
                    if !text.trim().is_empty() {
                        row.push(text);
                    }
                }
                b"tr" if !row.is_empty() => rows.push(row.join(" | ")),
                _ => {}
            },
            XmlEvent::Empty(e) if skip_depth == 0 && table_depth <= 1 => {
                match e.local_name().as_ref() {
                    b"tab" => paragraph.push('\t'),
                    b"br" | b"cr" => paragraph.push('\n'),
                    _ => {}
                }
            }
            XmlEvent::Text(e) if in_text && skip_depth == 0 && table_depth <= 1 => {
                paragraph.push_str(&e.unescape()?);
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    paragraphs.extend(rows);
    Ok(paragraphs.join("\n\n"))
}

/// Normalize whitespace: at most one blank line in a row, no repeated
/// spaces, no leading or trailing whitespace on any line.
#[inline]
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = text.replace("\r\n", "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    let text = EXCESS_SPACES.replace_all(&text, " ");

    text.split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// First `max_chars` characters of `text`
#[inline]
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
