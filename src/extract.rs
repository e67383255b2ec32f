//! Reference material extraction
//!
//! Maps an uploaded file to plain text by extension:
//! `pdf` (page text), `docx` (paragraph text), `xlsx`/`xls` (first sheet as
//! CSV), anything else read as UTF-8. Batch extraction skips files that fail
//! and keeps going.

use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Extraction failure for a single file
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("pdf parse failed: {0}")]
    Pdf(String),
    #[error("docx parse failed: {0}")]
    Docx(String),
    #[error("spreadsheet parse failed: {0}")]
    Spreadsheet(String),
    #[error("workbook has no sheets")]
    NoSheet,
}

/// A file handed over by the user, bytes already in memory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk; the name is the path's file name.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    /// Lower-cased text after the last `.`, empty when there is none.
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        }
    }
}

/// Successfully extracted reference file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    pub name: String,
    pub text: String,
}

/// Everything the matrix must be built from: inline text plus file texts
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    pub inline_text: String,
    pub files: Vec<ReferenceFile>,
}

impl ReferenceSet {
    pub fn new(inline_text: String) -> Self {
        Self {
            inline_text,
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.files.push(ReferenceFile {
            name: name.into(),
            text: text.into(),
        });
    }

    /// Extract `uploads` and append the ones that succeed.
    /// Returns how many were added.
    pub fn add_uploads(&mut self, extractor: &dyn DocumentExtractor, uploads: &[UploadedFile]) -> usize {
        let extracted = extract_batch(extractor, uploads);
        let added = extracted.len();
        self.files.extend(extracted);
        added
    }

    /// Read and extract files from disk, appending the ones that succeed.
    /// Returns how many were added.
    pub fn add_paths<P: AsRef<Path>>(&mut self, extractor: &dyn DocumentExtractor, paths: &[P]) -> usize {
        let extracted = extract_paths(extractor, paths);
        let added = extracted.len();
        self.files.extend(extracted);
        added
    }

    /// True when there is any non-blank inline or file text.
    pub fn has_material(&self) -> bool {
        !self.inline_text.trim().is_empty() || self.files.iter().any(|f| !f.text.trim().is_empty())
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }

    /// Inline text, a newline, then every file text separated by a blank line.
    pub fn combined(&self) -> String {
        let files: Vec<&str> = self.files.iter().map(|f| f.text.as_str()).collect();
        format!("{}\n{}", self.inline_text, files.join("\n\n"))
    }
}

/// Turns one uploaded file into plain text
pub trait DocumentExtractor {
    fn extract(&self, file: &UploadedFile) -> Result<String, ExtractError>;
}

/// Extract every file in order; failures are logged and skipped.
pub fn extract_batch(extractor: &dyn DocumentExtractor, uploads: &[UploadedFile]) -> Vec<ReferenceFile> {
    let mut out = Vec::with_capacity(uploads.len());
    for file in uploads {
        match extractor.extract(file) {
            Ok(text) => {
                debug!(file = %file.name, chars = text.chars().count(), "extracted reference file");
                out.push(ReferenceFile {
                    name: file.name.clone(),
                    text,
                });
            }
            Err(err) => {
                warn!(file = %file.name, error = %err, "skipping reference file");
            }
        }
    }
    out
}

/// Read each path and extract it in order. A file that cannot be read is
/// skipped like one that cannot be parsed.
pub fn extract_paths<P: AsRef<Path>>(extractor: &dyn DocumentExtractor, paths: &[P]) -> Vec<ReferenceFile> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let result = UploadedFile::from_path(path.as_ref())
            .and_then(|file| extractor.extract(&file).map(|text| (file.name, text)));
        match result {
            Ok((name, text)) => {
                debug!(file = %name, chars = text.chars().count(), "extracted reference file");
                out.push(ReferenceFile { name, text });
            }
            Err(err) => {
                warn!(path = %path.as_ref().display(), error = %err, "skipping reference file");
            }
        }
    }
    out
}

/// Extension-dispatching extractor backed by calamine, pdf-extract and quick-xml
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

impl DocumentExtractor for FileExtractor {
    fn extract(&self, file: &UploadedFile) -> Result<String, ExtractError> {
        match file.extension().as_str() {
            "pdf" => extract_pdf(&file.bytes),
            "docx" => extract_docx(&file.bytes),
            "xlsx" | "xls" => extract_first_sheet_csv(&file.bytes),
            _ => Ok(decode_text(&file.bytes)),
        }
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(text.as_ref()).to_string()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let mut text = String::new();
    for page in pages {
        text.push_str(page.trim_end());
        text.push('\n');
    }
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    docx_xml_to_text(&xml)
}

/// Raw text of a WordprocessingML body: one block per paragraph,
/// blocks separated by a blank line.
fn docx_xml_to_text(xml: &str) -> Result<String, ExtractError> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"r" => in_run = true,
                b"t" => in_text = true,
                _ => {}
            },
            // tab stops in paragraph properties are also <w:tab/>; only runs count
            Ok(Event::Empty(ref e)) if in_run => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    let text = e.unescape().map_err(|err| ExtractError::Docx(err.to_string()))?;
                    current.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => in_run = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(ExtractError::Docx(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n\n"))
}

fn extract_first_sheet_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ExtractError::NoSheet)?
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;
    Ok(range_to_csv(&range))
}

fn range_to_csv(range: &calamine::Range<Data>) -> String {
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| csv_field(&cell_to_string(cell)))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.to_string(),
        _ => cell.to_string(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
