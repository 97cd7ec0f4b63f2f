//! File category detection and direct text extraction
//!
//! Categories decide the preview path: PDFs and office documents go through
//! the progressive renderer, images through single-slot OCR, and structured
//! text formats are serialized directly without recognition.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Pdf,
    Document,
    Spreadsheet,
    Csv,
    Image,
    Video,
    Audio,
    Text,
    Json,
    Code,
    Archive,
    Email,
    Database,
    Calendar,
    Contacts,
    Subtitle,
    Other,
}

const DOCUMENT_EXTENSIONS: &[&str] = &["doc", "docx", "ppt", "pptx", "odt", "odp", "rtf"];
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "ods"];
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "heic", "heif", "avif", "tiff", "tif",
    "psd", "raw", "arw", "cr2", "cr3", "nef", "nrw", "dng", "raf", "orf", "rw2", "pef", "srw",
    "x3f",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "ogg", "flv", "wmv", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac", "aac", "wma", "opus"];
const CODE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "java", "cpp", "c", "cs", "go", "rs", "php", "rb", "swift",
    "kt", "css", "xml", "yaml", "yml",
];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "log"];

impl FileCategory {
    /// Classifies a file from its name and optional MIME type.
    ///
    /// Rules are checked in a fixed order, so `.ogg` is video and
    /// `text/csv` is csv rather than text.
    pub fn detect(file_name: &str, mime: Option<&str>) -> Self {
        let ext = extension(file_name);
        let ext = ext.as_str();
        let mime = mime.unwrap_or_default().to_ascii_lowercase();
        let mime = mime.as_str();

        if ext == "pdf" || mime.contains("pdf") {
            Self::Pdf
        } else if DOCUMENT_EXTENSIONS.contains(&ext)
            || ["word", "powerpoint", "presentation"].iter().any(|m| mime.contains(m))
        {
            Self::Document
        } else if SPREADSHEET_EXTENSIONS.contains(&ext) || mime.contains("spreadsheet") {
            Self::Spreadsheet
        } else if ext == "csv" || mime.contains("csv") {
            Self::Csv
        } else if IMAGE_EXTENSIONS.contains(&ext) || mime.starts_with("image/") {
            Self::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) || mime.starts_with("video/") {
            Self::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) || mime.starts_with("audio/") {
            Self::Audio
        } else if ext == "html" || ext == "htm" {
            Self::Text
        } else if ext == "json" || mime.contains("json") {
            Self::Json
        } else if CODE_EXTENSIONS.contains(&ext) {
            Self::Code
        } else if ARCHIVE_EXTENSIONS.contains(&ext)
            || mime.contains("zip")
            || mime.contains("compressed")
        {
            Self::Archive
        } else if ext == "eml" || ext == "msg" {
            Self::Email
        } else if ["db", "sqlite", "sqlite3", "mdb"].contains(&ext) {
            Self::Database
        } else if ext == "ics" {
            Self::Calendar
        } else if ext == "vcf" || ext == "vcard" {
            Self::Contacts
        } else if ["srt", "vtt", "ass", "ssa"].contains(&ext) {
            Self::Subtitle
        } else if TEXT_EXTENSIONS.contains(&ext) || mime.starts_with("text/") {
            Self::Text
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Csv => "csv",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
            Self::Json => "json",
            Self::Code => "code",
            Self::Archive => "archive",
            Self::Email => "email",
            Self::Database => "database",
            Self::Calendar => "calendar",
            Self::Contacts => "contacts",
            Self::Subtitle => "subtitle",
            Self::Other => "other",
        }
    }

    /// Rendered page by page through the progressive scheduler.
    pub fn is_paged(&self) -> bool {
        matches!(self, Self::Pdf | Self::Document)
    }

    /// Text comes from recognition rather than serialization.
    pub fn uses_ocr(&self) -> bool {
        matches!(self, Self::Pdf | Self::Document | Self::Image)
    }

    /// Text is produced by serializing the content directly.
    pub fn is_direct_text(&self) -> bool {
        matches!(
            self,
            Self::Text
                | Self::Code
                | Self::Json
                | Self::Csv
                | Self::Subtitle
                | Self::Calendar
                | Self::Contacts
        )
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Extracted text for a directly serializable category.
///
/// Returns `None` for categories that need rendering or recognition.
pub fn direct_text(category: FileCategory, content: &str) -> Option<String> {
    match category {
        FileCategory::Csv => Some(csv_to_text(content)),
        category if category.is_direct_text() => Some(content.to_owned()),
        _ => None,
    }
}

/// Tab-separated cells, one row per line. Malformed records are skipped.
pub fn csv_to_text(content: &str) -> String {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let rows: Vec<Vec<String>> = reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => Some(record.iter().map(str::to_owned).collect()),
            Err(err) => {
                log::warn!("skipping malformed CSV record: {err}");
                None
            }
        })
        .collect();

    rows_to_text(&rows)
}

/// Serializes spreadsheet rows the same way as CSV.
pub fn rows_to_text<R: AsRef<[String]>>(rows: &[R]) -> String {
    rows.iter().map(|row| row.as_ref().join("\t")).collect::<Vec<_>>().join("\n")
}

/// Pretty-printed JSON, or the raw content when it does not parse.
pub fn pretty_json(content: &str) -> String {
    serde_json::from_str::<serde_json::Value>(content)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| content.to_owned())
}
