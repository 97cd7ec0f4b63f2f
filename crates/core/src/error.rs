//! Preview error taxonomy
//!
//! Page-level failures (`PageRender`, per-page `Extraction`) are recovered
//! where they happen and never reach the user as a banner. Document-level
//! failures carry a remediation hint through [`PreviewError::banner`].

use pdf_engine::PdfEngineError;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// The document could not be parsed or read.
    #[error("failed to load document: {reason}")]
    Load { reason: String, kind: LoadFailureKind },

    /// One page failed to render; the rest of the document is unaffected.
    #[error("failed to render page {}: {reason}", page + 1)]
    PageRender { page: u32, reason: String },

    /// Text extraction could not start at all.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// The document-to-PDF collaborator is unavailable or refused the file.
    #[error("document conversion failed: {message}")]
    Conversion { message: String, suggestion: Option<String> },

    /// Upload or URL fetch failed.
    #[error("network request failed: {0}")]
    Network(String),

    /// The file category has no preview path.
    #[error("unsupported file type: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureKind {
    Corrupt,
    PasswordProtected,
    Io,
    Backend,
    InvalidImage,
}

impl PreviewError {
    pub(crate) fn from_load(err: PdfEngineError) -> Self {
        let kind = match &err {
            PdfEngineError::EncryptedUnsupported => LoadFailureKind::PasswordProtected,
            PdfEngineError::Parse(_) | PdfEngineError::Empty => LoadFailureKind::Corrupt,
            PdfEngineError::Io(_) => LoadFailureKind::Io,
            PdfEngineError::PageOutOfRange { .. } | PdfEngineError::Backend(_) => {
                LoadFailureKind::Backend
            }
        };
        Self::Load { reason: err.to_string(), kind }
    }

    pub(crate) fn page_render(page: u32, err: impl ToString) -> Self {
        Self::PageRender { page, reason: err.to_string() }
    }

    /// Whether the failure is scoped to a single page.
    pub fn is_page_level(&self) -> bool {
        matches!(self, Self::PageRender { .. })
    }

    /// User-facing message with actionable guidance.
    pub fn banner(&self) -> String {
        match self {
            Self::Load { kind: LoadFailureKind::PasswordProtected, .. } => {
                "This PDF is password-protected. Please unlock it first.".to_owned()
            }
            Self::Load { kind: LoadFailureKind::Corrupt, .. } => {
                "Invalid or corrupted PDF file. Please try a different PDF.".to_owned()
            }
            Self::Load { kind: LoadFailureKind::Backend, reason } => {
                format!("The PDF renderer is unavailable ({reason}). Please try again.")
            }
            Self::Load { kind: LoadFailureKind::InvalidImage, .. } => {
                "This image could not be decoded. Please try a different file.".to_owned()
            }
            Self::Load { reason, .. } => format!("Failed to load PDF: {reason}"),
            Self::PageRender { page, .. } => format!("Page {} could not be rendered.", page + 1),
            Self::Extraction(_) => "Failed to extract text from file.".to_owned(),
            Self::Conversion { message, suggestion } => {
                if message.contains("LibreOffice")
                    || suggestion.as_deref().is_some_and(|s| s.contains("LibreOffice"))
                {
                    "Document conversion requires LibreOffice. Install it on the server or \
                     convert your file to PDF manually."
                        .to_owned()
                } else {
                    suggestion.clone().unwrap_or_else(|| {
                        format!("{message}. Please try uploading as PDF format.")
                    })
                }
            }
            Self::Network(reason) => format!(
                "{reason}. Please check the URL or try uploading the file directly."
            ),
            Self::Unsupported(kind) => format!("Preview is not available for {kind} files."),
        }
    }
}

pub type PreviewResult<T> = Result<T, PreviewError>;
