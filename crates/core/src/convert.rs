//! Collaborator clients: upload, document-to-PDF conversion, URL fetch.

use crate::config::PreviewConfig;
use crate::error::PreviewError;
use reqwest::blocking::{multipart, Client, Response};
use serde::Deserialize;

const MISSING_CONVERTER: &str = "LibreOffice is not installed on the server. Please convert your \
                                 document to PDF manually, or install LibreOffice.";
const FETCH_FAILED: &str = "Failed to fetch file. URL may be blocked or invalid.";
const FALLBACK_FILE_NAME: &str = "downloaded-file";

/// Server response to a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub upload_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversionResponse {
    pdf: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

/// Client for the upload and conversion server.
#[derive(Debug, Clone)]
pub struct ServerClient {
    base_url: String,
    client: Client,
}

impl ServerClient {
    pub fn new(config: &PreviewConfig) -> Result<Self, PreviewError> {
        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_owned(),
            client: http_client(config)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/upload` with the file in the multipart field `file`.
    pub fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedFile, PreviewError> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_owned());
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form)
            .send()
            .map_err(|err| PreviewError::Network(format!("Upload failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: ErrorBody = response.json().unwrap_or_default();
            let reason = body.error.unwrap_or_else(|| format!("HTTP {status}"));
            return Err(PreviewError::Network(format!("Upload failed: {reason}")));
        }

        let uploaded: UploadedFile = response
            .json()
            .map_err(|err| PreviewError::Network(format!("Upload failed: {err}")))?;
        log::info!("uploaded {file_name} as {}", uploaded.file_id);
        Ok(uploaded)
    }

    /// `POST /api/docx-pdf/convert-to-pdf`; returns the absolute URL of the
    /// converted PDF.
    pub fn convert_to_pdf(&self, file_id: &str) -> Result<String, PreviewError> {
        let response = self
            .client
            .post(format!("{}/api/docx-pdf/convert-to-pdf", self.base_url))
            .json(&serde_json::json!({ "fileId": file_id }))
            .send()
            .map_err(|err| PreviewError::Network(format!("Conversion request failed: {err}")))?;

        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(conversion_error(&body));
        }

        let converted: ConversionResponse = response.json().map_err(|err| PreviewError::Conversion {
            message: format!("Unexpected conversion response: {err}"),
            suggestion: None,
        })?;
        Ok(self.resolve_pdf_url(&converted.pdf))
    }

    /// Maps the conversion result to a download URL: absolute URLs are used
    /// as-is, server paths are joined to the base, anything else is a file id.
    pub fn resolve_pdf_url(&self, pdf: &str) -> String {
        if pdf.starts_with("http://") || pdf.starts_with("https://") {
            pdf.to_owned()
        } else if pdf.starts_with('/') {
            format!("{}{pdf}", self.base_url)
        } else {
            format!("{}/api/download/{pdf}", self.base_url)
        }
    }

    pub fn download(&self, url: &str) -> Result<Vec<u8>, PreviewError> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|err| PreviewError::Network(format!("Download failed: {err}")))?;
        let bytes = response
            .bytes()
            .map_err(|err| PreviewError::Network(format!("Download failed: {err}")))?;
        Ok(bytes.to_vec())
    }

    /// Upload, convert and download in one round trip.
    pub fn convert_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, PreviewError> {
        let uploaded = self.upload(file_name, bytes)?;
        let url = self.convert_to_pdf(&uploaded.file_id)?;
        log::info!("converted {file_name}, downloading {url}");
        self.download(&url)
    }
}

/// Builds the conversion error from a failed response body.
fn conversion_error(body: &str) -> PreviewError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error, suggestion }) => {
            let message = suggestion
                .clone()
                .or(error)
                .unwrap_or_else(|| "Conversion failed".to_owned());
            PreviewError::Conversion { message, suggestion }
        }
        Err(_) => PreviewError::Conversion {
            message: MISSING_CONVERTER.to_owned(),
            suggestion: None,
        },
    }
}

/// A file downloaded from a URL.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Downloads `url`, retrying once through the configured proxy.
pub fn fetch_url(config: &PreviewConfig, url: &str) -> Result<FetchedFile, PreviewError> {
    let client = http_client(config)?;

    let response = match get_ok(&client, url) {
        Ok(response) => response,
        Err(direct) => {
            log::warn!("direct fetch of {url} failed ({direct}), retrying through proxy");
            let proxied = format!("{}{}", config.cors_proxy, urlencoding::encode(url));
            get_ok(&client, &proxied).map_err(|err| {
                log::warn!("proxy fetch of {url} failed: {err}");
                PreviewError::Network(FETCH_FAILED.to_owned())
            })?
        }
    };

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let bytes = response
        .bytes()
        .map_err(|_| PreviewError::Network(FETCH_FAILED.to_owned()))?
        .to_vec();

    Ok(FetchedFile { file_name: filename_from_url(url), content_type, bytes })
}

fn get_ok(client: &Client, url: &str) -> reqwest::Result<Response> {
    client.get(url).send()?.error_for_status()
}

fn http_client(config: &PreviewConfig) -> Result<Client, PreviewError> {
    Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|err| PreviewError::Network(err.to_string()))
}

/// Last path segment when it looks like a file name, URL-decoded.
pub fn filename_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|idx| &rest[idx..]).unwrap_or_default(),
        None => without_query,
    };

    path.rsplit('/')
        .next()
        .filter(|segment| segment.contains('.'))
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_owned())
        })
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_owned())
}
