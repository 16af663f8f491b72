use crate::error::{ApiError, decode_json};
use derive_more::{Display, From};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Multipart field each selected file is appended under.
pub const UPLOAD_FIELD: &str = "files";

/// Header carrying the static OCR API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedType {
    Pdf,
    Jpeg,
    Png,
    Zip,
}

impl AcceptedType {
    pub const ALL: [AcceptedType; 4] = [
        AcceptedType::Pdf,
        AcceptedType::Jpeg,
        AcceptedType::Png,
        AcceptedType::Zip,
    ];

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Some(AcceptedType::Pdf),
            "image/jpeg" => Some(AcceptedType::Jpeg),
            "image/png" => Some(AcceptedType::Png),
            "application/zip" => Some(AcceptedType::Zip),
            _ => None,
        }
    }

    /// Guess from the extension. Only used for labelling; the upload check
    /// trusts the MIME type the browser reports.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(AcceptedType::Pdf),
            "jpg" | "jpeg" => Some(AcceptedType::Jpeg),
            "png" => Some(AcceptedType::Png),
            "zip" => Some(AcceptedType::Zip),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            AcceptedType::Pdf => "application/pdf",
            AcceptedType::Jpeg => "image/jpeg",
            AcceptedType::Png => "image/png",
            AcceptedType::Zip => "application/zip",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AcceptedType::Pdf => "PDF",
            AcceptedType::Jpeg => "JPEG",
            AcceptedType::Png => "PNG",
            AcceptedType::Zip => "ZIP",
        }
    }

    /// Value for the file input's `accept` attribute.
    pub fn accept_attr() -> String {
        Self::ALL
            .iter()
            .map(|t| t.mime())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileMeta {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            size,
        }
    }

    pub fn accepted_type(&self) -> Option<AcceptedType> {
        AcceptedType::from_mime(&self.mime)
    }
}

/// Rejects the whole batch if it is empty or any file has an unsupported
/// MIME type. Runs before anything touches the network.
pub fn validate_batch(files: &[FileMeta]) -> Result<(), ApiError> {
    if files.is_empty() {
        return Err(ApiError::Validation(
            "Please select at least one file to upload.".into(),
        ));
    }

    if let Some(bad) = files.iter().find(|f| f.accepted_type().is_none()) {
        let mime = if bad.mime.is_empty() { "unknown" } else { bad.mime.as_str() };
        log::warn!("Rejecting batch, unsupported file {} ({})", bad.name, mime);
        return Err(ApiError::Validation(format!(
            "Unsupported file type: {} ({}). Please upload PDF, JPEG, PNG, or ZIP files only.",
            mime, bad.name
        )));
    }

    Ok(())
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Whole-number share of an upload sent so far. `None` while the browser
/// cannot tell the total size.
pub fn upload_percent(loaded: f64, total: f64) -> Option<u8> {
    if !(total > 0.0) || !loaded.is_finite() {
        return None;
    }
    Some((loaded / total * 100.0).clamp(0.0, 100.0).round() as u8)
}

pub fn uploading_label(percent: u8) -> String {
    format!("{}% - Uploading...", percent)
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::AsRefStr, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DownloadFormat {
    Csv,
    Excel,
}

impl DownloadFormat {
    /// Order the downloads are attempted in after a task completes.
    pub const ALL: [DownloadFormat; 2] = [DownloadFormat::Csv, DownloadFormat::Excel];

    pub fn file_name(&self) -> &'static str {
        match self {
            DownloadFormat::Csv => "ocr_results.csv",
            DownloadFormat::Excel => "ocr_results.xlsx",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            DownloadFormat::Csv => "text/csv",
            DownloadFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DownloadFormat::Csv => "CSV",
            DownloadFormat::Excel => "Excel",
        }
    }
}

/// Validation warnings keyed by invoice number.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport(BTreeMap<String, Option<Vec<String>>>);

impl ValidationReport {
    /// Invoices that carry at least one warning.
    pub fn flagged(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().filter_map(|(invoice, warnings)| match warnings {
            Some(w) if !w.is_empty() => Some((invoice.as_str(), w.as_slice())),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.flagged().next().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnomalyRecord {
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub flags: Vec<String>,
}

impl AnomalyRecord {
    pub fn invoice_label(&self) -> &str {
        self.invoice_number.as_deref().unwrap_or("(unknown)")
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn decode_validation(body: &str) -> Result<ValidationReport, ApiError> {
    Ok(decode_json::<Option<ValidationReport>>(body)?.unwrap_or_default())
}

pub fn decode_anomalies(body: &str) -> Result<Vec<AnomalyRecord>, ApiError> {
    Ok(decode_json::<Option<Vec<AnomalyRecord>>>(body)?.unwrap_or_default())
}

/// Paths of the OCR service, relative to `base` (empty means same origin).
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn upload(&self, project_id: Option<i64>) -> String {
        match project_id {
            Some(id) => format!("{}/upload/?project_id={}", self.base, id),
            None => format!("{}/upload/", self.base),
        }
    }

    pub fn status(&self, task: &TaskId) -> String {
        self.task_path("status", task)
    }

    pub fn cancel(&self, task: &TaskId) -> String {
        self.task_path("cancel", task)
    }

    pub fn download(&self, task: &TaskId, format: DownloadFormat) -> String {
        format!("{}?format={}", self.task_path("download", task), format.as_ref())
    }

    pub fn validation(&self, task: &TaskId) -> String {
        self.task_path("validation", task)
    }

    pub fn anomalies(&self, task: &TaskId) -> String {
        self.task_path("anomalies", task)
    }

    pub fn health(&self) -> String {
        format!("{}/health", self.base)
    }

    fn task_path(&self, route: &str, task: &TaskId) -> String {
        format!("{}/{}/{}", self.base, route, urlencoding::encode(task.as_str()))
    }
}
