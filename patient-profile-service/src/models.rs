use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Field name → field value, as read from one document or merged across many.
pub type FieldMap = BTreeMap<String, String>;

/// Keys used to store pipeline data in the session context
pub mod session_keys {
    pub const DOCUMENTS: &str = "documents";
    pub const UPLOADED_DOCUMENTS: &str = "uploaded_documents";
    pub const PROCESSED_DOCUMENTS: &str = "processed_documents";
    pub const EXTRACTED_DOCUMENTS: &str = "extracted_documents";
    pub const PROFILE: &str = "patient_profile";
    pub const ADVICE: &str = "advice";
    pub const PIPELINE_ERROR: &str = "pipeline_error";
}

pub const MEDICAL_DISCLAIMER: &str = "These recommendations are for informational purposes only and \
should not replace professional medical advice. Always consult with your healthcare provider before \
making any changes to your treatment or lifestyle.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    Bmp,
}

impl DocumentKind {
    /// Detect the kind from magic bytes, falling back to the file extension.
    pub fn detect(file_name: &str, bytes: &[u8]) -> Option<Self> {
        Self::from_magic(bytes).or_else(|| Self::from_extension(file_name))
    }

    fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(Self::Pdf)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Some(Self::Tiff)
        } else if is_bmp(bytes) {
            Some(Self::Bmp)
        } else {
            None
        }
    }

    fn from_extension(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// `BM` alone matches plain text; also require the file header's size field
/// to match the upload.
fn is_bmp(bytes: &[u8]) -> bool {
    const FILE_HEADER_LEN: usize = 14;
    if bytes.len() < FILE_HEADER_LEN || !bytes.starts_with(b"BM") {
        return false;
    }
    let declared = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    usize::try_from(declared).is_ok_and(|declared| declared == bytes.len())
}

/// One uploaded source document. Only lives until extraction succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub id: String,
    pub file_name: String,
    pub kind: DocumentKind,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn size_kb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub document_id: String,
    pub file_name: String,
    pub fields: FieldMap,
    pub markdown: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub file_name: String,
    pub kind: DocumentKind,
    pub size_kb: f64,
}

impl From<&UploadedDocument> for DocumentSummary {
    fn from(document: &UploadedDocument) -> Self {
        Self {
            file_name: document.file_name.clone(),
            kind: document.kind,
            size_kb: document.size_kb(),
        }
    }
}

/// Deduplicated union of every document's fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub fields: FieldMap,
    pub sources: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl PatientProfile {
    pub fn new(fields: FieldMap, sources: Vec<String>) -> Self {
        Self {
            fields,
            sources,
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub text: String,
    pub sufficient_data: bool,
    pub quick_tips: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub fields: FieldMap,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status: String,
    pub current_task: Option<String>,
    pub status_message: Option<String>,
    pub documents: Vec<DocumentSummary>,
    pub processed_documents: Vec<String>,
    pub profile: Option<PatientProfile>,
    pub advice: Option<Advice>,
    pub error: Option<String>,
    pub disclaimer: &'static str,
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}
