use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde_json::Value;
use std::io::Cursor;
use thiserror::Error;
use tracing::{info, warn};

use super::json_reply::{flatten_fields, parse_json_object};
use super::markdown_fields::fields_from_markdown;
use super::openrouter::{ChatError, OpenRouterClient, png_part, text_part};
use crate::models::{ExtractedDocument, FieldMap, UploadedDocument};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("extraction request timed out")]
    Timeout,

    #[error("extraction request failed: {0}")]
    Transport(String),

    #[error("unexpected extraction response: {0}")]
    MalformedResponse(String),

    #[error("could not render document pages: {0}")]
    Render(String),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<ChatError> for ExtractionError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Status { status, body } => Self::Api { status, body },
            ChatError::InvalidResponse(message) => Self::MalformedResponse(message),
            ChatError::Http(e) => e.into(),
        }
    }
}

/// Turns one uploaded document into a field map.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, document: &UploadedDocument) -> Result<ExtractedDocument, ExtractionError>;
}

/// Client for the hosted agentic document-analysis API
pub struct AgenticDocExtractor {
    http: Client,
    api_url: String,
    api_key: String,
}

impl AgenticDocExtractor {
    pub fn new(http: Client, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for AgenticDocExtractor {
    fn name(&self) -> &str {
        "agentic-doc"
    }

    async fn extract(&self, document: &UploadedDocument) -> Result<ExtractedDocument, ExtractionError> {
        info!(
            document = %document.file_name,
            size_kb = document.size_kb(),
            "Sending document to extraction API"
        );

        let part_name = if document.kind.is_pdf() { "pdf" } else { "image" };
        let part = Part::bytes(document.bytes.clone())
            .file_name(document.file_name.clone())
            .mime_str(document.kind.mime_type())?;
        let form = Form::new().part(part_name, part);

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Basic {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

        let (fields, markdown) = read_analysis_response(&body)?;
        info!(
            document = %document.file_name,
            field_count = fields.len(),
            "Extraction API returned fields"
        );

        Ok(ExtractedDocument {
            document_id: document.id.clone(),
            file_name: document.file_name.clone(),
            fields,
            markdown,
        })
    }
}

/// Prefer the structured extraction; otherwise read fields off the markdown.
fn read_analysis_response(body: &Value) -> Result<(FieldMap, Option<String>), ExtractionError> {
    let data = body
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| ExtractionError::MalformedResponse("missing 'data' object".to_string()))?;

    let markdown = data
        .get("markdown")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(schema) = data.get("extracted_schema").and_then(Value::as_object) {
        return Ok((flatten_fields(schema), markdown));
    }

    match markdown {
        Some(markdown) => Ok((fields_from_markdown(&markdown), Some(markdown))),
        None => Err(ExtractionError::MalformedResponse(
            "response has neither 'markdown' nor 'extracted_schema'".to_string(),
        )),
    }
}

const VISION_EXTRACTION_PROMPT: &str = "You are an expert medical document extraction system. \
I'm providing you with {pages} page image(s) of one medical or health document.

Read every labelled field on the document (form fields, table rows, checkboxes, \
signatures, dates, measurements) and return them as a single flat JSON object that maps \
each field label, exactly as written on the document, to its value as a string.

Rules:
- Keep the document's own field names; do not rename or merge fields
- Omit fields that are blank or not filled out
- Return ONLY the JSON object, without code fences, commentary or explanations";

/// Extraction through a vision model: pages are rendered to PNG and the model
/// is asked for a JSON field map.
pub struct VisionLlmExtractor {
    client: OpenRouterClient,
    model: String,
}

impl VisionLlmExtractor {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for VisionLlmExtractor {
    fn name(&self) -> &str {
        "vision-llm"
    }

    async fn extract(&self, document: &UploadedDocument) -> Result<ExtractedDocument, ExtractionError> {
        let pages = render_pages(document).await?;
        if pages.is_empty() {
            return Err(ExtractionError::Render("document has no pages".to_string()));
        }
        info!(
            document = %document.file_name,
            pages = pages.len(),
            "Sending page images to vision model"
        );

        let mut content = vec![text_part(
            VISION_EXTRACTION_PROMPT.replace("{pages}", &pages.len().to_string()),
        )];
        for page in &pages {
            content.push(png_part(page));
        }

        let reply = self.client.chat(&self.model, content, 4000).await?;

        let object = parse_json_object(&reply)
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;
        let fields = flatten_fields(&object);
        if fields.is_empty() {
            warn!(document = %document.file_name, "Vision model found no fields");
        }

        Ok(ExtractedDocument {
            document_id: document.id.clone(),
            file_name: document.file_name.clone(),
            fields,
            markdown: None,
        })
    }
}

/// Render every page to a base64 PNG on a blocking thread.
async fn render_pages(document: &UploadedDocument) -> Result<Vec<String>, ExtractionError> {
    let bytes = document.bytes.clone();
    let is_pdf = document.kind.is_pdf();

    tokio::task::spawn_blocking(move || -> Result<Vec<String>, ExtractionError> {
        let images = if is_pdf {
            let pdf = PDF::from_bytes(bytes)
                .map_err(|e| ExtractionError::Render(format!("failed to load PDF: {}", e)))?;
            pdf.render(Pages::All, None)
                .map_err(|e| ExtractionError::Render(format!("failed to render PDF pages: {}", e)))?
        } else {
            vec![
                image::load_from_memory(&bytes)
                    .map_err(|e| ExtractionError::UnsupportedFormat(e.to_string()))?,
            ]
        };

        images.iter().map(image_to_base64).collect()
    })
    .await
    .map_err(|e| ExtractionError::Render(e.to_string()))?
}

fn image_to_base64(image: &DynamicImage) -> Result<String, ExtractionError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| ExtractionError::Render(format!("failed to encode image: {}", e)))?;
    Ok(STANDARD.encode(&buffer))
}
