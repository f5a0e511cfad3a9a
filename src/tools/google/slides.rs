//! Slides tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::drive::{typed_search_schema, SearchFilesOfType};
use super::{path_segment, ExportFile, ExportFormat, GoogleApi, SCOPE_DRIVE, SCOPE_PRESENTATIONS};
use crate::auth::Credential;
use crate::error::{GoogleMcpError, Result};
use crate::tools::{parse_arguments, ToolDescriptor, ToolHandler, ToolRegistry};

pub(super) fn register(registry: &mut ToolRegistry, api: &GoogleApi) -> Result<()> {
    registry.register(ToolDescriptor::new(
        "create_presentation",
        "Create a new Google Slides presentation.",
        json!({
            "type": "object",
            "properties": {"title": {"type": "string"}},
            "required": ["title"]
        }),
        [SCOPE_PRESENTATIONS],
        Arc::new(CreatePresentation { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "get_presentation",
        "Get a presentation's title and the text on each slide.",
        presentation_schema(),
        [SCOPE_PRESENTATIONS],
        Arc::new(GetPresentation { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "add_slide",
        "Add a slide at the end of a presentation. Layouts: BLANK, TITLE, TITLE_AND_BODY, \
         TITLE_AND_TWO_COLUMNS, TITLE_ONLY, SECTION_HEADER, CAPTION_ONLY, BIG_NUMBER.",
        json!({
            "type": "object",
            "properties": {
                "presentation_id": {"type": "string"},
                "layout": {"type": "string", "description": "Layout name (default BLANK)"}
            },
            "required": ["presentation_id"]
        }),
        [SCOPE_PRESENTATIONS],
        Arc::new(AddSlide { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "add_text_to_slide",
        "Add a text box to a slide. slide_index is 0-based; position and size are in points.",
        json!({
            "type": "object",
            "properties": {
                "presentation_id": {"type": "string"},
                "slide_index": {"type": "integer", "minimum": 0},
                "text": {"type": "string"},
                "x": {"type": "number", "description": "Left offset (default 100)"},
                "y": {"type": "number", "description": "Top offset (default 100)"},
                "width": {"type": "number", "exclusiveMinimum": 0, "description": "Default 400"},
                "height": {"type": "number", "exclusiveMinimum": 0, "description": "Default 200"}
            },
            "required": ["presentation_id", "slide_index", "text"]
        }),
        [SCOPE_PRESENTATIONS],
        Arc::new(AddTextToSlide { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "search_presentations",
        "Search Google Slides presentations in Drive. An empty query lists recent presentations.",
        typed_search_schema(),
        [SCOPE_DRIVE],
        Arc::new(SearchFilesOfType::new(api, PRESENTATION_MIME_TYPE)),
    ))?;
    registry.register(ToolDescriptor::new(
        "delete_slide",
        "Delete a slide by its 0-based index.",
        json!({
            "type": "object",
            "properties": {
                "presentation_id": {"type": "string"},
                "slide_index": {"type": "integer", "minimum": 0}
            },
            "required": ["presentation_id", "slide_index"]
        }),
        [SCOPE_PRESENTATIONS],
        Arc::new(DeleteSlide { api: api.clone() }),
    ))?;
    let export = ExportFile {
        api: api.clone(),
        id_param: "presentation_id",
        formats: EXPORT_FORMATS,
        default_format: "pdf",
    };
    registry.register(ToolDescriptor::new(
        "export_presentation",
        "Export a presentation as pdf, pptx, or txt.",
        export.schema(),
        [SCOPE_DRIVE],
        Arc::new(export),
    ))?;
    Ok(())
}

const PRESENTATION_MIME_TYPE: &str = "application/vnd.google-apps.presentation";

const EXPORT_FORMATS: &[ExportFormat] = &[
    ExportFormat {
        name: "pdf",
        mime_type: "application/pdf",
        textual: false,
    },
    ExportFormat {
        name: "pptx",
        mime_type: "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        textual: false,
    },
    ExportFormat {
        name: "txt",
        mime_type: "text/plain",
        textual: true,
    },
];

fn presentation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"presentation_id": {"type": "string"}},
        "required": ["presentation_id"]
    })
}

fn presentation_url(api: &GoogleApi, presentation_id: &str) -> String {
    format!(
        "{}/presentations/{}",
        api.config().slides_base,
        path_segment(presentation_id)
    )
}

fn slide_list(presentation: &Value) -> &[Value] {
    presentation
        .get("slides")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Object id of the slide at `index`.
///
/// # Errors
///
/// Returns [`GoogleMcpError::InvalidArguments`] when the index is past the
/// last slide.
fn slide_object_id(presentation: &Value, index: usize) -> Result<String> {
    let slides = slide_list(presentation);
    slides
        .get(index)
        .and_then(|slide| slide.get("objectId"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            GoogleMcpError::InvalidArguments(format!(
                "slide index {index} out of range (total: {})",
                slides.len()
            ))
            .into()
        })
}

/// Trimmed, non-empty text runs of every shape on a slide.
fn slide_text(slide: &Value) -> Vec<String> {
    slide
        .get("pageElements")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|element| element.pointer("/shape/text/textElements"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|run| run.pointer("/textRun/content").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

/// Layout whose name or display name matches `layout`, ignoring case.
fn find_layout<'a>(presentation: &'a Value, layout: &str) -> Option<&'a str> {
    presentation
        .get("layouts")
        .and_then(Value::as_array)?
        .iter()
        .find(|candidate| {
            ["/layoutProperties/name", "/layoutProperties/displayName"]
                .iter()
                .filter_map(|pointer| candidate.pointer(pointer).and_then(Value::as_str))
                .any(|name| name.eq_ignore_ascii_case(layout))
        })
        .and_then(|found| found.get("objectId"))
        .and_then(Value::as_str)
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    title: String,
}

struct CreatePresentation {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for CreatePresentation {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: CreateParams = parse_arguments(arguments)?;
        let url = format!("{}/presentations", self.api.config().slides_base);
        let created = self
            .api
            .post(&url, &json!({"title": params.title}), credential)
            .await?;

        let id = created
            .get("presentationId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(json!({
            "presentation_id": id,
            "url": format!("https://docs.google.com/presentation/d/{id}/edit"),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct PresentationParams {
    presentation_id: String,
}

struct GetPresentation {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for GetPresentation {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: PresentationParams = parse_arguments(arguments)?;
        let presentation = self
            .api
            .get(&presentation_url(&self.api, &params.presentation_id), credential)
            .await?;

        let slides: Vec<Value> = slide_list(&presentation)
            .iter()
            .enumerate()
            .map(|(index, slide)| {
                json!({
                    "index": index,
                    "object_id": slide.get("objectId"),
                    "text": slide_text(slide),
                })
            })
            .collect();

        Ok(json!({
            "presentation_id": params.presentation_id,
            "title": presentation.get("title").and_then(Value::as_str).unwrap_or_default(),
            "slide_count": slides.len(),
            "slides": slides,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AddSlideParams {
    presentation_id: String,
    #[serde(default = "default_layout")]
    layout: String,
}

fn default_layout() -> String {
    "BLANK".to_string()
}

struct AddSlide {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for AddSlide {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: AddSlideParams = parse_arguments(arguments)?;
        let url = presentation_url(&self.api, &params.presentation_id);
        let presentation = self.api.get(&url, credential).await?;

        // Unknown layouts fall back to the presentation's default.
        let layout_id = find_layout(&presentation, &params.layout);
        let mut create = json!({});
        if let Some(layout_id) = layout_id {
            create["slideLayoutReference"] = json!({"layoutId": layout_id});
        }
        let response = self
            .api
            .post(
                &format!("{url}:batchUpdate"),
                &json!({"requests": [{"createSlide": create}]}),
                credential,
            )
            .await?;

        Ok(json!({
            "slide_id": response.pointer("/replies/0/createSlide/objectId"),
            "layout_applied": layout_id.is_some(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AddTextParams {
    presentation_id: String,
    slide_index: usize,
    text: String,
    #[serde(default = "default_offset")]
    x: f64,
    #[serde(default = "default_offset")]
    y: f64,
    #[serde(default = "default_width")]
    width: f64,
    #[serde(default = "default_height")]
    height: f64,
}

fn default_offset() -> f64 {
    100.0
}

fn default_width() -> f64 {
    400.0
}

fn default_height() -> f64 {
    200.0
}

fn text_box_requests(box_id: &str, slide_id: &str, params: &AddTextParams) -> Value {
    json!({
        "requests": [
            {"createShape": {
                "objectId": box_id,
                "shapeType": "TEXT_BOX",
                "elementProperties": {
                    "pageObjectId": slide_id,
                    "size": {
                        "width": {"magnitude": params.width, "unit": "PT"},
                        "height": {"magnitude": params.height, "unit": "PT"}
                    },
                    "transform": {
                        "scaleX": 1, "scaleY": 1,
                        "translateX": params.x, "translateY": params.y,
                        "unit": "PT"
                    }
                }
            }},
            {"insertText": {"objectId": box_id, "text": params.text}}
        ]
    })
}

struct AddTextToSlide {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for AddTextToSlide {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: AddTextParams = parse_arguments(arguments)?;
        let url = presentation_url(&self.api, &params.presentation_id);
        let presentation = self.api.get(&url, credential).await?;
        let slide_id = slide_object_id(&presentation, params.slide_index)?;

        let box_id = format!("textbox_{}", uuid::Uuid::new_v4().simple());
        self.api
            .post(
                &format!("{url}:batchUpdate"),
                &text_box_requests(&box_id, &slide_id, &params),
                credential,
            )
            .await?;

        Ok(json!({
            "slide_index": params.slide_index,
            "slide_id": slide_id,
            "text_box_id": box_id,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SlideParams {
    presentation_id: String,
    slide_index: usize,
}

struct DeleteSlide {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for DeleteSlide {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: SlideParams = parse_arguments(arguments)?;
        let url = presentation_url(&self.api, &params.presentation_id);
        let presentation = self.api.get(&url, credential).await?;
        let slide_id = slide_object_id(&presentation, params.slide_index)?;

        self.api
            .post(
                &format!("{url}:batchUpdate"),
                &json!({"requests": [{"deleteObject": {"objectId": slide_id}}]}),
                credential,
            )
            .await?;

        Ok(json!({
            "deleted": true,
            "slide_index": params.slide_index,
            "slide_id": slide_id,
        }))
    }
}
