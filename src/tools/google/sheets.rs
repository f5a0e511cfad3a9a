//! Sheets tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::drive::{typed_search_schema, SearchFilesOfType};
use super::{path_segment, ExportFile, ExportFormat, GoogleApi, SCOPE_DRIVE, SCOPE_SPREADSHEETS};
use crate::auth::Credential;
use crate::error::{GoogleMcpError, Result};
use crate::tools::{parse_arguments, ToolDescriptor, ToolHandler, ToolRegistry};

pub(super) fn register(registry: &mut ToolRegistry, api: &GoogleApi) -> Result<()> {
    registry.register(ToolDescriptor::new(
        "create_spreadsheet",
        "Create a new Google Sheets spreadsheet.",
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "sheet_name": {"type": "string", "description": "First sheet name (default Sheet1)"}
            },
            "required": ["title"]
        }),
        [SCOPE_SPREADSHEETS],
        Arc::new(CreateSpreadsheet { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "read_spreadsheet",
        "Read cell values. Range format: 'Sheet1!A1:D10' or 'Sheet1'.",
        json!({
            "type": "object",
            "properties": {
                "spreadsheet_id": {"type": "string"},
                "range": {"type": "string", "description": "A1 range (default Sheet1)"}
            },
            "required": ["spreadsheet_id"]
        }),
        [SCOPE_SPREADSHEETS],
        Arc::new(ReadSpreadsheet { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "update_spreadsheet",
        "Overwrite cells starting at a range. Values: 2D array, e.g. [[\"A\",\"B\"],[1,2]].",
        values_schema(),
        [SCOPE_SPREADSHEETS],
        Arc::new(WriteValues {
            api: api.clone(),
            mode: WriteMode::Update,
        }),
    ))?;
    registry.register(ToolDescriptor::new(
        "append_to_spreadsheet",
        "Append rows after the last row of a range. Values: 2D array.",
        values_schema(),
        [SCOPE_SPREADSHEETS],
        Arc::new(WriteValues {
            api: api.clone(),
            mode: WriteMode::Append,
        }),
    ))?;
    registry.register(ToolDescriptor::new(
        "search_spreadsheets",
        "Search Google Sheets spreadsheets in Drive. An empty query lists recent spreadsheets.",
        typed_search_schema(),
        [SCOPE_DRIVE],
        Arc::new(SearchFilesOfType::new(api, SPREADSHEET_MIME_TYPE)),
    ))?;
    registry.register(ToolDescriptor::new(
        "get_spreadsheet_info",
        "Get a spreadsheet's title and its sheets with their dimensions.",
        json!({
            "type": "object",
            "properties": {"spreadsheet_id": {"type": "string"}},
            "required": ["spreadsheet_id"]
        }),
        [SCOPE_SPREADSHEETS],
        Arc::new(SpreadsheetInfo { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "clear_spreadsheet_range",
        "Clear all values in a range, e.g. 'Sheet1!A1:D10'. Formatting is kept.",
        json!({
            "type": "object",
            "properties": {
                "spreadsheet_id": {"type": "string"},
                "range": {"type": "string"}
            },
            "required": ["spreadsheet_id", "range"]
        }),
        [SCOPE_SPREADSHEETS],
        Arc::new(ClearRange { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "batch_update_spreadsheet",
        "Write several ranges at once. Data: array of {range, values}, e.g. \
         [{\"range\":\"Sheet1!A1\",\"values\":[[\"X\"]]}].",
        json!({
            "type": "object",
            "properties": {
                "spreadsheet_id": {"type": "string"},
                "data": {
                    "description": "Array of {range, values}, or the same array encoded as a JSON string",
                    "oneOf": [
                        {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "range": {"type": "string"},
                                    "values": {"type": "array", "items": {"type": "array"}}
                                },
                                "required": ["range", "values"]
                            }
                        },
                        {"type": "string"}
                    ]
                }
            },
            "required": ["spreadsheet_id", "data"]
        }),
        [SCOPE_SPREADSHEETS],
        Arc::new(BatchUpdate { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "add_sheet",
        "Add a new sheet (tab) to an existing spreadsheet.",
        json!({
            "type": "object",
            "properties": {
                "spreadsheet_id": {"type": "string"},
                "sheet_name": {"type": "string"}
            },
            "required": ["spreadsheet_id", "sheet_name"]
        }),
        [SCOPE_SPREADSHEETS],
        Arc::new(AddSheet { api: api.clone() }),
    ))?;
    let export = ExportFile {
        api: api.clone(),
        id_param: "spreadsheet_id",
        formats: EXPORT_FORMATS,
        default_format: "csv",
    };
    registry.register(ToolDescriptor::new(
        "export_spreadsheet",
        "Export a spreadsheet as csv, tsv, xlsx, or pdf. csv and tsv cover the first sheet only.",
        export.schema(),
        [SCOPE_DRIVE],
        Arc::new(export),
    ))?;
    Ok(())
}

const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

const EXPORT_FORMATS: &[ExportFormat] = &[
    ExportFormat {
        name: "csv",
        mime_type: "text/csv",
        textual: true,
    },
    ExportFormat {
        name: "tsv",
        mime_type: "text/tab-separated-values",
        textual: true,
    },
    ExportFormat {
        name: "xlsx",
        mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        textual: false,
    },
    ExportFormat {
        name: "pdf",
        mime_type: "application/pdf",
        textual: false,
    },
];

fn spreadsheet_url(api: &GoogleApi, spreadsheet_id: &str) -> String {
    format!(
        "{}/spreadsheets/{}",
        api.config().sheets_base,
        path_segment(spreadsheet_id)
    )
}

fn values_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "spreadsheet_id": {"type": "string"},
            "range": {"type": "string", "description": "A1 range, e.g. Sheet1!A1"},
            "values": {
                "description": "2D array of cell values, or the same array encoded as a JSON string",
                "oneOf": [
                    {"type": "array", "items": {"type": "array"}},
                    {"type": "string"}
                ]
            }
        },
        "required": ["spreadsheet_id", "range", "values"]
    })
}

/// Accepts a 2D array directly or as a JSON-encoded string.
fn parse_values(values: Value) -> Result<Vec<Vec<Value>>> {
    let values = match values {
        Value::String(encoded) => serde_json::from_str(&encoded).map_err(|e| {
            GoogleMcpError::InvalidArguments(format!("values is not valid JSON: {e}"))
        })?,
        other => other,
    };
    serde_json::from_value(values).map_err(|_| {
        GoogleMcpError::InvalidArguments(
            "values must be a 2D array, e.g. [[\"A\",\"B\"],[\"1\",\"2\"]]".to_string(),
        )
        .into()
    })
}

/// One entry of a batch write.
#[derive(Debug, serde::Serialize, Deserialize)]
struct RangeValues {
    range: String,
    values: Vec<Vec<Value>>,
}

/// Accepts the batch list directly or as a JSON-encoded string.
fn parse_batch(data: Value) -> Result<Vec<RangeValues>> {
    let data = match data {
        Value::String(encoded) => serde_json::from_str(&encoded).map_err(|e| {
            GoogleMcpError::InvalidArguments(format!("data is not valid JSON: {e}"))
        })?,
        other => other,
    };
    serde_json::from_value(data).map_err(|_| {
        GoogleMcpError::InvalidArguments(
            "data must be an array of {range, values}, e.g. [{\"range\":\"Sheet1!A1\",\"values\":[[\"X\"]]}]"
                .to_string(),
        )
        .into()
    })
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    title: String,
    #[serde(default = "default_sheet")]
    sheet_name: String,
}

fn default_sheet() -> String {
    "Sheet1".to_string()
}

struct CreateSpreadsheet {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for CreateSpreadsheet {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: CreateParams = parse_arguments(arguments)?;
        let body = json!({
            "properties": {"title": params.title},
            "sheets": [{"properties": {"title": params.sheet_name}}],
        });
        let url = format!("{}/spreadsheets", self.api.config().sheets_base);
        let created = self.api.post(&url, &body, credential).await?;

        let id = created
            .get("spreadsheetId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(json!({
            "spreadsheet_id": id,
            "url": format!("https://docs.google.com/spreadsheets/d/{id}/edit"),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    spreadsheet_id: String,
    #[serde(default = "default_sheet")]
    range: String,
}

struct ReadSpreadsheet {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for ReadSpreadsheet {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: ReadParams = parse_arguments(arguments)?;
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.api.config().sheets_base,
            path_segment(&params.spreadsheet_id),
            path_segment(&params.range)
        );
        let response = self.api.get(&url, credential).await?;

        Ok(json!({
            "range": response.get("range").cloned().unwrap_or(Value::String(params.range)),
            "values": response.get("values").cloned().unwrap_or_else(|| json!([])),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    Update,
    Append,
}

#[derive(Debug, Deserialize)]
struct WriteParams {
    spreadsheet_id: String,
    range: String,
    values: Value,
}

struct WriteValues {
    api: GoogleApi,
    mode: WriteMode,
}

#[async_trait]
impl ToolHandler for WriteValues {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: WriteParams = parse_arguments(arguments)?;
        let values = parse_values(params.values)?;
        let base = format!(
            "{}/spreadsheets/{}/values/{}",
            self.api.config().sheets_base,
            path_segment(&params.spreadsheet_id),
            path_segment(&params.range)
        );
        let body = json!({ "values": values });

        match self.mode {
            WriteMode::Update => {
                let response = self
                    .api
                    .put_with_query(
                        &base,
                        &[("valueInputOption", "USER_ENTERED")],
                        &body,
                        credential,
                    )
                    .await?;
                Ok(json!({
                    "updated_range": response.get("updatedRange"),
                    "updated_cells": response.get("updatedCells"),
                }))
            }
            WriteMode::Append => {
                let response = self
                    .api
                    .post_with_query(
                        &format!("{base}:append"),
                        &[
                            ("valueInputOption", "USER_ENTERED"),
                            ("insertDataOption", "INSERT_ROWS"),
                        ],
                        &body,
                        credential,
                    )
                    .await?;
                let updates = response.get("updates");
                Ok(json!({
                    "updated_range": updates.and_then(|u| u.get("updatedRange")),
                    "updated_rows": updates
                        .and_then(|u| u.get("updatedRows"))
                        .cloned()
                        .unwrap_or(json!(0)),
                }))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetParams {
    spreadsheet_id: String,
}

struct SpreadsheetInfo {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for SpreadsheetInfo {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: SpreadsheetParams = parse_arguments(arguments)?;
        let meta = self
            .api
            .get_with_query(
                &spreadsheet_url(&self.api, &params.spreadsheet_id),
                &[("fields", "properties.title,sheets.properties")],
                credential,
            )
            .await?;
        Ok(summarize_spreadsheet(&params.spreadsheet_id, &meta))
    }
}

fn summarize_spreadsheet(spreadsheet_id: &str, meta: &Value) -> Value {
    let sheets: Vec<Value> = meta
        .get("sheets")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|sheet| sheet.get("properties"))
        .map(|p| {
            json!({
                "sheet_id": p.get("sheetId").cloned().unwrap_or(json!(0)),
                "title": p.get("title").and_then(Value::as_str).unwrap_or_default(),
                "rows": p.pointer("/gridProperties/rowCount").cloned().unwrap_or(json!(0)),
                "columns": p.pointer("/gridProperties/columnCount").cloned().unwrap_or(json!(0)),
            })
        })
        .collect();

    json!({
        "spreadsheet_id": spreadsheet_id,
        "title": meta.pointer("/properties/title").and_then(Value::as_str).unwrap_or_default(),
        "sheets": sheets,
    })
}

#[derive(Debug, Deserialize)]
struct ClearParams {
    spreadsheet_id: String,
    range: String,
}

struct ClearRange {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for ClearRange {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: ClearParams = parse_arguments(arguments)?;
        let url = format!(
            "{}/values/{}:clear",
            spreadsheet_url(&self.api, &params.spreadsheet_id),
            path_segment(&params.range)
        );
        let response = self.api.post(&url, &json!({}), credential).await?;
        Ok(json!({
            "cleared_range": response
                .get("clearedRange")
                .cloned()
                .unwrap_or(Value::String(params.range)),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct BatchParams {
    spreadsheet_id: String,
    data: Value,
}

struct BatchUpdate {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for BatchUpdate {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: BatchParams = parse_arguments(arguments)?;
        let data = parse_batch(params.data)?;
        let url = format!(
            "{}/values:batchUpdate",
            spreadsheet_url(&self.api, &params.spreadsheet_id)
        );
        let body = json!({"valueInputOption": "USER_ENTERED", "data": data});
        let response = self.api.post(&url, &body, credential).await?;

        Ok(json!({
            "updated_ranges": data.len(),
            "updated_cells": response.get("totalUpdatedCells").cloned().unwrap_or(json!(0)),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AddSheetParams {
    spreadsheet_id: String,
    sheet_name: String,
}

struct AddSheet {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for AddSheet {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: AddSheetParams = parse_arguments(arguments)?;
        let url = format!(
            "{}:batchUpdate",
            spreadsheet_url(&self.api, &params.spreadsheet_id)
        );
        let body = json!({
            "requests": [{"addSheet": {"properties": {"title": params.sheet_name}}}]
        });
        let response = self.api.post(&url, &body, credential).await?;

        Ok(json!({
            "sheet_id": response.pointer("/replies/0/addSheet/properties/sheetId"),
            "title": params.sheet_name,
        }))
    }
}
