//! Tool catalog: static schemas plus dispatch into the scan facade.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::ScanGateError;
use crate::upstream::{MAX_BATCH_IDS, ScanService};

/// Tools exposed over `tools/list` and `tools/call`.
pub struct ToolCatalog {
    service: Arc<ScanService>,
}

impl ToolCatalog {
    pub fn new(service: Arc<ScanService>) -> Self {
        Self { service }
    }

    /// Static tool definitions.
    pub fn list(&self) -> Value {
        json!({
            "tools": [
                {
                    "name": "scan_content",
                    "description": "Submit content to the threat-scanning service and return the submission receipt",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "url": { "type": "string", "description": "URL to scan" },
                            "content": { "type": "string", "description": "Inline content to scan" }
                        }
                    }
                },
                {
                    "name": "get_scan_results",
                    "description": "Fetch verdicts for previously submitted scans",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "ids": {
                                "type": "array",
                                "items": { "type": "string" },
                                "maxItems": MAX_BATCH_IDS,
                                "description": "Scan ids to look up"
                            }
                        },
                        "required": ["ids"]
                    }
                },
                {
                    "name": "get_scan_reports",
                    "description": "Fetch full reports for previously submitted scans",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "ids": {
                                "type": "array",
                                "items": { "type": "string" },
                                "maxItems": MAX_BATCH_IDS,
                                "description": "Scan ids to look up"
                            }
                        },
                        "required": ["ids"]
                    }
                }
            ]
        })
    }

    /// Dispatch a `tools/call`.
    pub async fn call(&self, name: &str, arguments: Option<&Value>) -> Result<Value, ScanGateError> {
        let result = match name {
            "scan_content" => {
                let payload = arguments.cloned().unwrap_or_else(|| json!({}));
                self.service.submit_scan(&payload).await?
            }
            "get_scan_results" => {
                let ids = parse_ids(arguments)?;
                self.service.get_results(&ids).await?
            }
            "get_scan_reports" => {
                let ids = parse_ids(arguments)?;
                self.service.get_reports(&ids).await?
            }
            other => {
                return Err(ScanGateError::Validation {
                    details: format!("unknown tool '{other}'"),
                });
            }
        };

        Ok(json!({
            "content": [{ "type": "text", "text": result.to_string() }],
            "isError": false
        }))
    }
}

fn parse_ids(arguments: Option<&Value>) -> Result<Vec<String>, ScanGateError> {
    let ids = arguments
        .and_then(|a| a.get("ids"))
        .and_then(Value::as_array)
        .ok_or_else(|| ScanGateError::Validation {
            details: "'ids' must be an array of strings".to_string(),
        })?;
    ids.iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| ScanGateError::Validation {
                    details: "'ids' must contain only strings".to_string(),
                })
        })
        .collect()
}
