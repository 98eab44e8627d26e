//! Prompt catalog.

use serde_json::{Value, json};

use crate::error::ScanGateError;

/// Prompts exposed over `prompts/list` and `prompts/get`.
#[derive(Debug, Default)]
pub struct PromptCatalog;

impl PromptCatalog {
    pub fn new() -> Self {
        Self
    }

    pub fn list(&self) -> Value {
        json!({
            "prompts": [
                {
                    "name": "analyze_verdict",
                    "description": "Summarize a scan verdict and recommend a disposition",
                    "arguments": [
                        {
                            "name": "verdict_json",
                            "description": "Raw verdict object as returned by get_scan_results",
                            "required": true
                        }
                    ]
                }
            ]
        })
    }

    pub fn get(&self, name: &str, arguments: Option<&Value>) -> Result<Value, ScanGateError> {
        match name {
            "analyze_verdict" => {
                let verdict = arguments
                    .and_then(|a| a.get("verdict_json"))
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                Ok(json!({
                    "description": "Summarize a scan verdict and recommend a disposition",
                    "messages": [
                        {
                            "role": "user",
                            "content": {
                                "type": "text",
                                "text": format!(
                                    "Review the following threat-scan verdict and recommend \
                                     whether to allow, quarantine, or block the content. \
                                     Verdict:\n{verdict}"
                                )
                            }
                        }
                    ]
                }))
            }
            other => Err(ScanGateError::Validation {
                details: format!("unknown prompt '{other}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_contains_analyze_verdict() {
        let listing = PromptCatalog::new().list();
        assert_eq!(listing["prompts"][0]["name"], "analyze_verdict");
    }

    #[test]
    fn test_get_interpolates_verdict() {
        let args = json!({"verdict_json": "{\"verdict\":\"malicious\"}"});
        let prompt = PromptCatalog::new().get("analyze_verdict", Some(&args)).unwrap();
        let text = prompt["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("malicious"));
    }

    #[test]
    fn test_get_unknown_prompt_is_a_validation_error() {
        let err = PromptCatalog::new().get("nope", None).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
