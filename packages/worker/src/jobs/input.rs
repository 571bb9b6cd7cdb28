//! Versioned view of the job's metadata blob.
//!
//! The metadata carries the raw client inventory/tools payloads. Older
//! submissions used the keys `csv1_json`/`csv2_json`; the migration to the
//! current `inventory_json`/`tools_json` shape happens here, once, when the
//! orchestrator enters its first phase.

use serde_json::Value;

use super::JobError;

/// Typed client input extracted from job metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInput {
    /// Raw JSON text of the client's vehicle inventory (an array).
    pub inventory_json: String,
    /// Raw JSON text of the client's tools list (an array).
    pub tools_json: String,
}

impl JobInput {
    /// Parse the metadata blob, migrating the legacy key shape if present.
    ///
    /// Legacy jobs stored the payloads positionally: `csv1_json` held the
    /// inventory and `csv2_json` the tools.
    pub fn from_metadata(metadata: &Value) -> Result<Self, JobError> {
        let object = metadata.as_object().ok_or_else(|| {
            JobError::InvalidInput("metadata is not a JSON object".to_string())
        })?;

        let inventory_key = if object.contains_key("inventory_json") {
            "inventory_json"
        } else {
            "csv1_json"
        };
        let tools_key = if object.contains_key("tools_json") {
            "tools_json"
        } else {
            "csv2_json"
        };

        let inventory_json = string_field(object, inventory_key)?;
        let tools_json = string_field(object, tools_key)?;

        Ok(Self {
            inventory_json,
            tools_json,
        })
    }
}

fn string_field(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<String, JobError> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(JobError::InvalidInput(format!(
            "metadata key '{key}' is not a string"
        ))),
        None => {
            let available: Vec<&str> = object.keys().map(String::as_str).collect();
            Err(JobError::InvalidInput(format!(
                "metadata key '{key}' not found, available keys: {available:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_current_key_shape() {
        let metadata = json!({
            "inventory_json": "[{\"vin\": \"1\"}]",
            "tools_json": "[]",
            "submitted_at": "2026-08-01T00:00:00Z",
        });

        let input = JobInput::from_metadata(&metadata).unwrap();
        assert_eq!(input.inventory_json, "[{\"vin\": \"1\"}]");
        assert_eq!(input.tools_json, "[]");
    }

    #[test]
    fn migrates_legacy_key_shape() {
        let metadata = json!({
            "csv1_json": "[1, 2, 3]",
            "csv2_json": "[4]",
        });

        let input = JobInput::from_metadata(&metadata).unwrap();
        assert_eq!(input.inventory_json, "[1, 2, 3]");
        assert_eq!(input.tools_json, "[4]");
    }

    #[test]
    fn current_keys_win_over_legacy_keys() {
        let metadata = json!({
            "inventory_json": "[\"new\"]",
            "csv1_json": "[\"old\"]",
            "tools_json": "[]",
            "csv2_json": "[\"old\"]",
        });

        let input = JobInput::from_metadata(&metadata).unwrap();
        assert_eq!(input.inventory_json, "[\"new\"]");
        assert_eq!(input.tools_json, "[]");
    }

    #[test]
    fn missing_payload_reports_available_keys() {
        let metadata = json!({ "submitted_at": "2026-08-01T00:00:00Z" });

        let err = JobInput::from_metadata(&metadata).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("csv1_json"));
        assert!(message.contains("submitted_at"));
    }

    #[test]
    fn non_object_metadata_is_invalid() {
        let err = JobInput::from_metadata(&json!("not an object")).unwrap_err();
        assert!(matches!(err, JobError::InvalidInput(_)));
    }
}
