//! Payload Validation
//!
//! Structural checks on an action payload:
//!
//! 1. **Injection**: string fields containing `<script>`, `javascript:`,
//!    `eval(` or `exec(` (case-insensitive)
//! 2. **Size**: string fields longer than 10,000 characters, and payloads
//!    whose JSON encoding exceeds 100,000 bytes
//! 3. **Required fields**: keys the action type must carry
//!
//! Nested objects and arrays are walked; a flag is reported against the
//! top-level field that contains the offending string or key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::context::Payload;

/// Maximum length of a string field in characters
pub const MAX_FIELD_LENGTH: usize = 10_000;

/// Maximum size of the whole payload, as encoded JSON bytes
pub const MAX_PAYLOAD_BYTES: usize = 100_000;

/// Failed check for a payload over [`MAX_PAYLOAD_BYTES`]
pub const OVERSIZED_PAYLOAD_CHECK: &str = "oversized_payload";

/// Substrings that flag a field as a potential injection
pub const INJECTION_PATTERNS: [&str; 4] = ["<script>", "javascript:", "eval(", "exec("];

/// Outcome of payload validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadCheckResult {
    pub valid: bool,
    pub failed_checks: Vec<String>,
    pub fields_checked: usize,
}

/// Default required-field table
pub fn default_required_fields() -> BTreeMap<String, Vec<String>> {
    [
        ("secret_rotation", vec!["secret_id", "new_value"]),
        ("configuration_change", vec!["config_key", "new_value"]),
        ("file_deletion", vec!["file_path"]),
        ("service_restart", vec!["service_name"]),
    ]
    .into_iter()
    .map(|(action, fields)| {
        (
            action.to_string(),
            fields.into_iter().map(str::to_string).collect(),
        )
    })
    .collect()
}

/// Validates payloads against injection, size and required-field rules
#[derive(Debug, Clone)]
pub struct PayloadValidator {
    required_fields: BTreeMap<String, Vec<String>>,
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new(default_required_fields())
    }
}

impl PayloadValidator {
    /// Create a validator with a custom required-field table
    pub fn new(required_fields: BTreeMap<String, Vec<String>>) -> Self {
        Self { required_fields }
    }

    /// Required fields for an action type
    pub fn required_fields(&self, action_type: &str) -> &[String] {
        self.required_fields
            .get(action_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Validate a payload for the given action type
    ///
    /// Field flags come out in key order, followed by missing-field flags in
    /// table order.
    pub fn validate(&self, action_type: &str, payload: &Payload) -> PayloadCheckResult {
        let mut failed_checks = Vec::new();

        for (field, value) in payload {
            let mut scan = FieldScan::default();
            scan.visit(value);

            if scan.injection {
                failed_checks.push(format!("potential_injection_in_{}", field));
            }
            if scan.oversized {
                failed_checks.push(format!("oversized_payload_in_{}", field));
            }
        }

        if encoded_len(payload) > MAX_PAYLOAD_BYTES {
            failed_checks.push(OVERSIZED_PAYLOAD_CHECK.to_string());
        }

        for required in self.required_fields(action_type) {
            if !payload.contains_key(required) {
                failed_checks.push(format!("missing_required_field_{}", required));
            }
        }

        PayloadCheckResult {
            valid: failed_checks.is_empty(),
            failed_checks,
            fields_checked: payload.len(),
        }
    }
}

/// Flags gathered from one top-level field and everything nested in it
#[derive(Default)]
struct FieldScan {
    injection: bool,
    oversized: bool,
}

impl FieldScan {
    fn visit(&mut self, value: &Value) {
        match value {
            Value::String(text) => self.check_text(text),
            Value::Array(items) => items.iter().for_each(|item| self.visit(item)),
            Value::Object(fields) => {
                for (key, nested) in fields {
                    self.check_text(key);
                    self.visit(nested);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    fn check_text(&mut self, text: &str) {
        self.injection |= contains_injection(text);
        self.oversized |= text.chars().count() > MAX_FIELD_LENGTH;
    }
}

/// Length of the payload's JSON encoding
fn encoded_len(payload: &Payload) -> usize {
    serde_json::to_vec(payload).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
}

fn contains_injection(text: &str) -> bool {
    let lower = text.to_lowercase();
    INJECTION_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(pairs: &[(&str, Value)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_clean_payload_is_valid() {
        let validator = PayloadValidator::default();
        let result = validator.validate(
            "read_logs",
            &payload(&[("path", json!("/var/log/app.log")), ("lines", json!(100))]),
        );
        assert!(result.valid);
        assert!(result.failed_checks.is_empty());
        assert_eq!(result.fields_checked, 2);
    }

    #[test]
    fn test_detects_injection_patterns() {
        let validator = PayloadValidator::default();
        for bad in [
            "<script>alert(1)</script>",
            "JavaScript:void(0)",
            "eval(atob('x'))",
            "os.EXEC(cmd)",
        ] {
            let result = validator.validate("note", &payload(&[("body", json!(bad))]));
            assert!(!result.valid, "{bad} should be flagged");
            assert_eq!(result.failed_checks, vec!["potential_injection_in_body"]);
        }
    }

    #[test]
    fn test_script_field_name() {
        let validator = PayloadValidator::default();
        let result = validator.validate(
            "note",
            &payload(&[("script", json!("<script>alert(1)</script>"))]),
        );
        assert!(result
            .failed_checks
            .contains(&"potential_injection_in_script".to_string()));
    }

    #[test]
    fn test_oversized_field() {
        let validator = PayloadValidator::default();
        let exact = "a".repeat(MAX_FIELD_LENGTH);
        let over = "a".repeat(MAX_FIELD_LENGTH + 1);
        assert!(validator.validate("note", &payload(&[("blob", json!(exact))])).valid);

        let result = validator.validate("note", &payload(&[("blob", json!(over))]));
        assert_eq!(result.failed_checks, vec!["oversized_payload_in_blob"]);
    }

    #[test]
    fn test_non_string_values_are_not_scanned() {
        let validator = PayloadValidator::default();
        let result = validator.validate(
            "note",
            &payload(&[("count", json!(5)), ("enabled", json!(true))]),
        );
        assert!(result.valid);
    }

    #[test]
    fn test_nested_strings_are_scanned() {
        let validator = PayloadValidator::default();
        let result = validator.validate(
            "note",
            &payload(&[
                ("cmd", json!({"inner": "<script>alert(1)</script>"})),
                ("list", json!(["safe", ["eval(x)"]])),
                ("opts", json!({"retries": 3, "javascript:go": true})),
            ]),
        );
        assert!(!result.valid);
        assert_eq!(
            result.failed_checks,
            vec![
                "potential_injection_in_cmd",
                "potential_injection_in_list",
                "potential_injection_in_opts"
            ]
        );
        assert_eq!(result.fields_checked, 3);
    }

    #[test]
    fn test_nested_oversized_string() {
        let validator = PayloadValidator::default();
        let over = "a".repeat(MAX_FIELD_LENGTH + 1);
        let result = validator.validate("note", &payload(&[("blob", json!({"parts": [over]}))]));
        assert_eq!(result.failed_checks, vec!["oversized_payload_in_blob"]);
    }

    #[test]
    fn test_aggregate_payload_size() {
        let validator = PayloadValidator::default();
        let chunk = "a".repeat(MAX_FIELD_LENGTH - 10);
        let fields: Vec<(String, Value)> = (0..11)
            .map(|i| (format!("part_{:02}", i), json!(chunk)))
            .collect();
        let big: Payload = fields.into_iter().collect();

        let result = validator.validate("note", &big);
        assert!(!result.valid);
        assert_eq!(result.failed_checks, vec![OVERSIZED_PAYLOAD_CHECK]);

        let small: Payload = big.into_iter().take(9).collect();
        assert!(validator.validate("note", &small).valid);
    }

    #[test]
    fn test_missing_required_fields() {
        let validator = PayloadValidator::default();
        let result = validator.validate("secret_rotation", &payload(&[("secret_id", json!("db"))]));
        assert!(!result.valid);
        assert_eq!(result.failed_checks, vec!["missing_required_field_new_value"]);

        let result = validator.validate("secret_rotation", &Payload::new());
        assert_eq!(
            result.failed_checks,
            vec![
                "missing_required_field_secret_id",
                "missing_required_field_new_value"
            ]
        );
    }

    #[test]
    fn test_custom_required_fields() {
        let mut table = BTreeMap::new();
        table.insert("deploy".to_string(), vec!["image".to_string()]);
        let validator = PayloadValidator::new(table);
        assert_eq!(validator.required_fields("deploy"), ["image".to_string()]);
        assert!(validator.required_fields("secret_rotation").is_empty());
        assert!(!validator.validate("deploy", &Payload::new()).valid);
    }
}
