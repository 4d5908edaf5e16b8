//! Accepted key spellings for tenant metadata fields.
//!
//! Tenant metadata documents were written by several generations of tooling,
//! so each field is accepted under camelCase and snake_case spellings. The
//! first spelling present in the document wins.

use serde_json::Value;

use crate::stores::Metadata;

/// Keys holding the secret reference for the upstream API credential.
pub const API_CREDENTIAL_REF_KEYS: &[&str] =
    &["apiKeySecret", "api_key_secret", "apiKeySecretName", "api_key_secret_name"];

/// Keys holding the secret reference for the webhook verification secret.
pub const WEBHOOK_SECRET_REF_KEYS: &[&str] =
    &["webhookSecret", "webhook_secret", "webhookSecretName", "webhook_secret_name"];

/// Keys holding the category id whose tasks are eligible for automation.
pub const AUTOMATED_TASKS_CATEGORY_KEYS: &[&str] =
    &["automatedTasksCategoryId", "automated_tasks_category_id"];

/// Keys holding the tenant's general-ledger mapping.
pub const GL_MAPPING_KEYS: &[&str] = &["glMapping", "gl_mapping"];

/// Returns the first non-null value stored under any of `keys`.
pub fn first_value<'a>(metadata: &'a Metadata, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| metadata.get(*key)).find(|value| !value.is_null())
}

/// Returns the first scalar stored under any of `keys`, rendered as a string.
///
/// Strings are trimmed; empty strings count as absent. Integers are rendered
/// in decimal so `42` and `"42"` compare equal.
pub fn first_scalar(metadata: &Metadata, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|key| metadata.get(*key)).find_map(scalar_to_string)
}

/// Renders a JSON scalar as a non-empty string.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        },
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
