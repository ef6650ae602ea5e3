//! Plugin manifest (`/.well-known/ai-plugin.json`)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Auth types that receive a bearer token on every call
const BEARER_AUTH_TYPES: [&str; 3] = ["service_http", "user_http", "oauth"];

/// Plugin identity and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest schema version
    pub schema_version: String,
    /// Name the model uses as the call namespace
    pub name_for_model: String,
    /// Display name
    pub name_for_human: String,
    /// Description placed in the prompt
    pub description_for_model: String,
    /// Display description
    pub description_for_human: String,
    /// Auth descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthDescriptor>,
    /// Pointer to the `OpenAPI` document
    pub api: ApiDescriptor,
    /// Logo URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// Contact email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    /// Legal info URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_info_url: Option<String>,
}

/// Manifest auth section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthDescriptor {
    /// `none`, `service_http`, `user_http` or `oauth`
    #[serde(rename = "type")]
    pub auth_type: String,
    /// OAuth scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    /// Remaining keys (`authorization_url`, `verification_tokens`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AuthDescriptor {
    /// Whether calls must carry `Authorization: Bearer ...`
    #[must_use]
    pub fn uses_bearer_token(&self) -> bool {
        BEARER_AUTH_TYPES
            .iter()
            .any(|t| self.auth_type.eq_ignore_ascii_case(t))
    }
}

/// Manifest api section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    /// Document type, usually `openapi`
    #[serde(rename = "type")]
    pub api_type: String,
    /// Spec URL, possibly relative to the plugin base URL
    pub url: String,
    /// Whether the API authenticates end users
    #[serde(default)]
    pub has_user_authentication: bool,
}

impl Manifest {
    /// Parse and validate a manifest from a JSON value
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` when required fields are missing or empty.
    pub fn from_value(value: Value) -> Result<Self> {
        let manifest: Self = serde_json::from_value(value)
            .map_err(|e| Error::Parse(format!("Invalid plugin manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate a manifest from JSON text
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` when the text is not JSON or fails validation.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Parse(format!("Plugin manifest is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    fn validate(&self) -> Result<()> {
        if self.name_for_model.trim().is_empty() {
            return Err(Error::Parse("Manifest name_for_model is empty".to_string()));
        }
        if self.name_for_model.contains('.') {
            return Err(Error::Parse(format!(
                "Manifest name_for_model '{}' must not contain '.'",
                self.name_for_model
            )));
        }
        if self.api.url.trim().is_empty() {
            return Err(Error::Parse("Manifest api.url is empty".to_string()));
        }
        Ok(())
    }

    /// Copy of this manifest pointing at a different spec URL
    #[must_use]
    pub fn with_api_url(&self, url: impl Into<String>) -> Self {
        Self {
            api: ApiDescriptor {
                url: url.into(),
                ..self.api.clone()
            },
            ..self.clone()
        }
    }

    /// Whether calls to this plugin carry a bearer token
    #[must_use]
    pub fn uses_bearer_token(&self) -> bool {
        self.auth
            .as_ref()
            .is_some_and(AuthDescriptor::uses_bearer_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest_json(auth: Value) -> Value {
        json!({
            "schema_version": "v1",
            "name_for_model": "todo",
            "name_for_human": "TODO List",
            "description_for_model": "Manage a TODO list.",
            "description_for_human": "Manage your TODOs.",
            "auth": auth,
            "api": {"type": "openapi", "url": "/openapi.yaml"},
            "logo_url": "https://example.com/logo.png"
        })
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_value(manifest_json(json!({"type": "none"}))).unwrap();
        assert_eq!(manifest.name_for_model, "todo");
        assert_eq!(manifest.api.url, "/openapi.yaml");
        assert!(!manifest.api.has_user_authentication);
        assert!(!manifest.uses_bearer_token());
        assert_eq!(manifest.contact_email, None);
    }

    #[test]
    fn test_missing_required_field() {
        let mut value = manifest_json(json!({"type": "none"}));
        value.as_object_mut().unwrap().remove("description_for_model");
        let err = Manifest::from_value(value).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("description_for_model"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut value = manifest_json(json!({"type": "none"}));
        value["name_for_model"] = json!("  ");
        assert!(matches!(Manifest::from_value(value), Err(Error::Parse(_))));
    }

    #[test]
    fn test_bearer_auth_types() {
        for auth_type in ["oauth", "OAuth", "service_http", "USER_HTTP"] {
            let manifest =
                Manifest::from_value(manifest_json(json!({"type": auth_type}))).unwrap();
            assert!(manifest.uses_bearer_token(), "{auth_type}");
        }
        let manifest = Manifest::from_value(manifest_json(json!(null))).unwrap();
        assert!(!manifest.uses_bearer_token());
    }

    #[test]
    fn test_auth_extra_keys_kept() {
        let manifest = Manifest::from_value(manifest_json(json!({
            "type": "oauth",
            "scopes": "read write",
            "authorization_url": "https://example.com/auth"
        })))
        .unwrap();
        let auth = manifest.auth.unwrap();
        assert_eq!(auth.scopes.as_deref(), Some("read write"));
        assert_eq!(auth.extra["authorization_url"], "https://example.com/auth");
    }

    #[test]
    fn test_with_api_url_leaves_original() {
        let manifest = Manifest::from_value(manifest_json(json!({"type": "none"}))).unwrap();
        let resolved = manifest.with_api_url("https://example.com/openapi.yaml");
        assert_eq!(resolved.api.url, "https://example.com/openapi.yaml");
        assert_eq!(manifest.api.url, "/openapi.yaml");
        assert_eq!(resolved.name_for_model, manifest.name_for_model);
    }
}
