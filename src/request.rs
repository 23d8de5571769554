//! Request preparation for the external transport.

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::document::{RequestBody, RequestSpec};
use crate::error::CaseError;

/// Methods the loader and `prepare` accept.
pub const KNOWN_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS",
];

/// Fully resolved request, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub params: JsonMap<String, JsonValue>,
    pub headers: JsonMap<String, JsonValue>,
    pub body: Option<RequestBody>,
}

impl RequestSpec {
    /// Finalizes this (already template-resolved) request against an
    /// optional base URL.
    ///
    /// An absolute `url` wins over `path`; a bare `path` needs a base URL.
    /// A JSON body forces the `content-type: application/json` header
    /// unless the author set one.
    pub fn prepare(&self, base_url: Option<&str>) -> Result<PreparedRequest, CaseError> {
        let method = self.method.to_ascii_uppercase();
        if !KNOWN_METHODS.contains(&method.as_str()) {
            return Err(CaseError::Spec(format!(
                "unknown request method '{}'",
                self.method
            )));
        }

        let url = match (&self.url, &self.path) {
            (Some(url), _) => url.clone(),
            (None, Some(path)) => {
                let base = base_url.ok_or_else(|| {
                    CaseError::Spec(format!(
                        "request path '{path}' needs a base URL"
                    ))
                })?;
                format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
            }
            (None, None) => {
                return Err(CaseError::Spec(
                    "request has neither url nor path".to_string(),
                ))
            }
        };

        let mut headers = self.headers.clone();
        if matches!(self.body, Some(RequestBody::Json(_))) {
            let has_content_type = headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                headers.insert(
                    "content-type".to_string(),
                    JsonValue::String("application/json".to_string()),
                );
            }
        }

        Ok(PreparedRequest {
            method,
            url,
            params: self.params.clone(),
            headers,
            body: self.body.clone(),
        })
    }
}
