//! Plugin operation invoker
//!
//! Routes call parameters to their declared locations and issues the
//! request over a [`Transport`].
//!
//! # Security
//!
//! Bearer tokens are attached to the outgoing headers only. They are never
//! logged or included in error messages.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::manifest::AuthDescriptor;
use crate::plugin::{HttpMethod, OperationDescriptor, ParameterLocation};
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::{Error, Result};

/// Executes operations against live plugin endpoints
#[derive(Clone)]
pub struct Invoker {
    transport: Arc<dyn Transport>,
}

impl Invoker {
    /// Create an invoker sending through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Call `operation` with `params`
    ///
    /// # Errors
    ///
    /// - `Error::MissingParameter` if a required path parameter or required
    ///   body property is absent; nothing is sent.
    /// - `Error::UnsupportedMethod` for methods other than GET and POST.
    /// - `Error::Transport` if the request could not be completed.
    pub fn invoke(
        &self,
        operation: &OperationDescriptor,
        params: &Map<String, Value>,
        auth: Option<&AuthDescriptor>,
        token: Option<&str>,
    ) -> Result<HttpResponse> {
        let request = build_request(operation, params, auth, token)?;

        info!(
            operation = %operation.operation_id,
            method = %request.method,
            url = %request.url,
            "Invoking plugin operation"
        );

        let response = self.transport.send(&request)?;
        debug!(operation = %operation.operation_id, status = response.status, "Operation completed");
        Ok(response)
    }
}

/// Build the request for `operation` without sending it
///
/// # Errors
///
/// Same conditions as [`Invoker::invoke`] minus transport failures.
pub fn build_request(
    operation: &OperationDescriptor,
    params: &Map<String, Value>,
    auth: Option<&AuthDescriptor>,
    token: Option<&str>,
) -> Result<HttpRequest> {
    if !matches!(operation.method, HttpMethod::Get | HttpMethod::Post) {
        return Err(Error::UnsupportedMethod(format!(
            "{} {}",
            operation.method, operation.operation_id
        )));
    }

    let mut request = HttpRequest::new(operation.method, operation.url.clone());

    for param in &operation.parameters {
        let Some(value) = params.get(&param.name).filter(|v| !v.is_null()) else {
            if param.required && param.location == ParameterLocation::Path {
                return Err(Error::MissingParameter(param.name.clone()));
            }
            continue;
        };
        let value = value_to_string(value);

        match param.location {
            ParameterLocation::Path => {
                request.url = request.url.replace(&format!("{{{}}}", param.name), &value);
            }
            ParameterLocation::Query => request.query.push((param.name.clone(), value)),
            ParameterLocation::Header => request.headers.push((param.name.clone(), value)),
            ParameterLocation::Cookie => request.cookies.push((param.name.clone(), value)),
        }
    }

    if auth.is_some_and(AuthDescriptor::uses_bearer_token) {
        request.headers.push((
            "Authorization".to_string(),
            format!("Bearer {}", token.unwrap_or_default()),
        ));
        request
            .headers
            .push(("Accept".to_string(), "application/json".to_string()));
    }

    if operation.method == HttpMethod::Post {
        request.body = build_body(operation, params)?;
        request
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
        request
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
    }

    Ok(request)
}

/// JSON body from the request-body schema's properties
///
/// Only object schemas produce a body. A property missing from `params`
/// is an error when the request body is required and is skipped
/// otherwise.
fn build_body(operation: &OperationDescriptor, params: &Map<String, Value>) -> Result<Option<Value>> {
    let Some(body) = &operation.request_body else {
        return Ok(None);
    };
    let is_object = body
        .schema()
        .and_then(|s| s.get("type"))
        .and_then(Value::as_str)
        == Some("object");
    if !is_object {
        return Ok(None);
    }

    let mut out = Map::new();
    for (name, _) in body.properties() {
        match params.get(name) {
            Some(value) => {
                out.insert(name.clone(), value.clone());
            }
            None if body.required => {
                return Err(Error::MissingParameter(name.clone()));
            }
            None => {}
        }
    }
    Ok(Some(Value::Object(out)))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
