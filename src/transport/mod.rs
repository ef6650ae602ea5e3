//! Transport for plugin API calls

mod http;

pub use self::http::HttpTransport;

use serde_json::Value;

use crate::Result;
use crate::plugin::HttpMethod;

/// A fully routed plugin API request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// URL with path placeholders substituted
    pub url: String,
    /// Query parameters in declaration order
    pub query: Vec<(String, String)>,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Cookies
    pub cookies: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Request without parameters or body
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    /// First header value with the given name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value for the `Cookie` header, if any cookies are set
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Raw plugin API response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body text
    pub text: String,
}

impl HttpResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the body is not JSON.
    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.text)?)
    }
}

/// Issues plugin API requests
///
/// One call is one round trip. Implementations must not retry.
pub trait Transport: Send + Sync {
    /// Send a request and wait for the response
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let mut request = HttpRequest::new(HttpMethod::Get, "https://example.com");
        assert_eq!(request.cookie_header(), None);
        request.cookies.push(("session".to_string(), "abc".to_string()));
        request.cookies.push(("lang".to_string(), "en".to_string()));
        assert_eq!(request.cookie_header().as_deref(), Some("session=abc; lang=en"));
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponse {
            status: 200,
            text: r#"{"ok": true}"#.to_string(),
        };
        assert!(response.is_success());
        assert_eq!(response.json().unwrap()["ok"], true);

        let response = HttpResponse {
            status: 500,
            text: "oops".to_string(),
        };
        assert!(!response.is_success());
        assert!(response.json().is_err());
    }
}
