//! Blocking HTTP transport backed by reqwest

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{Method, header};
use tracing::debug;

use super::{HttpRequest, HttpResponse, Transport};
use crate::plugin::HttpMethod;
use crate::{Error, Result};

/// reqwest transport
///
/// No timeout unless one is configured: a slow plugin blocks the caller
/// for as long as the server takes.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with an optional overall request timeout
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the TLS backend cannot be initialised.
    pub fn new(timeout: Option<Duration>, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Post => Method::POST,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(to_method(request.method), &request.url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookies) = request.cookie_header() {
            builder = builder.header(header::COOKIE, cookies);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %request.url, "Sending plugin request");

        let response = builder
            .send()
            .map_err(|e| Error::Transport(format!("Request failed: {e}")))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| Error::Transport(format!("Failed to read response body: {e}")))?;

        debug!(url = %request.url, status, bytes = text.len(), "Plugin responded");
        Ok(HttpResponse { status, text })
    }
}
