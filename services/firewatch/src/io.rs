//! HTTP client abstraction for testability

use async_trait::async_trait;

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a GET request to the given URL
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> crate::Result<HttpResponse>;

    /// Send a DELETE request to the given URL
    async fn delete(&self, url: &str, headers: &[(&str, &str)]) -> crate::Result<HttpResponse>;

    /// Send a POST request with form-encoded body
    async fn post_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> crate::Result<HttpResponse>;

    /// Send a PUT request with form-encoded body
    async fn put_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> crate::Result<HttpResponse>;

    /// Send a POST request with a JSON document as body
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> crate::Result<HttpResponse>;

    /// Send a PUT request with a JSON document as body
    async fn put_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> crate::Result<HttpResponse>;
}

/// Production HTTP client using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        headers: &[(&str, &str)],
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send,
    ) -> crate::Result<HttpResponse> {
        tracing::debug!("{} {}", method, url);
        let mut request = self.client.request(method.clone(), url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = build(request).send().await.map_err(|e| {
            crate::FirewatchError::Http(format!("{} {} failed: {}", method, url, e))
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| crate::FirewatchError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> crate::Result<HttpResponse> {
        self.send(reqwest::Method::GET, url, headers, |r| r).await
    }

    async fn delete(&self, url: &str, headers: &[(&str, &str)]) -> crate::Result<HttpResponse> {
        self.send(reqwest::Method::DELETE, url, headers, |r| r).await
    }

    async fn post_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> crate::Result<HttpResponse> {
        self.send(reqwest::Method::POST, url, headers, |r| r.form(params))
            .await
    }

    async fn put_form(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> crate::Result<HttpResponse> {
        self.send(reqwest::Method::PUT, url, headers, |r| r.form(params))
            .await
    }

    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> crate::Result<HttpResponse> {
        let body = body.to_string();
        self.send(reqwest::Method::POST, url, headers, |r| {
            r.header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
        })
        .await
    }

    async fn put_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> crate::Result<HttpResponse> {
        let body = body.to_string();
        self.send(reqwest::Method::PUT, url, headers, |r| {
            r.header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
        })
        .await
    }
}
