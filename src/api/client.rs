//! Authenticated HTTP client for the clinic REST API
//!
//! Wraps reqwest::Client with bearer-token injection and status mapping.

use serde::Serialize;

use crate::error::ClientError;

/// Bearer-authenticated client for the `/chat` and `/video` endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET with bearer auth.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        let url = self.url(path);
        tracing::debug!("API GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("GET {} failed: {}", url, e)))?;

        check_response(resp, &url).await
    }

    /// POST a JSON body with bearer auth.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.url(path);
        tracing::debug!("API POST {}", url);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("POST {} failed: {}", url, e)))?;

        check_response(resp, &url).await
    }

    /// PUT a JSON body with bearer auth.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.url(path);
        tracing::debug!("API PUT {}", url);

        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("PUT {} failed: {}", url, e)))?;

        check_response(resp, &url).await
    }
}

/// Reject ids that would escape their path segment.
pub(crate) fn path_segment(id: &str) -> Result<&str, ClientError> {
    let id = id.trim();
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(ClientError::Validation(format!(
            "invalid appointment id '{}'",
            id
        )));
    }
    Ok(id)
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ClientError::Auth(format!(
            "{} for {}. Session may be invalid -- run 'consult-cli login'.",
            status.as_u16(),
            url
        )));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Transport(format!(
            "HTTP {} for {}: {}",
            status.as_u16(),
            url,
            body
        )));
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:5001/api/", "t");
        assert_eq!(
            client.url("/video/token"),
            "http://localhost:5001/api/video/token"
        );
    }

    #[test]
    fn test_path_segment_validation() {
        assert_eq!(path_segment(" apt_1 ").unwrap(), "apt_1");
        assert!(matches!(path_segment(""), Err(ClientError::Validation(_))));
        assert!(matches!(
            path_segment("../admin"),
            Err(ClientError::Validation(_))
        ));
    }
}
