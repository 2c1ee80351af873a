use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum HospitalApiError {
    #[error("Hospital API unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Hospital API error ({status}): {body}")]
    Status { status: StatusCode, body: String },

    #[error("Unexpected hospital API payload: {0}")]
    Decode(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

/// Thin HTTP client for the hospital appointment backend.
pub struct HospitalApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HospitalApiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.hospital_api_url.trim_end_matches('/').to_string(),
            api_key: config.hospital_api_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, HospitalApiError> {
        let mut headers = HeaderMap::new();

        if !self.api_key.is_empty() {
            let key = HeaderValue::from_str(&self.api_key)
                .map_err(|e| HospitalApiError::InvalidHeader(e.to_string()))?;
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| HospitalApiError::InvalidHeader(e.to_string()))?;
            headers.insert(AUTHORIZATION, bearer);
        }

        Ok(headers)
    }

    /// Sends a request and decodes a successful JSON body into `T`.
    ///
    /// Non-2xx responses come back as [`HospitalApiError::Status`] with the raw body so callers
    /// can classify business errors themselves.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        auth_token: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, HospitalApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, &url)
            .headers(self.get_headers(auth_token)?);

        if !query.is_empty() {
            req = req.query(query);
        }

        if let Some(body_data) = body {
            req = req.json(body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Hospital API error ({}): {}", status, body);
            return Err(HospitalApiError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| HospitalApiError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use shared_utils::test_utils::TestConfig;

    #[tokio::test]
    async fn test_request_sends_auth_headers_and_query() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments/slots"))
            .and(query_param("specialty_id", "CARD"))
            .and(header("apikey", "test-api-key"))
            .and(header("authorization", "Bearer patient-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HospitalApiClient::new(&TestConfig::with_backend(&mock_server.uri()).to_app_config());
        let result: Vec<Value> = client
            .request::<_, ()>(
                Method::GET,
                "/appointments/slots",
                &[("specialty_id", "CARD".to_string())],
                Some("patient-token"),
                None,
            )
            .await
            .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_request_surfaces_status_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/appointments/reservations"))
            .respond_with(ResponseTemplate::new(409).set_body_string("{\"code\":\"SLOT_TAKEN\"}"))
            .mount(&mock_server)
            .await;

        let client = HospitalApiClient::new(&TestConfig::with_backend(&mock_server.uri()).to_app_config());
        let result: Result<Value, _> = client
            .request(Method::POST, "/appointments/reservations", &[], None, Some(&json!({})))
            .await;

        assert_matches!(
            result,
            Err(HospitalApiError::Status { status, body })
                if status == StatusCode::CONFLICT && body.contains("SLOT_TAKEN")
        );
    }

    #[tokio::test]
    async fn test_request_reports_decode_failures() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments/slots"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = HospitalApiClient::new(&TestConfig::with_backend(&mock_server.uri()).to_app_config());
        let result: Result<Vec<Value>, _> = client
            .request::<_, ()>(Method::GET, "/appointments/slots", &[], None, None)
            .await;

        assert_matches!(result, Err(HospitalApiError::Decode(_)));
    }
}
