//! HTTP client wrapper. Attaches the current credential, classifies
//! responses, and runs the forced-logout side effect on auth failures.

pub mod auth;
pub mod dashboard;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::session::{Credential, SessionManager};

pub use auth::{ImpersonationGrant, LoginGrant};
pub use dashboard::DashboardApi;

/// `{ success, data, message?, error? }` wrapper used by the dashboard routes.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionManager,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: SessionManager) -> Result<Self, ClientError> {
        let mut base_url =
            Url::parse(&config.base_url).map_err(|e| ClientError::BaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::BaseUrl(config.base_url.clone()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL plus path segments, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET an enveloped route and return its `data`.
    pub(crate) async fn get_data<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = self.endpoint(segments);
        let path = url.path().to_string();
        let request = self.http.get(url).query(query);
        let credential = self.session.current_credential();
        let (status, body) = self.execute(request, &path, credential).await?;
        unwrap_envelope(status, body, &path)
    }

    /// POST JSON to a route whose response is not enveloped.
    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let credential = self.session.current_credential();
        self.post(segments, body, credential).await
    }

    /// POST JSON without a credential. Failures here never end the session.
    pub(crate) async fn post_public<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        self.post(segments, body, None).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
        credential: Option<Credential>,
    ) -> Result<T, ClientError> {
        let url = self.endpoint(segments);
        let path = url.path().to_string();
        let request = self.http.post(url).json(body);
        let (_, value) = self.execute(request, &path, credential).await?;
        serde_json::from_value(value).map_err(|source| ClientError::Decode { path, source })
    }

    /// Send with `credential` attached and classify the outcome. Returns the
    /// parsed JSON body of a 2xx response.
    async fn execute(
        &self,
        request: RequestBuilder,
        path: &str,
        credential: Option<Credential>,
    ) -> Result<(StatusCode, Value), ClientError> {
        let request = match &credential {
            Some(credential) => request.header(AUTHORIZATION, credential.bearer()),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v: &HeaderValue| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response.text().await?;
        debug!("{} -> {}", path, status);

        if status == StatusCode::UNAUTHORIZED {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| error_message(&v))
                .unwrap_or_else(|| "Session expired".to_string());
            self.reject_credential(
                credential.as_ref(),
                &format!("{} returned 401: {}", path, message),
            );
            return Err(ClientError::Unauthorized(message));
        }

        let value = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) => {
                let content_type = if content_type.is_empty() {
                    "an empty content type".to_string()
                } else {
                    content_type
                };
                self.reject_credential(
                    credential.as_ref(),
                    &format!(
                        "{} returned a non-JSON body ({}) with status {}",
                        path, content_type, status
                    ),
                );
                return Err(ClientError::MalformedResponse {
                    path: path.to_string(),
                    content_type,
                });
            }
        };

        if !status.is_success() {
            let message = error_message(&value)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok((status, value))
    }

    /// Forced logout for the credential a failed request carried. Requests
    /// sent without one have no session to end.
    fn reject_credential(&self, credential: Option<&Credential>, reason: &str) {
        match credential {
            Some(credential) => {
                self.session.force_logout_for(credential, reason);
            }
            None => debug!("No credential attached, skipping logout: {}", reason),
        }
    }
}

fn unwrap_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: Value,
    path: &str,
) -> Result<T, ClientError> {
    let envelope: Envelope<T> = serde_json::from_value(body).map_err(|source| ClientError::Decode {
        path: path.to_string(),
        source,
    })?;

    if envelope.success == Some(false) {
        let message = envelope
            .message
            .or_else(|| envelope.error.as_ref().and_then(value_as_message))
            .unwrap_or_else(|| "Request was not successful".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    envelope.data.ok_or_else(|| ClientError::Api {
        status: status.as_u16(),
        message: format!("Response from {} has no data", path),
    })
}

/// `message`, then `error` (string or `{ message }`), from an error body.
fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(value_as_message)
        .or_else(|| body.get("error").and_then(value_as_message))
}

fn value_as_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("message").and_then(value_as_message),
        _ => None,
    }
}
