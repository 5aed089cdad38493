//! Remote gateway for the todo service's REST API.
//!
//! [`HttpGateway`] owns no state beyond the HTTP client and the base
//! address. Every call takes the bearer token explicitly so the session
//! store stays the single owner of credentials.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{TodoError, TodoResult};
use crate::todo::{NewTodo, OwnerId, Todo, TodoId, TodoPatch};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: OwnerId,
    pub email: String,
}

/// What the auth endpoints hand back. `access_token` is absent when the
/// register endpoint answers with a bare user record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthGrant {
    pub access_token: Option<String>,
    pub user: Option<UserRecord>,
}

impl AuthGrant {
    fn from_body(body: serde_json::Value) -> TodoResult<Self> {
        if let Some(token) = body.get("access_token") {
            let access_token = token
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| TodoError::Decode("access_token is not a string".to_string()))?;
            let user = match body.get("user") {
                Some(raw) if !raw.is_null() => Some(
                    serde_json::from_value(raw.clone())
                        .map_err(|err| TodoError::Decode(format!("user: {err}")))?,
                ),
                _ => None,
            };
            return Ok(Self {
                access_token: Some(access_token),
                user,
            });
        }

        Ok(Self {
            access_token: None,
            user: serde_json::from_value(body).ok(),
        })
    }
}

#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn register(&self, credentials: &Credentials) -> TodoResult<AuthGrant>;
    async fn login(&self, credentials: &Credentials) -> TodoResult<AuthGrant>;
    async fn logout(&self, token: Option<&str>) -> TodoResult<()>;
}

#[async_trait]
pub trait TodoApi: Send + Sync {
    async fn list_todos(&self, token: Option<&str>) -> TodoResult<Vec<Todo>>;
    async fn get_todo(&self, token: Option<&str>, id: &TodoId) -> TodoResult<Todo>;
    async fn create_todo(&self, token: Option<&str>, draft: &NewTodo) -> TodoResult<Todo>;
    async fn update_todo(
        &self,
        token: Option<&str>,
        id: &TodoId,
        patch: &TodoPatch,
    ) -> TodoResult<Todo>;
    async fn delete_todo(&self, token: Option<&str>, id: &TodoId) -> TodoResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> TodoResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TodoError::ValidationFailed(
                "API base URL cannot be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("todo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| TodoError::Transport(format!("failed building HTTP client: {err}")))?;

        info!(base_url = %base_url, "gateway ready");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> TodoResult<String> {
        let body: HealthBody = send_json(self.request(Method::GET, "/health", None)).await?;
        Ok(body.status)
    }

    async fn post_credentials(&self, path: &str, credentials: &Credentials) -> TodoResult<AuthGrant> {
        let body: serde_json::Value =
            send_json(self.request(Method::POST, path, None).json(credentials)).await?;
        AuthGrant::from_body(body)
    }
}

#[async_trait]
impl CredentialService for HttpGateway {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn register(&self, credentials: &Credentials) -> TodoResult<AuthGrant> {
        self.post_credentials("/api/auth/register", credentials).await
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> TodoResult<AuthGrant> {
        self.post_credentials("/api/auth/login", credentials).await
    }

    #[instrument(skip(self, token))]
    async fn logout(&self, token: Option<&str>) -> TodoResult<()> {
        send_empty(self.request(Method::POST, "/api/auth/logout", token)).await
    }
}

#[async_trait]
impl TodoApi for HttpGateway {
    #[instrument(skip(self, token))]
    async fn list_todos(&self, token: Option<&str>) -> TodoResult<Vec<Todo>> {
        let todos: Vec<Todo> = send_json(self.request(Method::GET, "/api/todos", token)).await?;
        debug!(count = todos.len(), "listed todos");
        Ok(todos)
    }

    #[instrument(skip(self, token), fields(id = %id))]
    async fn get_todo(&self, token: Option<&str>, id: &TodoId) -> TodoResult<Todo> {
        send_json(self.request(Method::GET, &todo_path(id), token)).await
    }

    #[instrument(skip(self, token, draft))]
    async fn create_todo(&self, token: Option<&str>, draft: &NewTodo) -> TodoResult<Todo> {
        draft.validate()?;
        let body = draft.normalized();
        send_json(self.request(Method::POST, "/api/todos", token).json(&body)).await
    }

    #[instrument(skip(self, token, patch), fields(id = %id))]
    async fn update_todo(
        &self,
        token: Option<&str>,
        id: &TodoId,
        patch: &TodoPatch,
    ) -> TodoResult<Todo> {
        patch.validate()?;
        send_json(self.request(Method::PUT, &todo_path(id), token).json(patch)).await
    }

    #[instrument(skip(self, token), fields(id = %id))]
    async fn delete_todo(&self, token: Option<&str>, id: &TodoId) -> TodoResult<()> {
        send_empty(self.request(Method::DELETE, &todo_path(id), token)).await
    }
}

fn todo_path(id: &TodoId) -> String {
    format!("/api/todos/{id}")
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> TodoResult<T> {
    let response = checked(request.send().await?).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| TodoError::Decode(err.to_string()))
}

async fn send_empty(request: RequestBuilder) -> TodoResult<()> {
    checked(request.send().await?).await.map(|_| ())
}

async fn checked(response: Response) -> TodoResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "failed reading error body");
            String::new()
        }
    };
    let message = extract_error_message(&body).unwrap_or_else(|| status_text(status));
    warn!(status = status.as_u16(), message = %message, "request failed");
    Err(TodoError::RequestFailed {
        status: status.as_u16(),
        message,
    })
}

/// Human-readable text from an error body: `detail` first, then `message`.
/// A `detail` list (request validation errors) is joined by `; `.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for field in ["detail", "message"] {
        match value.get(field) {
            Some(serde_json::Value::String(text)) if !text.trim().is_empty() => {
                return Some(text.clone());
            }
            Some(serde_json::Value::Array(items)) if !items.is_empty() => {
                let joined = items
                    .iter()
                    .filter_map(|item| {
                        item.get("msg")
                            .and_then(|msg| msg.as_str())
                            .or_else(|| item.as_str())
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            _ => {}
        }
    }
    None
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AuthGrant, HttpGateway, extract_error_message};
    use crate::todo::OpaqueId;

    #[test]
    fn error_message_prefers_detail_then_message() {
        assert_eq!(
            extract_error_message(r#"{"detail":"Todo not found"}"#).as_deref(),
            Some("Todo not found")
        );
        assert_eq!(
            extract_error_message(r#"{"message":"Nope"}"#).as_deref(),
            Some("Nope")
        );
        assert_eq!(
            extract_error_message(r#"{"detail":[{"msg":"field required"},{"msg":"too short"}]}"#)
                .as_deref(),
            Some("field required; too short")
        );
        assert_eq!(extract_error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn auth_grant_reads_token_and_user() {
        let grant = AuthGrant::from_body(json!({
            "access_token": "a.b.c",
            "token_type": "bearer",
            "user": { "id": 3, "email": "ada@example.com" }
        }))
        .expect("grant");
        assert_eq!(grant.access_token.as_deref(), Some("a.b.c"));
        assert_eq!(grant.user.expect("user").id, OpaqueId::new("3"));
    }

    #[test]
    fn auth_grant_accepts_bare_user_record() {
        let grant = AuthGrant::from_body(json!({
            "id": "0b0e",
            "email": "ada@example.com",
            "created_at": "2024-01-01T00:00:00"
        }))
        .expect("grant");
        assert_eq!(grant.access_token, None);
        assert_eq!(grant.user.expect("user").email, "ada@example.com");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let gateway = HttpGateway::new("http://localhost:8000/").expect("gateway");
        assert_eq!(gateway.base_url(), "http://localhost:8000");
        assert!(HttpGateway::new("  ").is_err());
    }
}
