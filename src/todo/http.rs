//! REST to-do backend.
//!
//! `POST {base}/lists/{id}/todos` appends an item, `POST {base}/lists` creates
//! a list. Both answer with a `success` flag and an optional `error`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::lists::ListResolver;
use super::{TodoGateway, TodoList};
use crate::config::TodoConfig;
use crate::constants::HTTP_TIMEOUT_SECS;
use crate::error::GatewayError;
use crate::store::ListDirectory;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddTodoRequest<'a> {
    text: &'a str,
    creator_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTodoResponse {
    success: bool,
    #[serde(default)]
    todo_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateListRequest<'a> {
    name: &'a str,
    creator_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateListResponse {
    success: bool,
    #[serde(default)]
    list_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpTodoGateway {
    client: Client,
    base_url: Url,
    token: Option<String>,
    creator_name: String,
    /// Set when lists are created on demand; otherwise names are ids
    lists: Option<ListResolver>,
}

impl HttpTodoGateway {
    pub fn new(
        config: &TodoConfig,
        token: Option<String>,
        directory: Arc<dyn ListDirectory>,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid to-do backend URL '{}'", config.base_url))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
            creator_name: config.creator_name.clone(),
            lists: config
                .create_missing_lists
                .then(|| ListResolver::new(directory)),
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("To-do backend URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map a list name to the id the backend expects.
    async fn resolve_list_id(&self, list_name: &str) -> Result<String> {
        match &self.lists {
            Some(lists) => lists.resolve(list_name, || self.create_list(list_name)).await,
            None => Ok(list_name.to_string()),
        }
    }
}

/// Turn a non-2xx status into a classified error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(GatewayError::NotAuthenticated(body).into());
    }
    Err(GatewayError::Rejected {
        status: status.as_u16(),
        body,
    }
    .into())
}

fn rejected(error: Option<String>) -> anyhow::Error {
    GatewayError::Rejected {
        status: 200,
        body: error.unwrap_or_else(|| "Unknown API error".to_string()),
    }
    .into()
}

#[async_trait]
impl TodoGateway for HttpTodoGateway {
    async fn add_todo(&self, list_name: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(GatewayError::Invalid("to-do text is empty".into()).into());
        }

        let list_id = self.resolve_list_id(list_name).await?;
        let url = self.endpoint(&["lists", &list_id, "todos"])?;
        let request = AddTodoRequest {
            text,
            creator_name: &self.creator_name,
        };

        let response = self
            .post(url)
            .json(&request)
            .send()
            .await
            .context("Failed to send to-do")?;
        let reply: AddTodoResponse = check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse to-do response")?;

        if !reply.success {
            return Err(rejected(reply.error));
        }

        tracing::debug!(
            "Added to-do {} to list '{}'",
            reply.todo_id.as_deref().unwrap_or("?"),
            list_name
        );
        Ok(())
    }

    async fn create_list(&self, name: &str) -> Result<TodoList> {
        if name.trim().is_empty() {
            return Err(GatewayError::Invalid("list name is empty".into()).into());
        }

        let request = CreateListRequest {
            name,
            creator_name: &self.creator_name,
        };
        let response = self
            .post(self.endpoint(&["lists"])?)
            .json(&request)
            .send()
            .await
            .context("Failed to create list")?;
        let reply: CreateListResponse = check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse create-list response")?;

        match (reply.success, reply.list_id) {
            (true, Some(id)) => Ok(TodoList { id, url: reply.url }),
            _ => Err(rejected(reply.error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    async fn gateway(base_url: &str, create_missing_lists: bool) -> HttpTodoGateway {
        let config = TodoConfig {
            base_url: base_url.to_string(),
            create_missing_lists,
            ..TodoConfig::default()
        };
        let store = SqliteStore::open_in_memory().await.unwrap();
        HttpTodoGateway::new(&config, None, Arc::new(store)).unwrap()
    }

    #[tokio::test]
    async fn test_endpoint_encodes_list_id() {
        let gw = gateway("https://todo.example.com/api/", false).await;
        let url = gw.endpoint(&["lists", "inbox test", "todos"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://todo.example.com/api/lists/inbox%20test/todos"
        );
    }

    #[tokio::test]
    async fn test_list_name_is_id_without_creation() {
        let gw = gateway("https://todo.example.com", false).await;
        assert!(gw.lists.is_none());
        assert_eq!(gw.resolve_list_id("inbox-test").await.unwrap(), "inbox-test");
        assert!(gateway("https://todo.example.com", true).await.lists.is_some());
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected_before_sending() {
        let gw = gateway("https://todo.example.com", false).await;
        let err = gw.add_todo("inbox-test", "  ").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::Invalid(_))
        ));
    }

    #[test]
    fn test_wire_format() {
        let body = serde_json::to_value(AddTodoRequest {
            text: "Pay rent",
            creator_name: "MailFlow",
        })
        .unwrap();
        assert_eq!(body["creatorName"], "MailFlow");

        let reply: AddTodoResponse =
            serde_json::from_str(r#"{"success":false,"error":"list not found"}"#).unwrap();
        assert!(!reply.success);
        let err = rejected(reply.error);
        assert!(err.to_string().contains("list not found"));

        let created: CreateListResponse = serde_json::from_str(
            r#"{"success":true,"listId":"L1","url":"https://todo.example.com/L1"}"#,
        )
        .unwrap();
        assert_eq!(created.list_id.as_deref(), Some("L1"));
    }
}
