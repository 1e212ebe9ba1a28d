//! Destination for extracted to-dos.

mod http;
mod lists;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::GatewayError;

pub use http::HttpTodoGateway;

/// A list created on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoList {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait TodoGateway: Send + Sync {
    /// Append one item to the named list.
    async fn add_todo(&self, list_name: &str, text: &str) -> Result<()>;

    /// Create a list. Only backends with explicit list creation support this.
    async fn create_list(&self, name: &str) -> Result<TodoList> {
        Err(GatewayError::Invalid(format!("backend cannot create list '{}'", name)).into())
    }
}
