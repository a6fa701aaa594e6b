//! Object-store API client
//!
//! Provides a typed HTTP client for the remote object-store service.
//! Handles authentication headers, JSON deserialization, and endpoint
//! construction.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use treesync_remote::ObjectStoreClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ObjectStoreClient::new("https://objects.example.com/v1", "access-token");
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use treesync_core::domain::RemoteId;
use treesync_core::ports::{IObjectStore, RemoteObject};

use crate::RemoteError;

// ============================================================================
// Wire types
// ============================================================================

/// One object as returned by the service
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResponse {
    id: String,
    name: String,
    #[serde(default)]
    is_folder: bool,
}

/// Response from the listing endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    objects: Vec<ObjectResponse>,
}

/// Folder creation request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFolderRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    /// Local path the folder mirrors; kept for traceability
    description: &'a str,
}

// ============================================================================
// ObjectStoreClient
// ============================================================================

/// HTTP client for the remote object-store API
///
/// Wraps `reqwest::Client` with bearer authentication and base URL
/// construction.
pub struct ObjectStoreClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Credential value sent as the bearer token
    access_token: String,
}

impl ObjectStoreClient {
    /// Creates a new client with the given base URL and access token
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: Client::new(),
            base_url,
            access_token: access_token.into(),
        }
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Automatically prepends the base URL and adds the Authorization header.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Maps a non-success response into a [`RemoteError::ServiceError`]
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::ServiceError {
            status: status.as_u16(),
            message,
        }
        .into())
    }

    fn object_from_response(obj: ObjectResponse) -> Result<RemoteObject> {
        Ok(RemoteObject {
            id: RemoteId::new(obj.id)
                .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?,
            name: obj.name,
            is_folder: obj.is_folder,
        })
    }
}

#[async_trait::async_trait]
impl IObjectStore for ObjectStoreClient {
    async fn list(
        &self,
        name: Option<&str>,
        parent: &RemoteId,
        exclude_trashed: bool,
    ) -> Result<Vec<RemoteObject>> {
        debug!(parent = %parent, name = ?name, "Listing remote objects");

        let mut request = self
            .request(Method::GET, "/objects")
            .query(&[("parentId", parent.as_str())])
            .query(&[("excludeTrashed", exclude_trashed)]);
        if let Some(name) = name {
            request = request.query(&[("name", name)]);
        }

        let response = request
            .send()
            .await
            .context("Failed to send list request")?;
        let body: ListResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse list response")?;

        body.objects
            .into_iter()
            .map(Self::object_from_response)
            .collect()
    }

    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&RemoteId>,
        local_path: &str,
    ) -> Result<RemoteObject> {
        debug!(name, parent = ?parent.map(RemoteId::as_str), "Creating remote folder");

        let body = CreateFolderRequest {
            name,
            parent_id: parent.map(RemoteId::as_str),
            description: local_path,
        };

        let response = self
            .request(Method::POST, "/folders")
            .json(&body)
            .send()
            .await
            .context("Failed to send folder create request")?;
        let obj: ObjectResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse folder create response")?;

        Self::object_from_response(obj)
    }

    async fn upload_file(
        &self,
        name: &str,
        parent: &RemoteId,
        data: Vec<u8>,
    ) -> Result<RemoteObject> {
        debug!(name, parent = %parent, bytes = data.len(), "Uploading file content");

        let response = self
            .request(Method::POST, "/files")
            .query(&[("parentId", parent.as_str()), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .context("Failed to send upload request")?;
        let obj: ObjectResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse upload response")?;

        Self::object_from_response(obj)
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        debug!(id = %id, "Deleting remote object");

        let response = self
            .request(Method::DELETE, &format!("/objects/{}", id.as_str()))
            .send()
            .await
            .context("Failed to send delete request")?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ObjectStoreClient::new("https://api.example.com/v1/", "tok");
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }
}
