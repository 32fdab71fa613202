//! REST client for the roster directory service
//!
//! Thin JSON-over-HTTP implementation of `DirectoryApi`. Endpoints follow
//! the service's resource layout (`/users`, `/groups`, `/events`); the
//! import core never sees URLs or status codes, only `ApiError`.

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::client::DirectoryApi;
use super::error::ApiError;
use super::models::{
    EventRecord, GroupJoin, GroupRecord, NewChild, NewEvent, NewGroup, NewUser, UserRecord,
};

const USER_AGENT: &str = concat!("roster-import/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed directory service client
#[derive(Debug, Clone)]
pub struct RestDirectoryClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    /// Suppress welcome/notification emails for imported accounts
    notification_bypass: bool,
}

impl RestDirectoryClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            notification_bypass: false,
        }
    }

    /// Toggle the notification-bypass header for subsequent requests
    pub fn with_notification_bypass(mut self, bypass: bool) -> Self {
        self.notification_bypass = bypass;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if self.notification_bypass {
            req = req.header("X-Notification-Bypass", "1");
        }
        req
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = req.send().await.map_err(ApiError::remote)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                what: response.url().path().to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Remote {
                message: format!("{}: {}", status, body),
            });
        }
        response.json::<T>().await.map_err(ApiError::remote)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<(), ApiError> {
        let response = req.send().await.map_err(ApiError::remote)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                what: response.url().path().to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Remote {
                message: format!("{}: {}", status, body),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryApi for RestDirectoryClient {
    async fn user_get_email(&self, email: &str) -> Result<Option<UserRecord>, ApiError> {
        let path = format!("/users?email={}", urlencoding::encode(email));
        debug!("GET {}", path);
        let mut matches: Vec<UserRecord> =
            self.send_json(self.request(reqwest::Method::GET, &path)).await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.remove(0))),
            _ => Err(ApiError::DuplicateIdentity {
                email: email.to_string(),
            }),
        }
    }

    async fn user_create(&self, user: &NewUser) -> Result<UserRecord, ApiError> {
        debug!("POST /users ({})", user.email);
        self.send_json(self.request(reqwest::Method::POST, "/users").json(user))
            .await
    }

    async fn user_create_child(
        &self,
        parent_uuid: &str,
        child: &NewChild,
    ) -> Result<UserRecord, ApiError> {
        let path = format!("/users/{}/children", parent_uuid);
        debug!("POST {}", path);
        self.send_json(self.request(reqwest::Method::POST, &path).json(child))
            .await
    }

    async fn user_get(&self, uuid: &str) -> Result<UserRecord, ApiError> {
        self.send_json(self.request(reqwest::Method::GET, &format!("/users/{}", uuid)))
            .await
    }

    async fn user_children_list(&self, uuid: &str) -> Result<Vec<UserRecord>, ApiError> {
        self.send_json(self.request(
            reqwest::Method::GET,
            &format!("/users/{}/children", uuid),
        ))
        .await
    }

    async fn group_create(&self, group: &NewGroup) -> Result<GroupRecord, ApiError> {
        debug!("POST /groups ({})", group.title);
        self.send_json(self.request(reqwest::Method::POST, "/groups").json(group))
            .await
    }

    async fn group_get(&self, uuid: &str) -> Result<GroupRecord, ApiError> {
        self.send_json(self.request(reqwest::Method::GET, &format!("/groups/{}", uuid)))
            .await
    }

    async fn group_update(&self, uuid: &str, fields: &serde_json::Value) -> Result<(), ApiError> {
        self.send_empty(
            self.request(reqwest::Method::PATCH, &format!("/groups/{}", uuid))
                .json(fields),
        )
        .await
    }

    async fn group_delete(&self, uuid: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(reqwest::Method::DELETE, &format!("/groups/{}", uuid)))
            .await
    }

    async fn group_clone(&self, target_uuid: &str, source_uuid: &str) -> Result<(), ApiError> {
        let path = format!("/groups/{}/clone", target_uuid);
        self.send_empty(
            self.request(reqwest::Method::POST, &path)
                .json(&serde_json::json!({ "source_uuid": source_uuid })),
        )
        .await
    }

    async fn group_search(&self, title: &str) -> Result<Vec<GroupRecord>, ApiError> {
        let path = format!("/groups?title={}", urlencoding::encode(title));
        debug!("GET {}", path);
        self.send_json(self.request(reqwest::Method::GET, &path)).await
    }

    async fn user_join_group(&self, join: &GroupJoin) -> Result<serde_json::Value, ApiError> {
        let path = format!("/groups/{}/members", join.group_uuid);
        debug!("POST {} (user {})", path, join.user_uuid);
        self.send_json(self.request(reqwest::Method::POST, &path).json(join))
            .await
    }

    async fn event_create(&self, event: &NewEvent) -> Result<EventRecord, ApiError> {
        debug!("POST /events ({})", event.title);
        self.send_json(self.request(reqwest::Method::POST, "/events").json(event))
            .await
    }
}
