//! The `DirectoryApi` trait: every remote operation the importer performs

use async_trait::async_trait;

use super::error::ApiError;
use super::models::{
    EventRecord, GroupJoin, GroupRecord, NewChild, NewEvent, NewGroup, NewUser, UserRecord,
};

/// Remote directory service operations
///
/// All methods are fallible with `ApiError`; the import pipelines decide
/// which failures skip a row and which defer it. `user_get_email` returns
/// `Ok(None)` for an unknown address and `ApiError::DuplicateIdentity` when
/// the address maps to more than one account.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Look up a user account by email address
    async fn user_get_email(&self, email: &str) -> Result<Option<UserRecord>, ApiError>;

    /// Create a standalone user account
    async fn user_create(&self, user: &NewUser) -> Result<UserRecord, ApiError>;

    /// Create a child account under a parent, or link an existing child
    async fn user_create_child(
        &self,
        parent_uuid: &str,
        child: &NewChild,
    ) -> Result<UserRecord, ApiError>;

    /// Fetch a user account by identifier
    async fn user_get(&self, uuid: &str) -> Result<UserRecord, ApiError>;

    /// List the child accounts of a user
    async fn user_children_list(&self, uuid: &str) -> Result<Vec<UserRecord>, ApiError>;

    /// Create a group
    async fn group_create(&self, group: &NewGroup) -> Result<GroupRecord, ApiError>;

    /// Fetch a group by identifier
    async fn group_get(&self, uuid: &str) -> Result<GroupRecord, ApiError>;

    /// Partially update a group
    async fn group_update(&self, uuid: &str, fields: &serde_json::Value) -> Result<(), ApiError>;

    /// Delete a group
    async fn group_delete(&self, uuid: &str) -> Result<(), ApiError>;

    /// Copy settings from `source_uuid` onto `target_uuid`
    async fn group_clone(&self, target_uuid: &str, source_uuid: &str) -> Result<(), ApiError>;

    /// Search groups by display name
    async fn group_search(&self, title: &str) -> Result<Vec<GroupRecord>, ApiError>;

    /// Join a user to a group, optionally with a role, payment and webforms
    async fn user_join_group(&self, join: &GroupJoin) -> Result<serde_json::Value, ApiError>;

    /// Create an event spanning one or more groups
    async fn event_create(&self, event: &NewEvent) -> Result<EventRecord, ApiError>;
}
