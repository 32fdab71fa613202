//! Membership row pipeline: joining users to groups
//!
//! A row names a user (by UUID or email) and a group (by UUID or by the
//! name it was imported under) plus optional roles, a payment choice and
//! webform ids. Each listed role becomes one join call.

use async_trait::async_trait;
use log::info;

use crate::api::{GroupJoin, PaymentMethod};
use crate::import::context::ImportContext;
use crate::import::outcome::RowOutcome;
use crate::import::row::Row;

use super::RowPipeline;

/// Joins one user to one group per row, once per listed role
pub struct MembershipPipeline;

impl MembershipPipeline {
    /// Resolve the row's user to a UUID, preferring an explicit id
    async fn resolve_user(&self, ctx: &ImportContext, row: &Row) -> Result<String, RowOutcome> {
        if let Some(uuid) = row.get("uuid") {
            return Ok(uuid.to_string());
        }
        let Some(email) = row.get("email_address") else {
            return Err(RowOutcome::invalid(
                "membership row needs a user UUID or an email address",
            ));
        };
        let lookup = {
            let api = ctx.api.clone();
            let email = email.to_string();
            move || async move {
                Ok(api
                    .user_get_email(&email)
                    .await?
                    .map(|record| record.uuid))
            }
        };
        match ctx.identities.resolve(email, lookup).await {
            Ok(Some(uuid)) => Ok(uuid),
            Ok(None) => Err(RowOutcome::invalid(format!(
                "no user found for email {}",
                email
            ))),
            Err(err) => Err(RowOutcome::remote_failure(err)),
        }
    }

    /// Resolve the row's group to a UUID via the registry when the sheet
    /// refers to it by name
    async fn resolve_group(&self, ctx: &ImportContext, row: &Row) -> Result<String, RowOutcome> {
        if let Some(uuid) = row.get("group_uuid") {
            return Ok(uuid.to_string());
        }
        let Some(name) = row.get("group_name") else {
            return Err(RowOutcome::invalid(
                "membership row needs a group UUID or a group name",
            ));
        };
        match ctx.groups.id_for_name(name).await {
            Some(uuid) => Ok(uuid),
            // The group sheet may not have reached this name yet.
            None => Err(RowOutcome::Deferred {
                dependency: name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl RowPipeline for MembershipPipeline {
    fn label(&self) -> &'static str {
        "Membership"
    }

    async fn run(&self, ctx: &ImportContext, row: &Row) -> RowOutcome {
        let rc = row.context();

        let user_uuid = match self.resolve_user(ctx, row).await {
            Ok(uuid) => uuid,
            Err(outcome) => return outcome,
        };
        let group_uuid = match self.resolve_group(ctx, row).await {
            Ok(uuid) => uuid,
            Err(outcome) => return outcome,
        };

        let payment = row.get("group_fee").and_then(PaymentMethod::from_fee);
        let webform_ids: Vec<String> = row
            .get("group_webform_id")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // No role column still means one plain membership.
        let roles: Vec<Option<String>> = match row.get("group_role") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(|role| Some(role.to_string()))
                .collect(),
            None => vec![None],
        };
        if roles.is_empty() {
            return RowOutcome::invalid("role column present but names no roles");
        }

        for role in roles {
            // Payment and webforms only apply to role-based joins.
            let join = match &role {
                Some(r) => GroupJoin {
                    group_uuid: group_uuid.clone(),
                    user_uuid: user_uuid.clone(),
                    role: Some(r.clone()),
                    payment,
                    webform_ids: webform_ids.clone(),
                },
                None => GroupJoin::plain(group_uuid.clone(), user_uuid.clone()),
            };
            info!(
                "{}: adding user {} to group {}{}",
                rc,
                user_uuid,
                group_uuid,
                role.as_deref()
                    .map(|r| format!(" as {}", r))
                    .unwrap_or_default()
            );
            if let Err(err) = ctx.api.user_join_group(&join).await {
                return RowOutcome::remote_failure(format!(
                    "failed to add user {} to group {}: {}",
                    user_uuid, group_uuid, err
                ));
            }
            ctx.stats.increment("Group Memberships");
        }

        RowOutcome::Success { uuid: group_uuid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockDirectory;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn row(pairs: &[(&str, &str)]) -> Row {
        Row::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            6,
        )
    }

    #[tokio::test]
    async fn test_join_by_uuid_pair() {
        let api = Arc::new(MockDirectory::new());
        api.add_user("user-1", "a@x.com", "Ada", "Byron");
        api.add_group("group-1", "Eagles");
        let ctx = ImportContext::for_test(api.clone());

        let outcome = MembershipPipeline
            .run(
                &ctx,
                &row(&[("uuid", "user-1"), ("group_uuid", "group-1")]),
            )
            .await;

        assert!(outcome.is_success());
        let joins = api.joins();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].user_uuid, "user-1");
        assert_eq!(joins[0].group_uuid, "group-1");
        assert_eq!(joins[0].role, None);
        assert_eq!(ctx.stats.count("Group Memberships"), 1);
    }

    #[tokio::test]
    async fn test_role_less_join_carries_no_options() {
        let api = Arc::new(MockDirectory::new());
        api.add_user("user-1", "a@x.com", "Ada", "Byron");
        api.add_group("group-1", "Eagles");
        let ctx = ImportContext::for_test(api.clone());

        let outcome = MembershipPipeline
            .run(
                &ctx,
                &row(&[
                    ("uuid", "user-1"),
                    ("group_uuid", "group-1"),
                    ("group_fee", "plan"),
                    ("group_webform_id", "wf-1"),
                ]),
            )
            .await;

        assert!(outcome.is_success());
        let joins = api.joins();
        assert_eq!(joins[0].role, None);
        assert_eq!(joins[0].payment, None);
        assert!(joins[0].webform_ids.is_empty());
    }

    #[tokio::test]
    async fn test_user_resolved_by_email() {
        let api = Arc::new(MockDirectory::new());
        api.add_user("user-7", "ada@x.com", "Ada", "Byron");
        api.add_group("group-1", "Eagles");
        let ctx = ImportContext::for_test(api.clone());

        let outcome = MembershipPipeline
            .run(
                &ctx,
                &row(&[("email_address", "ada@x.com"), ("group_uuid", "group-1")]),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(api.joins()[0].user_uuid, "user-7");
        // The resolution is cached for later rows.
        assert_eq!(
            ctx.identities.get("ada@x.com").await,
            Some("user-7".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_email_is_invalid() {
        let api = Arc::new(MockDirectory::new());
        api.add_group("group-1", "Eagles");
        let ctx = ImportContext::for_test(api.clone());

        let outcome = MembershipPipeline
            .run(
                &ctx,
                &row(&[("email_address", "nobody@x.com"), ("group_uuid", "group-1")]),
            )
            .await;

        assert!(matches!(outcome, RowOutcome::Invalid { .. }));
        assert_eq!(api.join_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_group_name_resolved_through_registry() {
        let api = Arc::new(MockDirectory::new());
        api.add_user("user-1", "a@x.com", "Ada", "Byron");
        let ctx = ImportContext::for_test(api.clone());
        ctx.groups.record(2, "Eagles", "group-9").await.unwrap();

        let outcome = MembershipPipeline
            .run(
                &ctx,
                &row(&[("uuid", "user-1"), ("group_name", "Eagles")]),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(api.joins()[0].group_uuid, "group-9");
    }

    #[tokio::test]
    async fn test_unregistered_group_name_defers() {
        let api = Arc::new(MockDirectory::new());
        api.add_user("user-1", "a@x.com", "Ada", "Byron");
        let ctx = ImportContext::for_test(api.clone());

        let outcome = MembershipPipeline
            .run(
                &ctx,
                &row(&[("uuid", "user-1"), ("group_name", "Eagles")]),
            )
            .await;

        assert_eq!(
            outcome,
            RowOutcome::Deferred {
                dependency: "Eagles".to_string()
            }
        );
        assert_eq!(api.join_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_join_per_role_with_payment_and_webforms() {
        let api = Arc::new(MockDirectory::new());
        api.add_user("user-1", "a@x.com", "Ada", "Byron");
        api.add_group("group-1", "Eagles");
        let ctx = ImportContext::for_test(api.clone());

        let outcome = MembershipPipeline
            .run(
                &ctx,
                &row(&[
                    ("uuid", "user-1"),
                    ("group_uuid", "group-1"),
                    ("group_role", "Coach, Player"),
                    ("group_fee", "plan"),
                    ("group_webform_id", "wf-1, wf-2"),
                ]),
            )
            .await;

        assert!(outcome.is_success());
        let joins = api.joins();
        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].role.as_deref(), Some("Coach"));
        assert_eq!(joins[1].role.as_deref(), Some("Player"));
        assert_eq!(joins[0].payment, Some(PaymentMethod::Plan));
        assert_eq!(joins[0].webform_ids, vec!["wf-1", "wf-2"]);
        assert_eq!(ctx.stats.count("Group Memberships"), 2);
    }
}
