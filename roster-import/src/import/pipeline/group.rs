//! Group row pipeline: creation, hierarchy resolution, deferral
//!
//! The registry (seeded from the persisted group map) resolves "group
//! above" references; an unresolved reference triggers one remote search
//! and, failing that, defers the row to the sequential retry pass. Group
//! names double as identity keys so racing workers never create the same
//! group twice.

use async_trait::async_trait;
use log::{error, info};

use crate::api::{ApiError, NewGroup};
use crate::import::context::ImportContext;
use crate::import::identity::CreateSlot;
use crate::import::outcome::RowOutcome;
use crate::import::row::Row;

use super::RowPipeline;

/// Imports one group per row
pub struct GroupPipeline;

impl GroupPipeline {
    /// Deactivate and delete a previously imported group
    async fn delete_group(&self, ctx: &ImportContext, row: &Row, uuid: &str) -> RowOutcome {
        // Deactivating first turns registration settings off.
        let result = async {
            ctx.api
                .group_update(uuid, &serde_json::json!({ "active": 0 }))
                .await?;
            ctx.api.group_delete(uuid).await
        }
        .await;

        match result {
            Ok(()) => {
                info!("{}: deleting group {}", row.context(), uuid);
                RowOutcome::Success {
                    uuid: uuid.to_string(),
                }
            }
            Err(err) => RowOutcome::remote_failure(format!(
                "there was a problem deleting group {}: {}",
                uuid, err
            )),
        }
    }

    /// Copy settings from the clone source onto an already-imported group
    ///
    /// Falls back to `None` (caller proceeds with creation) when either
    /// side can't be fetched.
    async fn try_clone(
        &self,
        ctx: &ImportContext,
        row: &Row,
        uuid: &str,
        source: &str,
    ) -> Option<RowOutcome> {
        if ctx.api.group_get(uuid).await.is_err() || ctx.api.group_get(source).await.is_err() {
            info!(
                "{}: clone source can't be found, moving on to creating the group",
                row.context()
            );
            return None;
        }
        info!("{}: cloning settings from group {}", row.context(), source);
        Some(match ctx.api.group_clone(uuid, source).await {
            Ok(()) => RowOutcome::Success {
                uuid: uuid.to_string(),
            },
            Err(err) => RowOutcome::remote_failure(err),
        })
    }
}

#[async_trait]
impl RowPipeline for GroupPipeline {
    fn label(&self) -> &'static str {
        "Group"
    }

    async fn run(&self, ctx: &ImportContext, row: &Row) -> RowOutcome {
        let rc = row.context();

        // This row may already be imported: resume map first, then a
        // sheet-supplied id.
        let known = ctx
            .groups
            .id_for_row(row.source_index())
            .await
            .or_else(|| row.get("uuid").map(str::to_string));

        if row.contains("delete") {
            let Some(uuid) = known else {
                return RowOutcome::invalid("delete requested for a group that was never imported");
            };
            return self.delete_group(ctx, row, &uuid).await;
        }

        if let Some(uuid) = &known {
            if let Some(source) = row.get("group_clone") {
                if let Some(outcome) = self.try_clone(ctx, row, uuid, source).await {
                    return outcome;
                }
            } else {
                info!("{}: group already imported", rc);
                return RowOutcome::AlreadyExists { uuid: uuid.clone() };
            }
        }

        // Validate before touching the hierarchy.
        let Some(base_name) = row.get("group_name") else {
            return RowOutcome::invalid("group name required for group import");
        };
        let Some(owner) = row.get("owner_uuid") else {
            return RowOutcome::invalid("group import requires a group owner");
        };
        let location: std::collections::HashMap<String, String> = row
            .with_prefix("address_")
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if !location.contains_key("zip") {
            return RowOutcome::invalid("location ZIP required for group import");
        }
        let Some(category) = row
            .get("group_categories")
            .and_then(|list| list.split(',').next_back())
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return RowOutcome::invalid("group category required for group import");
        };

        match ctx.api.user_get(owner).await {
            Ok(_) => {}
            Err(ApiError::NotFound { .. }) => {
                return RowOutcome::invalid(format!("couldn't get group owner from UUID {}", owner));
            }
            Err(err) => return RowOutcome::remote_failure(err),
        }

        let group_type = row.get("group_type");
        let chosen = ctx.groups.disambiguate(base_name, group_type).await;
        let mut title = chosen.title;

        // Resolve the parent group: explicit id, then registry, then one
        // remote search. Unresolvable parents defer the row.
        let mut groups_above = Vec::new();
        if let Some(parent_uuid) = row.get("group_uuid") {
            groups_above.push(parent_uuid.to_string());
        } else {
            let above = chosen
                .implied_parent
                .or_else(|| row.get("group_above").map(str::to_string));
            if let Some(above) = above {
                if let Some(uuid) = ctx.groups.id_for_name(&above).await {
                    info!("{}: found group above {} at UUID {}", rc, above, uuid);
                    groups_above.push(uuid);
                } else {
                    match ctx.api.group_search(&above).await {
                        Ok(results) => {
                            match results.into_iter().find(|g| g.title == above) {
                                Some(found) => {
                                    if found.title == title {
                                        // The parent owns this title; keep
                                        // the child distinguishable.
                                        title = format!(
                                            "{} {}",
                                            title,
                                            group_type.unwrap_or_default()
                                        )
                                        .trim()
                                        .to_string();
                                    }
                                    groups_above.push(found.uuid);
                                }
                                None => {
                                    return RowOutcome::Deferred { dependency: above };
                                }
                            }
                        }
                        Err(err) => return RowOutcome::remote_failure(err),
                    }
                }
            }
        }

        // One creation per group name, even across racing workers.
        let identity_key = format!("group:{}", title);
        let lookup = {
            let groups = &ctx.groups;
            let title = title.clone();
            move || async move { Ok(groups.id_for_name(&title).await) }
        };
        let guard = match ctx.identities.resolve_for_create(&identity_key, lookup).await {
            Ok(CreateSlot::Existing { uuid }) => {
                info!("{}: group {} already created in this run", rc, title);
                return RowOutcome::AlreadyExists { uuid };
            }
            Ok(CreateSlot::Vacant { guard }) => guard,
            Err(err) => return RowOutcome::remote_failure(err),
        };

        info!("{}: importing group: {}", rc, title);
        let group = NewGroup {
            title: title.clone(),
            description: row.get("group_description").map(str::to_string),
            location,
            category: category.to_string(),
            group_type: group_type.map(str::to_string),
            groups_above,
        };

        let record = match ctx.api.group_create(&group).await {
            Ok(record) => record,
            Err(err) => {
                return RowOutcome::remote_failure(format!("failed to import group: {}", err));
            }
        };
        info!("{}: group UUID: {}", rc, record.uuid);

        ctx.identities.insert(&identity_key, &record.uuid).await;
        if let Err(err) = ctx
            .groups
            .record(row.source_index(), &record.title, &record.uuid)
            .await
        {
            error!("{}: failed to persist group map entry: {:#}", rc, err);
        }
        drop(guard);

        ctx.stats.increment("Groups");

        if let Some(source) = row.get("group_clone") {
            info!("{}: cloning settings from group {}", rc, source);
            if let Err(err) = ctx.api.group_clone(&record.uuid, source).await {
                error!("{}: clone after create failed: {}", rc, err);
            }
        }

        RowOutcome::Success { uuid: record.uuid }
    }
}
