//! Event row pipeline
//!
//! Events carry a title, a duration and the groups they belong to. Group
//! references go through the registry the same way membership rows do, so
//! an event naming a not-yet-imported group defers to the retry pass.

use async_trait::async_trait;
use log::info;

use crate::api::NewEvent;
use crate::import::context::ImportContext;
use crate::import::outcome::RowOutcome;
use crate::import::row::Row;

use super::RowPipeline;

/// Imports one event per row
pub struct EventPipeline;

#[async_trait]
impl RowPipeline for EventPipeline {
    fn label(&self) -> &'static str {
        "Event"
    }

    async fn run(&self, ctx: &ImportContext, row: &Row) -> RowOutcome {
        let Some(title) = row.get("title") else {
            return RowOutcome::invalid("event import requires a title");
        };
        let Some(duration_minutes) = row
            .get("duration__in_minutes_")
            .and_then(|d| d.parse::<i64>().ok())
        else {
            return RowOutcome::invalid("event import requires a duration in minutes");
        };

        let mut group_uuids = Vec::new();
        if let Some(uuid) = row.get("group_uuid") {
            group_uuids.push(uuid.to_string());
        }
        if let Some(names) = row.get("group_names") {
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                match ctx.groups.id_for_name(name).await {
                    Some(uuid) => group_uuids.push(uuid),
                    None => {
                        return RowOutcome::Deferred {
                            dependency: name.to_string(),
                        };
                    }
                }
            }
        }
        if group_uuids.is_empty() {
            return RowOutcome::invalid("event import requires at least one group");
        }

        let event = NewEvent {
            title: title.to_string(),
            description: row.get("description").map(str::to_string),
            group_uuids,
            duration_minutes,
        };
        info!("{}: importing event: {}", row.context(), title);
        match ctx.api.event_create(&event).await {
            Ok(record) => {
                ctx.stats.increment("Events");
                RowOutcome::Success { uuid: record.uuid }
            }
            Err(err) => {
                RowOutcome::remote_failure(format!("failed to import event {}: {}", title, err))
            }
        }
    }
}
