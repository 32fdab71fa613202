//! Mixed row pipeline: participant, parents and group assignments per row
//!
//! One row carries up to two parents (`parent_1_*`, `parent_2_*`), a
//! participant (`participant_*`) and any number of group assignments
//! (`group_1_*`, `group_2_*`, ...). Parents import first so the
//! participant's account can hang off theirs, then the participant, then
//! one membership per assignment using the participant's resolved id.

use async_trait::async_trait;

use crate::import::context::ImportContext;
use crate::import::outcome::RowOutcome;
use crate::import::row::Row;
use crate::import::scheduler::log_outcome;

use super::membership::MembershipPipeline;
use super::user::UserPipeline;
use super::RowPipeline;

/// Splits one combined row into user and membership sub-rows
pub struct MixedPipeline;

/// Highest numeric segment found in any `group_*` column name
///
/// The assignment columns are `group_1_name`, `group_2_role` and so on;
/// scanning for the max index tolerates sparse numbering.
fn group_count(row: &Row) -> usize {
    let mut max = 0;
    for (name, _) in row.iter() {
        if !name.starts_with("group_") {
            continue;
        }
        for part in name.split('_') {
            if let Ok(n) = part.parse::<usize>() {
                max = max.max(n);
            }
        }
    }
    max
}

#[async_trait]
impl RowPipeline for MixedPipeline {
    fn label(&self) -> &'static str {
        "Participant row"
    }

    async fn run(&self, ctx: &ImportContext, row: &Row) -> RowOutcome {
        // Parents come first so a child participant finds its accounts.
        let mut last = RowOutcome::invalid("no parent or participant columns present");
        for (prefix, description) in [("parent_1_", "Parent 1"), ("parent_2_", "Parent 2")] {
            let parent = row.with_prefix(prefix);
            if parent.is_empty() {
                continue;
            }
            let outcome = UserPipeline::new(description).run(ctx, &parent).await;
            log_outcome(description, row, &outcome);
            last = outcome;
        }

        let participant = row.with_prefix("participant_");
        if participant.is_empty() {
            return last;
        }

        // The participant keeps the parents' addresses, under their full
        // column names, as the path to a child account.
        let parent_emails: Vec<(String, String)> = row
            .iter()
            .filter(|(name, _)| name.contains("email_address"))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let participant_row = participant.merged(parent_emails);
        let outcome = UserPipeline::new("Participant")
            .run(ctx, &participant_row)
            .await;
        let Some(participant_uuid) = outcome.uuid().map(str::to_string) else {
            // No account id means no assignments; the participant outcome
            // stands for the whole row.
            return outcome;
        };

        let identified =
            participant.merged([("uuid".to_string(), participant_uuid.clone())]);
        for i in 1..=group_count(row) {
            let assignment = row.filtered(&format!("group_{}_", i), "group_");
            if assignment.is_empty() {
                continue;
            }
            // A later assignment may defer the row; completed joins are
            // marked in the identity cache so the replay skips them instead
            // of joining twice.
            let marker = format!(
                "join:{}:{}:{}",
                participant_uuid,
                row.source_index(),
                i
            );
            if ctx.identities.get(&marker).await.is_some() {
                continue;
            }
            let assignment = assignment.merged(
                identified
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.to_string())),
            );
            let sub_outcome = MembershipPipeline.run(ctx, &assignment).await;
            if let RowOutcome::Deferred { .. } = sub_outcome {
                // Re-running the whole row is safe: users come back as
                // already-exists and finished joins are skipped.
                return sub_outcome;
            }
            if let Some(group_uuid) = sub_outcome.uuid() {
                ctx.identities.insert(&marker, group_uuid).await;
            }
            log_outcome("Group assignment", row, &sub_outcome);
        }

        outcome
    }
}
