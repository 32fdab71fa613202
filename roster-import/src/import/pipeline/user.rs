//! User row pipeline: standalone accounts and child accounts
//!
//! Identity is the normalized email address, or the sorted parent-id set
//! when the sheet provides no email. Creation happens while the per-identity
//! lock is held, so racing workers importing the same person collapse into
//! one create and one "already exists".

use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::api::{ApiError, NewChild, NewUser, UserRecord};
use crate::import::context::ImportContext;
use crate::import::identity::{CreateSlot, parents_key};
use crate::import::outcome::RowOutcome;
use crate::import::row::Row;
use crate::validate::{age_today, parse_birthdate, valid_email_address};

use super::RowPipeline;

const REQUIRED_FIELDS: [&str; 4] = ["first_name", "last_name", "gender", "birthdate"];

/// Imports one person per row
pub struct UserPipeline {
    /// Role of the person in log lines and stats ("User", "Parent 1", ...)
    description: &'static str,
}

impl UserPipeline {
    pub fn new(description: &'static str) -> Self {
        Self { description }
    }

    /// Resolve both parent email addresses to account ids, via the cache
    async fn resolve_parents(&self, ctx: &ImportContext, row: &Row) -> [Option<String>; 2] {
        let mut parents = [None, None];
        for (i, slot) in parents.iter_mut().enumerate() {
            let column = format!("parent_{}_email_address", i + 1);
            let Some(email) = row.get(&column) else {
                continue;
            };

            let api = ctx.api.clone();
            let address = email.to_string();
            let lookup = move || async move {
                Ok(api
                    .user_get_email(&address)
                    .await?
                    .map(|user| user.uuid))
            };

            match ctx.identities.resolve(email, lookup).await {
                Ok(Some(uuid)) => *slot = Some(uuid),
                Ok(None) => {
                    warn!(
                        "{}: can't find account for parent {}: {}",
                        row.context(),
                        i + 1,
                        email
                    );
                }
                Err(err) => {
                    error!("{}: parent {}: {}", row.context(), i + 1, err);
                }
            }
        }
        parents
    }

    /// Find an already-existing child of these parents matching this row
    ///
    /// Two same-named children of the same parent pair are the same child.
    /// Whichever parent doesn't list the child yet gets it linked. With
    /// `known_uuid` set (the row's email already resolved) the match is by
    /// id, and linking still happens.
    async fn verify_children(
        &self,
        ctx: &ImportContext,
        row: &Row,
        parents: &[Option<String>; 2],
        known_uuid: Option<&str>,
    ) -> Option<UserRecord> {
        let first = row.get("first_name")?.to_lowercase();
        let last = row.get("last_name")?.to_lowercase();
        let rc = row.context();

        let mut children: [Vec<UserRecord>; 2] = [Vec::new(), Vec::new()];
        for (i, parent) in parents.iter().enumerate() {
            let Some(parent) = parent else { continue };
            match ctx.api.user_children_list(parent).await {
                Ok(list) => children[i] = list,
                Err(err) => {
                    debug!("{}: couldn't list children of parent {}: {}", rc, i + 1, err);
                }
            }
        }

        let matched: Option<UserRecord> = match known_uuid {
            Some(uuid) => match children.iter().flatten().find(|c| c.uuid == uuid) {
                Some(child) => Some(child.clone()),
                // Known account, but not yet anyone's child.
                None => ctx.api.user_get(uuid).await.ok(),
            },
            None => children
                .iter()
                .flatten()
                .find(|child| {
                    child
                        .first_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase() == first)
                        && child
                            .last_name
                            .as_deref()
                            .is_some_and(|name| name.to_lowercase() == last)
                })
                .cloned(),
        };
        let matched = matched?;

        if known_uuid.is_none() {
            info!(
                "{}: found matching child for {} {} {}",
                rc,
                self.description,
                row.get("first_name").unwrap_or_default(),
                row.get("last_name").unwrap_or_default()
            );
        }

        for (i, parent) in parents.iter().enumerate() {
            let Some(parent) = parent else { continue };
            if children[i].iter().any(|c| c.uuid == matched.uuid) {
                continue;
            }
            info!(
                "{}: adding existing child {} to parent {}",
                rc,
                matched.uuid,
                i + 1
            );
            if let Err(err) = ctx
                .api
                .user_create_child(parent, &NewChild::link(&matched.uuid))
                .await
            {
                error!(
                    "{}: failed to link existing child to parent {}: {}",
                    rc,
                    i + 1,
                    err
                );
            }
        }

        Some(matched)
    }
}

#[async_trait]
impl RowPipeline for UserPipeline {
    fn label(&self) -> &'static str {
        self.description
    }

    async fn run(&self, ctx: &ImportContext, row: &Row) -> RowOutcome {
        let rc = row.context();

        // Validate before any remote call.
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !row.contains(field))
            .collect();
        if !missing.is_empty() {
            return RowOutcome::invalid(format!(
                "missing required fields for {}: {}",
                self.description,
                missing.join(", ")
            ));
        }
        let Some(birthdate) = row.get("birthdate").and_then(parse_birthdate) else {
            return RowOutcome::invalid(format!(
                "invalid birth date for {}: {}",
                self.description,
                row.get("birthdate").unwrap_or_default()
            ));
        };

        let parents = self.resolve_parents(ctx, row).await;
        let has_parent = parents.iter().any(Option::is_some);

        // Minors need a resolvable parent account.
        if age_today(birthdate) < ctx.options.minor_age_threshold && !has_parent {
            return RowOutcome::invalid(format!(
                "missing parents for {} below age {}",
                self.description, ctx.options.minor_age_threshold
            ));
        }

        let email = row.get("email_address");
        let mut synthesize_email = false;

        // Acquire the identity lock: by email, or by parent pair when the
        // sheet has no email for this person.
        let guard = match email {
            None => {
                if !has_parent {
                    return RowOutcome::invalid(format!(
                        "missing parents for {} without email address",
                        self.description
                    ));
                }
                synthesize_email = true;
                let ids: Vec<&str> = parents.iter().flatten().map(String::as_str).collect();
                ctx.identities.lock_key(&parents_key(&ids)).await
            }
            Some(email) => {
                let api = ctx.api.clone();
                let address = email.to_string();
                let lookup = move || async move {
                    Ok(api
                        .user_get_email(&address)
                        .await?
                        .map(|user| user.uuid))
                };
                match ctx.identities.resolve_for_create(email, lookup).await {
                    Ok(CreateSlot::Existing { uuid }) => {
                        warn!(
                            "{}: {} already exists: {} at UUID {}, will still be added to groups",
                            rc, self.description, email, uuid
                        );
                        self.verify_children(ctx, row, &parents, Some(&uuid)).await;
                        return RowOutcome::AlreadyExists { uuid };
                    }
                    Ok(CreateSlot::Vacant { guard }) => {
                        if !valid_email_address(email) {
                            return RowOutcome::invalid(format!(
                                "{} has an invalid email address: {}",
                                self.description, email
                            ));
                        }
                        if !ctx.domains.active_email_domain(email).await {
                            return RowOutcome::invalid(format!(
                                "{} has an email address with an inactive domain: {}",
                                self.description, email
                            ));
                        }
                        guard
                    }
                    Err(err) if err.is_duplicate_identity() => {
                        return RowOutcome::invalid(format!("{}: {}", self.description, err));
                    }
                    Err(err) => return RowOutcome::remote_failure(err),
                }
            }
        };

        // Same-named child of the same parents: reuse, don't re-create.
        if let Some(existing) = self.verify_children(ctx, row, &parents, None).await {
            drop(guard);
            return RowOutcome::AlreadyExists {
                uuid: existing.uuid,
            };
        }

        info!(
            "{}: importing {}: {} {}",
            rc,
            self.description,
            row.get("first_name").unwrap_or_default(),
            row.get("last_name").unwrap_or_default()
        );

        // Commit while the identity lock is held.
        let created = if let Some(parent1) = &parents[0] {
            let child = NewChild {
                first_name: row.get("first_name").map(str::to_string),
                last_name: row.get("last_name").map(str::to_string),
                birth_date: Some(birthdate),
                gender: row.get("gender").map(str::to_string),
                email: email.map(str::to_string),
                synthesize_email,
                child_uuid: None,
            };
            ctx.api.user_create_child(parent1, &child).await
        } else {
            let user = NewUser {
                // Checked above: no parent and no email never reaches here.
                email: email.unwrap_or_default().to_string(),
                first_name: row.get("first_name").unwrap_or_default().to_string(),
                last_name: row.get("last_name").unwrap_or_default().to_string(),
                gender: row.get("gender").unwrap_or_default().to_string(),
                birth_date: birthdate,
                extra: serde_json::Map::new(),
            };
            ctx.api.user_create(&user).await
        };

        let record = match created {
            Ok(record) => record,
            Err(err @ ApiError::DuplicateIdentity { .. }) => {
                return RowOutcome::invalid(format!("{}: {}", self.description, err));
            }
            Err(err) => {
                return RowOutcome::remote_failure(format!(
                    "failed to import {}: {}",
                    self.description, err
                ));
            }
        };

        // Cache the new id before releasing the lock so racing rows observe
        // it the moment they acquire it.
        if let Some(mail) = &record.email {
            ctx.identities.insert(mail, &record.uuid).await;
        }
        drop(guard);

        ctx.stats.increment("Users");
        if self.description != "User" {
            ctx.stats.increment(&format!("{}s", self.description));
        }

        // Parent 1 is already linked by the child create; attach parent 2.
        if let Some(parent2) = &parents[1] {
            if parents[0].is_some() {
                if let Err(err) = ctx
                    .api
                    .user_create_child(parent2, &NewChild::link(&record.uuid))
                    .await
                {
                    error!("{}: failed to link child to parent 2: {}", rc, err);
                }
            }
        }

        RowOutcome::Success { uuid: record.uuid }
    }
}
