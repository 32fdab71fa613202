//! Per-row pipeline outcomes
//!
//! "Already exists" and "couldn't resolve dependency" are ordinary results
//! here, not errors: the scheduler inspects the variant to decide whether a
//! row counts as success, gets skipped, or is queued for the retry pass.

/// Outcome of running one row through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The remote entity was created (or the row's operation completed)
    Success { uuid: String },
    /// The entity already existed; downstream dependents may use the id
    AlreadyExists { uuid: String },
    /// A required field was missing or malformed; no remote call was made
    Invalid { reason: String },
    /// A dependency was not yet resolvable; the row is queued for the
    /// sequential retry pass
    Deferred { dependency: String },
    /// The directory service failed the operation; the job continues
    RemoteFailure { reason: String },
}

impl RowOutcome {
    pub fn invalid(reason: impl Into<String>) -> Self {
        RowOutcome::Invalid {
            reason: reason.into(),
        }
    }

    pub fn remote_failure(reason: impl std::fmt::Display) -> Self {
        RowOutcome::RemoteFailure {
            reason: reason.to_string(),
        }
    }

    /// Success and already-exists both count as successful for stats and
    /// for dependents
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RowOutcome::Success { .. } | RowOutcome::AlreadyExists { .. }
        )
    }

    /// The resolved remote identifier, when the outcome carries one
    pub fn uuid(&self) -> Option<&str> {
        match self {
            RowOutcome::Success { uuid } | RowOutcome::AlreadyExists { uuid } => Some(uuid),
            _ => None,
        }
    }
}
