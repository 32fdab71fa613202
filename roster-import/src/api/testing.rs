//! Scripted in-memory directory for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::client::DirectoryApi;
use super::error::ApiError;
use super::models::{
    EventRecord, GroupJoin, GroupRecord, NewChild, NewEvent, NewGroup, NewUser, UserRecord,
};

#[derive(Default)]
struct MockState {
    users: Vec<UserRecord>,
    /// parent uuid -> child uuids
    children: HashMap<String, Vec<String>>,
    groups: Vec<GroupRecord>,
    /// Email addresses that resolve ambiguously
    duplicate_emails: HashSet<String>,
    /// (parent uuid, child uuid) pairs recorded by link requests
    links: Vec<(String, String)>,
    joins: Vec<GroupJoin>,
    events: Vec<NewEvent>,
    deleted_groups: Vec<String>,
    fail_user_create: bool,
    fail_group_create: bool,
    next_id: usize,
}

/// In-memory `DirectoryApi` with call counters for assertions
#[derive(Default)]
pub struct MockDirectory {
    state: Mutex<MockState>,
    pub user_create_calls: AtomicUsize,
    pub group_create_calls: AtomicUsize,
    pub child_create_calls: AtomicUsize,
    pub join_calls: AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(state: &mut MockState, kind: &str) -> String {
        state.next_id += 1;
        format!("{}-{}", kind, state.next_id)
    }

    pub fn add_user(&self, uuid: &str, email: &str, first: &str, last: &str) {
        self.state.lock().unwrap().users.push(UserRecord {
            uuid: uuid.to_string(),
            email: Some(email.to_string()),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
        });
    }

    pub fn add_child(&self, parent_uuid: &str, child_uuid: &str) {
        self.state
            .lock()
            .unwrap()
            .children
            .entry(parent_uuid.to_string())
            .or_default()
            .push(child_uuid.to_string());
    }

    pub fn add_group(&self, uuid: &str, title: &str) {
        self.state.lock().unwrap().groups.push(GroupRecord {
            uuid: uuid.to_string(),
            title: title.to_string(),
        });
    }

    pub fn mark_duplicate(&self, email: &str) {
        self.state
            .lock()
            .unwrap()
            .duplicate_emails
            .insert(email.to_string());
    }

    pub fn fail_user_create(&self) {
        self.state.lock().unwrap().fail_user_create = true;
    }

    pub fn fail_group_create(&self) {
        self.state.lock().unwrap().fail_group_create = true;
    }

    pub fn links(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().links.clone()
    }

    pub fn joins(&self) -> Vec<GroupJoin> {
        self.state.lock().unwrap().joins.clone()
    }

    pub fn events(&self) -> Vec<NewEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn deleted_groups(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_groups.clone()
    }

    pub fn group_titles(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .groups
            .iter()
            .map(|g| g.title.clone())
            .collect()
    }
}

#[async_trait]
impl DirectoryApi for MockDirectory {
    async fn user_get_email(&self, email: &str) -> Result<Option<UserRecord>, ApiError> {
        let state = self.state.lock().unwrap();
        if state.duplicate_emails.contains(email) {
            return Err(ApiError::DuplicateIdentity {
                email: email.to_string(),
            });
        }
        Ok(state
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn user_create(&self, user: &NewUser) -> Result<UserRecord, ApiError> {
        self.user_create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.fail_user_create {
            return Err(ApiError::remote("user creation rejected"));
        }
        let record = UserRecord {
            uuid: Self::fresh_id(&mut state, "user"),
            email: Some(user.email.clone()),
            first_name: Some(user.first_name.clone()),
            last_name: Some(user.last_name.clone()),
        };
        state.users.push(record.clone());
        Ok(record)
    }

    async fn user_create_child(
        &self,
        parent_uuid: &str,
        child: &NewChild,
    ) -> Result<UserRecord, ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = &child.child_uuid {
            // Link-only request
            state.links.push((parent_uuid.to_string(), existing.clone()));
            let record = state
                .users
                .iter()
                .find(|u| &u.uuid == existing)
                .cloned()
                .unwrap_or(UserRecord {
                    uuid: existing.clone(),
                    email: None,
                    first_name: None,
                    last_name: None,
                });
            state
                .children
                .entry(parent_uuid.to_string())
                .or_default()
                .push(existing.clone());
            return Ok(record);
        }
        self.child_create_calls.fetch_add(1, Ordering::SeqCst);
        if state.fail_user_create {
            return Err(ApiError::remote("child creation rejected"));
        }
        let uuid = Self::fresh_id(&mut state, "child");
        let email = child
            .email
            .clone()
            .or_else(|| child.synthesize_email.then(|| format!("{}@roster.example", uuid)));
        let record = UserRecord {
            uuid: uuid.clone(),
            email,
            first_name: child.first_name.clone(),
            last_name: child.last_name.clone(),
        };
        state.users.push(record.clone());
        state
            .children
            .entry(parent_uuid.to_string())
            .or_default()
            .push(uuid);
        Ok(record)
    }

    async fn user_get(&self, uuid: &str) -> Result<UserRecord, ApiError> {
        self.state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.uuid == uuid)
            .cloned()
            .ok_or(ApiError::NotFound {
                what: format!("user {}", uuid),
            })
    }

    async fn user_children_list(&self, uuid: &str) -> Result<Vec<UserRecord>, ApiError> {
        let state = self.state.lock().unwrap();
        let ids = state.children.get(uuid).cloned().unwrap_or_default();
        Ok(state
            .users
            .iter()
            .filter(|u| ids.contains(&u.uuid))
            .cloned()
            .collect())
    }

    async fn group_create(&self, group: &NewGroup) -> Result<GroupRecord, ApiError> {
        self.group_create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.fail_group_create {
            return Err(ApiError::remote("group creation rejected"));
        }
        let record = GroupRecord {
            uuid: Self::fresh_id(&mut state, "group"),
            title: group.title.clone(),
        };
        state.groups.push(record.clone());
        Ok(record)
    }

    async fn group_get(&self, uuid: &str) -> Result<GroupRecord, ApiError> {
        self.state
            .lock()
            .unwrap()
            .groups
            .iter()
            .find(|g| g.uuid == uuid)
            .cloned()
            .ok_or(ApiError::NotFound {
                what: format!("group {}", uuid),
            })
    }

    async fn group_update(&self, uuid: &str, _fields: &serde_json::Value) -> Result<(), ApiError> {
        let state = self.state.lock().unwrap();
        if state.groups.iter().any(|g| g.uuid == uuid) {
            Ok(())
        } else {
            Err(ApiError::NotFound {
                what: format!("group {}", uuid),
            })
        }
    }

    async fn group_delete(&self, uuid: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.groups.retain(|g| g.uuid != uuid);
        state.deleted_groups.push(uuid.to_string());
        Ok(())
    }

    async fn group_clone(&self, target_uuid: &str, source_uuid: &str) -> Result<(), ApiError> {
        let state = self.state.lock().unwrap();
        for uuid in [target_uuid, source_uuid] {
            if !state.groups.iter().any(|g| g.uuid == uuid) {
                return Err(ApiError::NotFound {
                    what: format!("group {}", uuid),
                });
            }
        }
        Ok(())
    }

    async fn group_search(&self, title: &str) -> Result<Vec<GroupRecord>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .groups
            .iter()
            .filter(|g| g.title == title)
            .cloned()
            .collect())
    }

    async fn user_join_group(&self, join: &GroupJoin) -> Result<serde_json::Value, ApiError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().joins.push(join.clone());
        Ok(serde_json::json!({ "joined": true }))
    }

    async fn event_create(&self, event: &NewEvent) -> Result<EventRecord, ApiError> {
        let mut state = self.state.lock().unwrap();
        let record = EventRecord {
            uuid: Self::fresh_id(&mut state, "event"),
            title: event.title.clone(),
        };
        state.events.push(event.clone());
        Ok(record)
    }
}
