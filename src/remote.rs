//! The remote-client collaborator contract (§6). The actual Todoist REST
//! client, OAuth flow, and token store are explicitly out of scope (§1); this
//! module only defines the narrow interface the reconciler consumes, plus an
//! in-memory test double used by the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Error;

/// A field that distinguishes "not provided" (leave as-is) from "clear to
/// empty" (§6 `update_task`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clearable<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Default for Clearable<T> {
    fn default() -> Self {
        Self::Unchanged
    }
}

/// One item in the snapshot's `items` list (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub id: String,
    pub content: String,
    pub description: String,
    pub checked: bool,
    pub project_id: String,
    pub section_id: Option<String>,
    pub parent_id: Option<String>,
    pub priority: u8,
    pub due_date: Option<NaiveDate>,
    pub due_string: Option<String>,
    pub due_is_recurring: bool,
    pub deadline_date: Option<NaiveDate>,
    pub labels: Vec<String>,
    pub responsible_uid: Option<String>,
    pub is_deleted: bool,
}

/// One entry in the snapshot's `projects` list (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub color: Option<String>,
    pub is_archived: bool,
}

/// One entry in the snapshot's `sections` list (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSection {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub is_archived: bool,
}

/// The full remote listing fetched once per run (§3, §6).
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    pub items: Vec<RemoteItem>,
    pub projects: Vec<RemoteProject>,
    pub sections: Vec<RemoteSection>,
    pub user_id: String,
    pub sync_token: String,
}

/// Payload for `create_task` (§4.5.1, §6).
#[derive(Debug, Clone, Default)]
pub struct CreateTaskPayload {
    pub content: String,
    pub description: String,
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    pub priority: Option<u8>,
    pub due_date: Option<NaiveDate>,
    pub due_string: Option<String>,
    pub labels: Vec<String>,
    pub parent_id: Option<String>,
}

/// Patch for `update_task` (§4.5.2, §6). Every field distinguishes
/// "not provided" from "clear to empty" via [`Clearable`].
#[derive(Debug, Clone, Default)]
pub struct UpdateTaskPatch {
    pub task_id: String,
    pub content: Clearable<String>,
    pub description: Clearable<String>,
    pub is_done: Option<bool>,
    pub project_id: Clearable<String>,
    pub section_id: Clearable<String>,
    pub priority: Clearable<u8>,
    pub due_date: Clearable<NaiveDate>,
    pub due_string: Clearable<String>,
    pub labels: Clearable<Vec<String>>,
}

/// The collaborator contract the reconciler depends on (§6). Implemented in
/// production by a thin Todoist REST client that this crate does not ship
/// (§1 scope).
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<RemoteSnapshot, Error>;
    async fn fetch_recently_deleted_ids(&self, limit: usize) -> Result<HashSet<String>, Error>;
    async fn create_task(&self, payload: CreateTaskPayload) -> Result<String, Error>;
    async fn update_task(&self, patch: UpdateTaskPatch) -> Result<(), Error>;
}

/// An in-memory double used by the reconciler's test suite. Mutates its
/// internal state synchronously under a [`Mutex`] so tests can assert on
/// dispatched creates/updates after a run.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    pub snapshot: Mutex<RemoteSnapshot>,
    pub recently_deleted: Mutex<HashSet<String>>,
    pub next_id: Mutex<u64>,
    pub created: Mutex<Vec<CreateTaskPayload>>,
    pub updated: Mutex<Vec<UpdateTaskPatch>>,
}

impl InMemoryRemote {
    pub fn new(snapshot: RemoteSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            recently_deleted: Mutex::new(HashSet::new()),
            next_id: Mutex::new(1000),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteClient for InMemoryRemote {
    async fn fetch_snapshot(&self) -> Result<RemoteSnapshot, Error> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn fetch_recently_deleted_ids(&self, _limit: usize) -> Result<HashSet<String>, Error> {
        Ok(self.recently_deleted.lock().unwrap().clone())
    }

    async fn create_task(&self, payload: CreateTaskPayload) -> Result<String, Error> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = format!("gen-{}", *next_id);
        *next_id += 1;

        let mut snapshot = self.snapshot.lock().unwrap();
        snapshot.items.push(RemoteItem {
            id: id.clone(),
            content: payload.content.clone(),
            description: payload.description.clone(),
            checked: false,
            project_id: payload.project_id.clone().unwrap_or_default(),
            section_id: payload.section_id.clone(),
            parent_id: payload.parent_id.clone(),
            priority: payload.priority.unwrap_or(1),
            due_date: payload.due_date,
            due_string: payload.due_string.clone(),
            due_is_recurring: false,
            deadline_date: None,
            labels: payload.labels.clone(),
            responsible_uid: None,
            is_deleted: false,
        });
        drop(snapshot);

        self.created.lock().unwrap().push(payload);
        Ok(id)
    }

    async fn update_task(&self, patch: UpdateTaskPatch) -> Result<(), Error> {
        let mut snapshot = self.snapshot.lock().unwrap();
        if let Some(item) = snapshot.items.iter_mut().find(|i| i.id == patch.task_id) {
            if let Some(done) = patch.is_done {
                item.checked = done;
            }
            match &patch.content {
                Clearable::Set(v) => item.content = v.clone(),
                Clearable::Clear => item.content.clear(),
                Clearable::Unchanged => {}
            }
            match &patch.due_date {
                Clearable::Set(v) => item.due_date = Some(*v),
                Clearable::Clear => item.due_date = None,
                Clearable::Unchanged => {}
            }
        }
        drop(snapshot);
        self.updated.lock().unwrap().push(patch);
        Ok(())
    }
}

/// Looks up a project's display name by ID within a snapshot.
pub fn project_names(snapshot: &RemoteSnapshot) -> HashMap<String, String> {
    snapshot
        .projects
        .iter()
        .map(|p| (p.id.clone(), p.name.clone()))
        .collect()
}

/// Looks up a project's parent ID by ID within a snapshot.
pub fn project_parents(snapshot: &RemoteSnapshot) -> HashMap<String, String> {
    snapshot
        .projects
        .iter()
        .filter_map(|p| p.parent_id.clone().map(|parent| (p.id.clone(), parent)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_task_assigns_stable_incrementing_ids() {
        let remote = InMemoryRemote::new(RemoteSnapshot::default());
        let id1 = remote
            .create_task(CreateTaskPayload {
                content: "a".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let id2 = remote
            .create_task(CreateTaskPayload {
                content: "b".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn update_task_marks_done() {
        let mut snapshot = RemoteSnapshot::default();
        snapshot.items.push(RemoteItem {
            id: "A1".into(),
            content: "x".into(),
            description: String::new(),
            checked: false,
            project_id: "P1".into(),
            section_id: None,
            parent_id: None,
            priority: 1,
            due_date: None,
            due_string: None,
            due_is_recurring: false,
            deadline_date: None,
            labels: vec![],
            responsible_uid: None,
            is_deleted: false,
        });
        let remote = InMemoryRemote::new(snapshot);
        remote
            .update_task(UpdateTaskPatch {
                task_id: "A1".into(),
                is_done: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        let snap = remote.fetch_snapshot().await.unwrap();
        assert!(snap.items[0].checked);
    }
}
