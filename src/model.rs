//! The typed record layer sitting on top of the frontmatter map (§3, §9
//! "Dynamic frontmatter bag"). Parsing is tolerant; (de)serialization of
//! these types back to frontmatter always goes through [`crate::frontmatter`]
//! rather than `serde_yaml` directly, so legacy-key fallback and canonical
//! array/bool normalization apply uniformly.

use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::frontmatter::{keys, Frontmatter, PropName};

fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn set_opt_string(fm: &mut Frontmatter, key: &PropName, value: Option<&str>) {
    match value {
        Some(v) if !v.trim().is_empty() => fm.set_string(key, v),
        _ => fm.remove(key),
    }
}

/// `task_status` (§3). Mirrors `task_done` (I5): `task_done == (status == Done)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum TaskStatus {
    #[default]
    Open,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Done => "Done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Open" => Some(Self::Open),
            "Done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// `sync_status` (§3). Drives conflict resolution (§4.5.5) and missing-remote
/// handling (§4.5.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    DirtyLocal,
    QueuedLocalCreate,
    LocalOnly,
    MissingRemote,
    CompletedRemote,
    ArchivedRemote,
    DeletedRemote,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::DirtyLocal => "dirty_local",
            Self::QueuedLocalCreate => "queued_local_create",
            Self::LocalOnly => "local_only",
            Self::MissingRemote => "missing_remote",
            Self::CompletedRemote => "completed_remote",
            Self::ArchivedRemote => "archived_remote",
            Self::DeletedRemote => "deleted_remote",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "synced" => Some(Self::Synced),
            "dirty_local" => Some(Self::DirtyLocal),
            "queued_local_create" => Some(Self::QueuedLocalCreate),
            "local_only" => Some(Self::LocalOnly),
            "missing_remote" => Some(Self::MissingRemote),
            "completed_remote" => Some(Self::CompletedRemote),
            "archived_remote" => Some(Self::ArchivedRemote),
            "deleted_remote" => Some(Self::DeletedRemote),
            _ => None,
        }
    }

    /// States a managed note can be in while still being eligible for
    /// parent/child back-link rewrites (§4.5.4: "skip files in terminal
    /// states").
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ArchivedRemote | Self::DeletedRemote)
    }
}

/// Due-date pair: the machine-parseable date plus the source natural-language
/// string (§3). The NL string is opaque to this crate (§1 Non-goals / §6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Due {
    pub date: Option<NaiveDate>,
    pub string: Option<Arc<str>>,
}

impl Due {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.string.is_none()
    }
}

/// A managed TaskNote (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNote {
    pub path: Utf8PathBuf,
    pub vault_uuid: Arc<str>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub tags: Vec<Arc<str>>,

    pub task_title: Arc<str>,
    pub task_status: TaskStatus,
    pub task_done: bool,

    pub remote_task_id: Option<Arc<str>>,
    pub remote_project_id: Option<Arc<str>>,
    pub remote_section_id: Option<Arc<str>>,
    pub project_name: Option<Arc<str>>,
    pub section_name: Option<Arc<str>>,
    pub project_link: Option<Arc<str>>,
    pub section_link: Option<Arc<str>>,

    pub priority: Option<u8>,
    pub priority_label: Option<Arc<str>>,
    pub due: Due,
    pub is_recurring: bool,
    pub recurrence: Option<Arc<str>>,
    pub deadline: Option<NaiveDate>,
    pub description: Option<Arc<str>>,
    pub labels: Vec<Arc<str>>,

    pub parent_task_id: Option<Arc<str>>,
    pub parent_task_link: Option<Arc<str>>,
    pub child_tasks: Vec<Arc<str>>,
    pub has_children: bool,
    pub child_count: usize,

    pub external_url: Option<Arc<str>>,

    pub sync_flag: bool,
    pub sync_status: SyncStatus,
    pub pending_remote_id: Option<Arc<str>>,
    pub last_imported_fingerprint: Option<Arc<str>>,
    pub last_synced_fingerprint: Option<Arc<str>>,
    pub last_imported_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub complete_instances: Vec<NaiveDate>,
}

impl TaskNote {
    /// §4.5.1: qualifies for a pending local create.
    pub fn is_pending_local_create(&self) -> bool {
        self.sync_flag
            && self.remote_task_id.is_none()
            && self.pending_remote_id.is_none()
            && !self.task_title.trim().is_empty()
    }

    /// §4.5.2: qualifies for a pending local update.
    pub fn is_pending_local_update(&self) -> bool {
        self.sync_status == SyncStatus::DirtyLocal && self.remote_task_id.is_some()
    }

    /// Builds a record from a parsed frontmatter block (§9 "dynamic
    /// frontmatter bag", tolerant reads via [`Frontmatter::get_string`]).
    /// Missing/malformed fields fall back to safe defaults rather than
    /// erroring, so one corrupt note never blocks the rest of the run (§7).
    pub fn from_frontmatter(fm: &Frontmatter, path: Utf8PathBuf) -> Self {
        Self {
            path,
            vault_uuid: fm.get_string(&keys::VAULT_UUID).unwrap_or_default().into(),
            created: parse_datetime(fm.get_string(&keys::CREATED)).unwrap_or_else(Utc::now),
            modified: parse_datetime(fm.get_string(&keys::MODIFIED)).unwrap_or_else(Utc::now),
            tags: fm.get_list(&keys::TAGS).into_iter().map(Arc::from).collect(),
            task_title: fm.get_string(&keys::TASK_TITLE).unwrap_or_default().into(),
            task_status: fm
                .get_string(&keys::TASK_STATUS)
                .and_then(|s| TaskStatus::from_str(&s))
                .unwrap_or_default(),
            task_done: fm.get_bool(&keys::TASK_DONE),
            remote_task_id: fm.get_string(&keys::REMOTE_TASK_ID).map(Arc::from),
            remote_project_id: fm.get_string(&keys::REMOTE_PROJECT_ID).map(Arc::from),
            remote_section_id: fm.get_string(&keys::REMOTE_SECTION_ID).map(Arc::from),
            project_name: fm.get_string(&keys::PROJECT_NAME).map(Arc::from),
            section_name: fm.get_string(&keys::SECTION_NAME).map(Arc::from),
            project_link: fm.get_string(&keys::PROJECT_LINK).map(Arc::from),
            section_link: fm.get_string(&keys::SECTION_LINK).map(Arc::from),
            priority: fm.get_string(&keys::PRIORITY).and_then(|s| s.parse().ok()),
            priority_label: fm.get_string(&keys::PRIORITY_LABEL).map(Arc::from),
            due: Due {
                date: parse_date(fm.get_string(&keys::DUE_DATE)),
                string: fm.get_string(&keys::DUE_STRING).map(Arc::from),
            },
            is_recurring: fm.get_bool(&keys::IS_RECURRING),
            recurrence: fm.get_string(&keys::RECURRENCE).map(Arc::from),
            deadline: parse_date(fm.get_string(&keys::DEADLINE)),
            description: fm.get_string(&keys::DESCRIPTION).map(Arc::from),
            labels: fm.get_list(&keys::LABELS).into_iter().map(Arc::from).collect(),
            parent_task_id: fm.get_string(&keys::PARENT_TASK_ID).map(Arc::from),
            parent_task_link: fm.get_string(&keys::PARENT_TASK_LINK).map(Arc::from),
            child_tasks: fm.get_list(&keys::CHILD_TASKS).into_iter().map(Arc::from).collect(),
            has_children: fm.get_bool(&keys::HAS_CHILDREN),
            child_count: fm
                .get_string(&keys::CHILD_COUNT)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            external_url: fm.get_string(&keys::EXTERNAL_URL).map(Arc::from),
            sync_flag: fm.get_bool(&keys::SYNC_FLAG),
            sync_status: fm
                .get_string(&keys::SYNC_STATUS)
                .and_then(|s| SyncStatus::from_str(&s))
                .unwrap_or(SyncStatus::LocalOnly),
            pending_remote_id: fm.get_string(&keys::PENDING_REMOTE_ID).map(Arc::from),
            last_imported_fingerprint: fm.get_string(&keys::LAST_IMPORTED_FINGERPRINT).map(Arc::from),
            last_synced_fingerprint: fm.get_string(&keys::LAST_SYNCED_FINGERPRINT).map(Arc::from),
            last_imported_at: parse_datetime(fm.get_string(&keys::LAST_IMPORTED_AT)),
            is_deleted: fm.get_bool(&keys::IS_DELETED),
            complete_instances: fm
                .get_list(&keys::COMPLETE_INSTANCES)
                .into_iter()
                .filter_map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
                .collect(),
        }
    }

    /// Inverse of [`Self::from_frontmatter`]; always writes the canonical
    /// shape (§9 "serialization is strict").
    pub fn write_to_frontmatter(&self, fm: &mut Frontmatter) {
        fm.set_string(&keys::VAULT_UUID, &self.vault_uuid);
        fm.set_string(&keys::CREATED, &self.created.to_rfc3339());
        fm.set_string(&keys::MODIFIED, &self.modified.to_rfc3339());
        fm.set_list(&keys::TAGS, self.tags.iter().map(|t| t.to_string()));
        fm.set_string(&keys::TASK_TITLE, &self.task_title);
        fm.set_string(&keys::TASK_STATUS, self.task_status.as_str());
        fm.set_bool(&keys::TASK_DONE, self.task_done);
        set_opt_string(fm, &keys::REMOTE_TASK_ID, self.remote_task_id.as_deref());
        set_opt_string(fm, &keys::REMOTE_PROJECT_ID, self.remote_project_id.as_deref());
        set_opt_string(fm, &keys::REMOTE_SECTION_ID, self.remote_section_id.as_deref());
        set_opt_string(fm, &keys::PROJECT_NAME, self.project_name.as_deref());
        set_opt_string(fm, &keys::SECTION_NAME, self.section_name.as_deref());
        set_opt_string(fm, &keys::PROJECT_LINK, self.project_link.as_deref());
        set_opt_string(fm, &keys::SECTION_LINK, self.section_link.as_deref());
        match self.priority {
            Some(p) => fm.set_string(&keys::PRIORITY, &p.to_string()),
            None => fm.remove(&keys::PRIORITY),
        }
        set_opt_string(fm, &keys::PRIORITY_LABEL, self.priority_label.as_deref());
        match self.due.date {
            Some(d) => fm.set_string(&keys::DUE_DATE, &d.to_string()),
            None => fm.remove(&keys::DUE_DATE),
        }
        set_opt_string(fm, &keys::DUE_STRING, self.due.string.as_deref());
        fm.set_bool(&keys::IS_RECURRING, self.is_recurring);
        set_opt_string(fm, &keys::RECURRENCE, self.recurrence.as_deref());
        match self.deadline {
            Some(d) => fm.set_string(&keys::DEADLINE, &d.to_string()),
            None => fm.remove(&keys::DEADLINE),
        }
        set_opt_string(fm, &keys::DESCRIPTION, self.description.as_deref());
        fm.set_list(&keys::LABELS, self.labels.iter().map(|l| l.to_string()));
        set_opt_string(fm, &keys::PARENT_TASK_ID, self.parent_task_id.as_deref());
        set_opt_string(fm, &keys::PARENT_TASK_LINK, self.parent_task_link.as_deref());
        fm.set_list(&keys::CHILD_TASKS, self.child_tasks.iter().map(|c| c.to_string()));
        fm.set_bool(&keys::HAS_CHILDREN, self.has_children);
        fm.set_string(&keys::CHILD_COUNT, &self.child_count.to_string());
        set_opt_string(fm, &keys::EXTERNAL_URL, self.external_url.as_deref());
        fm.set_bool(&keys::SYNC_FLAG, self.sync_flag);
        fm.set_string(&keys::SYNC_STATUS, self.sync_status.as_str());
        set_opt_string(fm, &keys::PENDING_REMOTE_ID, self.pending_remote_id.as_deref());
        set_opt_string(
            fm,
            &keys::LAST_IMPORTED_FINGERPRINT,
            self.last_imported_fingerprint.as_deref(),
        );
        set_opt_string(
            fm,
            &keys::LAST_SYNCED_FINGERPRINT,
            self.last_synced_fingerprint.as_deref(),
        );
        match self.last_imported_at {
            Some(dt) => fm.set_string(&keys::LAST_IMPORTED_AT, &dt.to_rfc3339()),
            None => fm.remove(&keys::LAST_IMPORTED_AT),
        }
        fm.set_bool(&keys::IS_DELETED, self.is_deleted);
        fm.set_list(
            &keys::COMPLETE_INSTANCES,
            self.complete_instances.iter().map(|d| d.to_string()),
        );
    }
}

impl ProjectNote {
    pub fn from_frontmatter(fm: &Frontmatter, path: Utf8PathBuf) -> Self {
        Self {
            path,
            vault_uuid: fm.get_string(&keys::VAULT_UUID).unwrap_or_default().into(),
            created: parse_datetime(fm.get_string(&keys::CREATED)).unwrap_or_else(Utc::now),
            modified: parse_datetime(fm.get_string(&keys::MODIFIED)).unwrap_or_else(Utc::now),
            tags: fm.get_list(&keys::TAGS).into_iter().map(Arc::from).collect(),
            project_name: fm.get_string(&keys::PROJECT_NAME).unwrap_or_default().into(),
            remote_project_id: fm.get_string(&keys::REMOTE_PROJECT_ID).unwrap_or_default().into(),
            color: fm.get_string(&keys::COLOR).map(Arc::from),
            parent_project_id: fm.get_string(&keys::PARENT_PROJECT_ID).map(Arc::from),
            parent_project_name: fm.get_string(&keys::PARENT_PROJECT_NAME).map(Arc::from),
            parent_project_link: fm.get_string(&keys::PARENT_PROJECT_LINK).map(Arc::from),
            is_archived: fm.get_bool(&keys::IS_ARCHIVED),
            external_url: fm.get_string(&keys::EXTERNAL_URL).map(Arc::from),
        }
    }

    pub fn write_to_frontmatter(&self, fm: &mut Frontmatter) {
        fm.set_string(&keys::VAULT_UUID, &self.vault_uuid);
        fm.set_string(&keys::CREATED, &self.created.to_rfc3339());
        fm.set_string(&keys::MODIFIED, &self.modified.to_rfc3339());
        fm.set_list(&keys::TAGS, self.tags.iter().map(|t| t.to_string()));
        fm.set_string(&keys::PROJECT_NAME, &self.project_name);
        fm.set_string(&keys::REMOTE_PROJECT_ID, &self.remote_project_id);
        set_opt_string(fm, &keys::COLOR, self.color.as_deref());
        set_opt_string(fm, &keys::PARENT_PROJECT_ID, self.parent_project_id.as_deref());
        set_opt_string(fm, &keys::PARENT_PROJECT_NAME, self.parent_project_name.as_deref());
        set_opt_string(fm, &keys::PARENT_PROJECT_LINK, self.parent_project_link.as_deref());
        fm.set_bool(&keys::IS_ARCHIVED, self.is_archived);
        set_opt_string(fm, &keys::EXTERNAL_URL, self.external_url.as_deref());
    }
}

impl SectionNote {
    pub fn from_frontmatter(fm: &Frontmatter, path: Utf8PathBuf) -> Self {
        Self {
            path,
            vault_uuid: fm.get_string(&keys::VAULT_UUID).unwrap_or_default().into(),
            created: parse_datetime(fm.get_string(&keys::CREATED)).unwrap_or_else(Utc::now),
            modified: parse_datetime(fm.get_string(&keys::MODIFIED)).unwrap_or_else(Utc::now),
            tags: fm.get_list(&keys::TAGS).into_iter().map(Arc::from).collect(),
            section_name: fm.get_string(&keys::SECTION_NAME).unwrap_or_default().into(),
            remote_section_id: fm.get_string(&keys::REMOTE_SECTION_ID).unwrap_or_default().into(),
            project_name: fm.get_string(&keys::PROJECT_NAME).unwrap_or_default().into(),
            remote_project_id: fm.get_string(&keys::REMOTE_PROJECT_ID).unwrap_or_default().into(),
            project_link: fm.get_string(&keys::PROJECT_LINK).unwrap_or_default().into(),
            is_archived: fm.get_bool(&keys::IS_ARCHIVED),
            external_url: fm.get_string(&keys::EXTERNAL_URL).map(Arc::from),
        }
    }

    pub fn write_to_frontmatter(&self, fm: &mut Frontmatter) {
        fm.set_string(&keys::VAULT_UUID, &self.vault_uuid);
        fm.set_string(&keys::CREATED, &self.created.to_rfc3339());
        fm.set_string(&keys::MODIFIED, &self.modified.to_rfc3339());
        fm.set_list(&keys::TAGS, self.tags.iter().map(|t| t.to_string()));
        fm.set_string(&keys::SECTION_NAME, &self.section_name);
        fm.set_string(&keys::REMOTE_SECTION_ID, &self.remote_section_id);
        fm.set_string(&keys::PROJECT_NAME, &self.project_name);
        fm.set_string(&keys::REMOTE_PROJECT_ID, &self.remote_project_id);
        fm.set_string(&keys::PROJECT_LINK, &self.project_link);
        fm.set_bool(&keys::IS_ARCHIVED, self.is_archived);
        set_opt_string(fm, &keys::EXTERNAL_URL, self.external_url.as_deref());
    }
}

/// A managed ProjectNote (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNote {
    pub path: Utf8PathBuf,
    pub vault_uuid: Arc<str>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub tags: Vec<Arc<str>>,

    pub project_name: Arc<str>,
    pub remote_project_id: Arc<str>,
    pub color: Option<Arc<str>>,
    pub parent_project_id: Option<Arc<str>>,
    pub parent_project_name: Option<Arc<str>>,
    pub parent_project_link: Option<Arc<str>>,
    pub is_archived: bool,
    pub external_url: Option<Arc<str>>,
}

/// A managed SectionNote (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionNote {
    pub path: Utf8PathBuf,
    pub vault_uuid: Arc<str>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub tags: Vec<Arc<str>>,

    pub section_name: Arc<str>,
    pub remote_section_id: Arc<str>,
    pub project_name: Arc<str>,
    pub remote_project_id: Arc<str>,
    pub project_link: Arc<str>,
    pub is_archived: bool,
    pub external_url: Option<Arc<str>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips() {
        for s in [TaskStatus::Open, TaskStatus::Done] {
            assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn task_done_mirrors_status() {
        assert!(TaskStatus::Done.done());
        assert!(!TaskStatus::Open.done());
    }

    #[test]
    fn sync_status_terminal_states() {
        assert!(SyncStatus::ArchivedRemote.is_terminal());
        assert!(SyncStatus::DeletedRemote.is_terminal());
        assert!(!SyncStatus::Synced.is_terminal());
    }

    #[test]
    fn pending_local_create_requires_flag_and_empty_ids() {
        let mut note = sample_task();
        assert!(note.is_pending_local_create());
        note.remote_task_id = Some("A1".into());
        assert!(!note.is_pending_local_create());
    }

    fn sample_task() -> TaskNote {
        TaskNote {
            path: "Tasks/Buy milk.md".into(),
            vault_uuid: "11111111-1111-1111-1111-111111111111".into(),
            created: Utc::now(),
            modified: Utc::now(),
            tags: vec![],
            task_title: "Buy milk".into(),
            task_status: TaskStatus::Open,
            task_done: false,
            remote_task_id: None,
            remote_project_id: None,
            remote_section_id: None,
            project_name: None,
            section_name: None,
            project_link: None,
            section_link: None,
            priority: None,
            priority_label: None,
            due: Due::default(),
            is_recurring: false,
            recurrence: None,
            deadline: None,
            description: None,
            labels: vec![],
            parent_task_id: None,
            parent_task_link: None,
            child_tasks: vec![],
            has_children: false,
            child_count: 0,
            external_url: None,
            sync_flag: true,
            sync_status: SyncStatus::QueuedLocalCreate,
            pending_remote_id: None,
            last_imported_fingerprint: None,
            last_synced_fingerprint: None,
            last_imported_at: None,
            is_deleted: false,
            complete_instances: vec![],
        }
    }
}
