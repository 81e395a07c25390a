//! Change-detection signatures (§4.1). Deterministic FNV-1a over a canonical
//! JSON projection of a fixed field list; two variants. Pure — never touches
//! the file system, never fails.

use serde_json::Value;

use crate::model::TaskNote;

/// Which field projection to hash (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Fields the remote owns.
    RemoteImport,
    /// Fields the local side pushes.
    LocalSync,
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn trimmed(s: Option<&str>) -> Value {
    Value::String(s.unwrap_or("").trim().to_string())
}

fn bool01(b: bool) -> Value {
    Value::Number((b as u8).into())
}

fn labels(labels: &[std::sync::Arc<str>]) -> Value {
    Value::String(labels.join("|"))
}

/// Builds the canonical JSON array for the remote-import projection (§4.1).
fn remote_import_fields(task: &TaskNote) -> Vec<Value> {
    vec![
        trimmed(Some(&task.task_title)),
        trimmed(task.description.as_deref()),
        bool01(task.task_done),
        trimmed(task.remote_project_id.as_deref()),
        trimmed(task.project_name.as_deref()),
        trimmed(task.remote_section_id.as_deref()),
        trimmed(task.section_name.as_deref()),
        task.priority
            .map(|p| Value::Number(p.into()))
            .unwrap_or(Value::Null),
        task.due
            .date
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        trimmed(task.due.string.as_deref()),
        bool01(task.is_recurring),
        trimmed(task.parent_task_id.as_deref()),
        labels(&task.labels),
        task.deadline
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
    ]
}

/// Builds the canonical JSON array for the local-sync projection (§4.1).
fn local_sync_fields(task: &TaskNote) -> Vec<Value> {
    vec![
        trimmed(Some(&task.task_title)),
        trimmed(task.description.as_deref()),
        bool01(task.task_done),
        bool01(task.is_recurring),
        trimmed(task.remote_project_id.as_deref()),
        trimmed(task.remote_section_id.as_deref()),
        task.due
            .date
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        trimmed(task.due.string.as_deref()),
    ]
}

/// Computes the 8-hex-digit stable fingerprint of `task` for `variant`.
pub fn fingerprint(task: &TaskNote, variant: Variant) -> String {
    let fields = match variant {
        Variant::RemoteImport => remote_import_fields(task),
        Variant::LocalSync => local_sync_fields(task),
    };
    let canonical =
        serde_json::to_string(&Value::Array(fields)).expect("canonical fields always serialize");
    format!("{:08x}", fnv1a_32(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Due, SyncStatus, TaskStatus};
    use pretty_assertions::assert_eq;

    fn base_task() -> TaskNote {
        TaskNote {
            path: "Tasks/t.md".into(),
            vault_uuid: "u".into(),
            created: chrono::Utc::now(),
            modified: chrono::Utc::now(),
            tags: vec![],
            task_title: "Buy milk".into(),
            task_status: TaskStatus::Open,
            task_done: false,
            remote_task_id: Some("A1".into()),
            remote_project_id: Some("P1".into()),
            remote_section_id: None,
            project_name: Some("Personal".into()),
            section_name: None,
            project_link: None,
            section_link: None,
            priority: Some(1),
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
            sync_status: SyncStatus::Synced,
            pending_remote_id: None,
            last_imported_fingerprint: None,
            last_synced_fingerprint: None,
            last_imported_at: None,
            is_deleted: false,
            complete_instances: vec![],
        }
    }

    #[test]
    fn is_8_hex_chars() {
        let fp = fingerprint(&base_task(), Variant::RemoteImport);
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fp.to_lowercase());
    }

    #[test]
    fn deterministic_across_calls() {
        let task = base_task();
        assert_eq!(
            fingerprint(&task, Variant::RemoteImport),
            fingerprint(&task, Variant::RemoteImport)
        );
    }

    #[test]
    fn changes_when_title_changes() {
        let mut task = base_task();
        let before = fingerprint(&task, Variant::RemoteImport);
        task.task_title = "Buy oat milk".into();
        let after = fingerprint(&task, Variant::RemoteImport);
        assert_ne!(before, after);
    }

    #[test]
    fn variants_are_independent() {
        let task = base_task();
        // remote-import hashes project_name, local-sync does not: changing
        // project_name alone must not move the local-sync fingerprint.
        let local_before = fingerprint(&task, Variant::LocalSync);
        let mut task2 = task.clone();
        task2.project_name = Some("Work".into());
        let local_after = fingerprint(&task2, Variant::LocalSync);
        assert_eq!(local_before, local_after);

        let remote_before = fingerprint(&task, Variant::RemoteImport);
        let remote_after = fingerprint(&task2, Variant::RemoteImport);
        assert_ne!(remote_before, remote_after);
    }

    #[test]
    fn trims_string_fields() {
        let mut a = base_task();
        let mut b = base_task();
        a.task_title = "Buy milk".into();
        b.task_title = "  Buy milk  ".into();
        assert_eq!(
            fingerprint(&a, Variant::RemoteImport),
            fingerprint(&b, Variant::RemoteImport)
        );
    }

    #[test]
    fn absent_optional_fields_equal_empty_string() {
        let mut a = base_task();
        let mut b = base_task();
        a.description = None;
        b.description = Some("".into());
        assert_eq!(
            fingerprint(&a, Variant::RemoteImport),
            fingerprint(&b, Variant::RemoteImport)
        );
    }
}
