//! Single-pass vault scan producing the four ID-keyed lookup maps the
//! reconciler depends on (§4.4). Lookups into these maps are always by ID,
//! never by path — a renamed or moved file is still found.

use std::collections::{HashMap, HashSet};

use camino::Utf8PathBuf;

use crate::error::Error;
use crate::frontmatter::keys;
use crate::vault::VaultFileSystem;

/// The result of one full vault scan (§4.4).
#[derive(Debug, Clone, Default)]
pub struct VaultIndex {
    pub tasks_by_remote_id: HashMap<String, Utf8PathBuf>,
    pub projects_by_remote_id: HashMap<String, Utf8PathBuf>,
    pub sections_by_remote_id: HashMap<String, Utf8PathBuf>,
    pub by_vault_uuid: HashMap<String, Utf8PathBuf>,
    /// Task IDs seen more than once; first-seen wins the entry above (I1).
    pub duplicate_task_ids: HashSet<String>,
}

impl VaultIndex {
    pub fn task_path(&self, remote_task_id: &str) -> Option<&Utf8PathBuf> {
        self.tasks_by_remote_id.get(remote_task_id)
    }

    pub fn project_path(&self, remote_project_id: &str) -> Option<&Utf8PathBuf> {
        self.projects_by_remote_id.get(remote_project_id)
    }

    pub fn section_path(&self, remote_section_id: &str) -> Option<&Utf8PathBuf> {
        self.sections_by_remote_id.get(remote_section_id)
    }
}

/// Scans every managed file once and classifies it (§4.4). A file carrying
/// `remote_task_id` is a task note even if it also carries
/// `remote_project_id`/`remote_section_id` for its own back-links; a file
/// carrying `remote_section_id` (and no task ID) is a section note even
/// though it stores its owning `remote_project_id` too (I6).
pub async fn build(vault: &dyn VaultFileSystem) -> Result<VaultIndex, Error> {
    let mut index = VaultIndex::default();

    for path in vault.list_managed_files().await? {
        let Some(fm) = vault.read_frontmatter_cached(&path).await? else {
            continue;
        };

        if let Some(uuid) = fm.get_string(&keys::VAULT_UUID) {
            index.by_vault_uuid.entry(uuid).or_insert_with(|| path.clone());
        }

        if let Some(task_id) = fm.get_string(&keys::REMOTE_TASK_ID) {
            if index.tasks_by_remote_id.contains_key(&task_id) {
                log::warn!("duplicate remote_task_id '{task_id}' found at '{path}'; keeping first-seen entry");
                index.duplicate_task_ids.insert(task_id);
            } else {
                index.tasks_by_remote_id.insert(task_id, path.clone());
            }
            continue;
        }

        if let Some(section_id) = fm.get_string(&keys::REMOTE_SECTION_ID) {
            index
                .sections_by_remote_id
                .entry(section_id)
                .or_insert_with(|| path.clone());
            continue;
        }

        if let Some(project_id) = fm.get_string(&keys::REMOTE_PROJECT_ID) {
            index
                .projects_by_remote_id
                .entry(project_id)
                .or_insert_with(|| path.clone());
        }
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::InMemoryVault;
    use camino::Utf8Path;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn classifies_by_which_ids_are_present() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Tasks/t.md"), "---\nremote_task_id: A1\n---\n")
            .await
            .unwrap();
        vault
            .create_file(
                Utf8Path::new("Tasks/s.md"),
                "---\nremote_section_id: S1\nremote_project_id: P1\n---\n",
            )
            .await
            .unwrap();
        vault
            .create_file(Utf8Path::new("Tasks/p.md"), "---\nremote_project_id: P1\n---\n")
            .await
            .unwrap();

        let index = build(&vault).await.unwrap();
        assert_eq!(index.task_path("A1"), Some(&Utf8PathBuf::from("Tasks/t.md")));
        assert_eq!(index.section_path("S1"), Some(&Utf8PathBuf::from("Tasks/s.md")));
        assert_eq!(index.project_path("P1"), Some(&Utf8PathBuf::from("Tasks/p.md")));
    }

    #[tokio::test]
    async fn duplicate_task_id_keeps_first_seen_only() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Tasks/a.md"), "---\nremote_task_id: A4\n---\n")
            .await
            .unwrap();
        vault
            .create_file(Utf8Path::new("Tasks/b.md"), "---\nremote_task_id: A4\n---\n")
            .await
            .unwrap();

        let index = build(&vault).await.unwrap();
        assert_eq!(index.task_path("A4"), Some(&Utf8PathBuf::from("Tasks/a.md")));
        assert!(index.duplicate_task_ids.contains("A4"));
    }

    #[tokio::test]
    async fn vault_uuid_indexed_regardless_of_note_type() {
        let vault = InMemoryVault::new();
        vault
            .create_file(
                Utf8Path::new("Tasks/t.md"),
                "---\nremote_task_id: A1\nvault_uuid: u-1\n---\n",
            )
            .await
            .unwrap();
        let index = build(&vault).await.unwrap();
        assert_eq!(index.by_vault_uuid.get("u-1"), Some(&Utf8PathBuf::from("Tasks/t.md")));
    }
}
