//! The vault-file-system collaborator contract (§6). The production
//! implementation (talking to the user's real Markdown vault, with a
//! metadata cache) is out of scope (§1); this module defines the trait the
//! reconciler depends on, a guaranteed read-modify-write helper, and an
//! in-memory test double.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};

use crate::error::Error;
use crate::frontmatter::{keys, Frontmatter};

/// The collaborator contract the reconciler depends on (§6).
#[async_trait]
pub trait VaultFileSystem: Send + Sync {
    /// Every file whose cached frontmatter carries at least one of
    /// `remote_task_id`, `remote_project_id`, `remote_section_id` (the
    /// "managed note" definition in the glossary).
    async fn list_managed_files(&self) -> Result<Vec<Utf8PathBuf>, Error>;

    /// Every file under the active tasks folder, managed or not (§4.5.1:
    /// pending-local-create discovery needs notes with none of the three
    /// remote IDs yet, which `list_managed_files` excludes by definition).
    async fn list_all_files(&self) -> Result<Vec<Utf8PathBuf>, Error>;

    /// Cached frontmatter read, used by [`crate::vault_index::VaultIndex`]
    /// building — may be a run-start snapshot.
    async fn read_frontmatter_cached(&self, path: &Utf8Path) -> Result<Option<Frontmatter>, Error>;

    /// Always reads the live file, never a cache (§5's read-modify-write
    /// requirement).
    async fn read_text(&self, path: &Utf8Path) -> Result<String, Error>;

    async fn write_text(&self, path: &Utf8Path, text: &str) -> Result<(), Error>;

    async fn create_file(&self, path: &Utf8Path, text: &str) -> Result<(), Error>;

    async fn exists(&self, path: &Utf8Path) -> Result<bool, Error>;

    async fn rename_file(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), Error>;

    async fn move_folder(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), Error>;

    /// Recoverable move-to-trash (§6).
    async fn trash(&self, path: &Utf8Path) -> Result<(), Error>;

    /// Idempotent: creates all intermediate segments (§6).
    async fn ensure_folder(&self, path: &Utf8Path) -> Result<(), Error>;
}

/// Read-modify-write against the live file, with the write-back always
/// attempted regardless of whether `f` succeeds (§5, §6
/// `process_frontmatter`). A write failure takes priority in the returned
/// error over a failure from `f`, since an in-memory-only mutation that
/// never reached disk is the more serious problem.
pub async fn process_frontmatter<F>(
    vault: &dyn VaultFileSystem,
    path: &Utf8Path,
    f: F,
) -> Result<(), Error>
where
    F: FnOnce(&mut Frontmatter) -> Result<(), Error>,
{
    let text = vault.read_text(path).await?;
    let (fm, body) = Frontmatter::parse(&text);
    let mut fm = fm.unwrap_or_default();
    let outcome = f(&mut fm);
    let rendered = fm.render(&body);
    vault.write_text(path, &rendered).await?;
    outcome
}

fn is_managed(fm: &Frontmatter) -> bool {
    fm.has_any(&[
        &keys::REMOTE_TASK_ID,
        &keys::REMOTE_PROJECT_ID,
        &keys::REMOTE_SECTION_ID,
    ])
}

/// An in-memory vault used by the reconciler's test suite. Every "file" is
/// just an entry in a `path -> text` map guarded by a [`Mutex`]; there is no
/// real cache distinct from the live store, since tests only need
/// correctness of the read-modify-write contract, not a performance model.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    files: Mutex<BTreeMap<Utf8PathBuf, String>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: HashMap<Utf8PathBuf, String>) -> Self {
        Self {
            files: Mutex::new(files.into_iter().collect()),
        }
    }

    /// Test helper: snapshot every stored file, for asserting on end states.
    pub fn snapshot(&self) -> BTreeMap<Utf8PathBuf, String> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl VaultFileSystem for InMemoryVault {
    async fn list_managed_files(&self) -> Result<Vec<Utf8PathBuf>, Error> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter_map(|(path, text)| {
                let (fm, _) = Frontmatter::parse(text);
                fm.filter(is_managed).map(|_| path.clone())
            })
            .collect())
    }

    async fn list_all_files(&self) -> Result<Vec<Utf8PathBuf>, Error> {
        let files = self.files.lock().unwrap();
        Ok(files.keys().cloned().collect())
    }

    async fn read_frontmatter_cached(&self, path: &Utf8Path) -> Result<Option<Frontmatter>, Error> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(text) => Ok(Frontmatter::parse(text).0),
            None => Ok(None),
        }
    }

    async fn read_text(&self, path: &Utf8Path) -> Result<String, Error> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound { what: path.to_string() })
    }

    async fn write_text(&self, path: &Utf8Path, text: &str) -> Result<(), Error> {
        let mut files = self.files.lock().unwrap();
        files.insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    async fn create_file(&self, path: &Utf8Path, text: &str) -> Result<(), Error> {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Err(Error::PathConflict {
                path: path.to_string(),
            });
        }
        files.insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    async fn exists(&self, path: &Utf8Path) -> Result<bool, Error> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn rename_file(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), Error> {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(to) {
            return Err(Error::PathConflict { path: to.to_string() });
        }
        let text = files
            .remove(from)
            .ok_or_else(|| Error::NotFound { what: from.to_string() })?;
        files.insert(to.to_path_buf(), text);
        Ok(())
    }

    async fn move_folder(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), Error> {
        let mut files = self.files.lock().unwrap();
        let moving: Vec<Utf8PathBuf> = files
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        let mut replacements = Vec::new();
        for old_path in &moving {
            let suffix = old_path.strip_prefix(from).unwrap_or(old_path);
            let mut new_path = to.to_path_buf();
            new_path.push(suffix);
            if files.contains_key(&new_path) {
                return Err(Error::PathConflict {
                    path: new_path.to_string(),
                });
            }
            replacements.push((old_path.clone(), new_path));
        }
        for (old_path, new_path) in replacements {
            if let Some(text) = files.remove(&old_path) {
                files.insert(new_path, text);
            }
        }
        Ok(())
    }

    async fn trash(&self, path: &Utf8Path) -> Result<(), Error> {
        let mut files = self.files.lock().unwrap();
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound { what: path.to_string() })
    }

    async fn ensure_folder(&self, _path: &Utf8Path) -> Result<(), Error> {
        // folders are implicit in the flat path map
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_frontmatter_writes_back_on_success() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Tasks/a.md"), "---\nfoo: bar\n---\nbody\n")
            .await
            .unwrap();
        process_frontmatter(&vault, Utf8Path::new("Tasks/a.md"), |fm| {
            fm.set_string(&keys::TASK_TITLE, "Buy milk");
            Ok(())
        })
        .await
        .unwrap();
        let text = vault.read_text(Utf8Path::new("Tasks/a.md")).await.unwrap();
        assert!(text.contains("task_title: Buy milk"));
        assert!(text.ends_with("body\n"));
    }

    #[tokio::test]
    async fn process_frontmatter_still_writes_back_when_closure_errors() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Tasks/a.md"), "---\nfoo: bar\n---\nbody\n")
            .await
            .unwrap();
        let result = process_frontmatter(&vault, Utf8Path::new("Tasks/a.md"), |fm| {
            fm.set_string(&keys::TASK_TITLE, "Buy milk");
            Err(Error::Parse)
        })
        .await;
        assert!(result.is_err());
        let text = vault.read_text(Utf8Path::new("Tasks/a.md")).await.unwrap();
        assert!(text.contains("task_title: Buy milk"));
    }

    #[tokio::test]
    async fn list_managed_files_filters_by_ids() {
        let vault = InMemoryVault::new();
        vault
            .create_file(
                Utf8Path::new("Tasks/managed.md"),
                "---\nremote_task_id: A1\n---\n",
            )
            .await
            .unwrap();
        vault
            .create_file(Utf8Path::new("Tasks/unmanaged.md"), "---\nfoo: bar\n---\n")
            .await
            .unwrap();
        let managed = vault.list_managed_files().await.unwrap();
        assert_eq!(managed, vec![Utf8PathBuf::from("Tasks/managed.md")]);
    }

    #[tokio::test]
    async fn move_folder_relocates_all_contained_files() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Tasks/Home/a.md"), "a")
            .await
            .unwrap();
        vault
            .create_file(Utf8Path::new("Tasks/Home/b.md"), "b")
            .await
            .unwrap();
        vault
            .move_folder(Utf8Path::new("Tasks/Home"), Utf8Path::new("Tasks/Household"))
            .await
            .unwrap();
        assert!(vault.exists(Utf8Path::new("Tasks/Household/a.md")).await.unwrap());
        assert!(vault.exists(Utf8Path::new("Tasks/Household/b.md")).await.unwrap());
        assert!(!vault.exists(Utf8Path::new("Tasks/Home/a.md")).await.unwrap());
    }
}
