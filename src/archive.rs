//! Archive/unarchive file mover (§4.5.8). Moves project/section/task files
//! between active and archive folders on remote `is_archived` transitions,
//! using the same collision-safe allocator as relocation (§4.5.6).

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::Error;
use crate::path_policy::allocate_unique_path;
use crate::vault::VaultFileSystem;

/// Where archived project/section notes are filed (§4.5.8). Both fields
/// fall back to `project_archive_folder` when a dedicated section archive
/// isn't configured.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub project_archive_folder: Utf8PathBuf,
    pub section_archive_folder: Option<Utf8PathBuf>,
}

impl ArchiveConfig {
    fn section_folder(&self) -> &Utf8Path {
        self.section_archive_folder
            .as_deref()
            .unwrap_or(&self.project_archive_folder)
    }
}

/// Moves `current_path` (a file, identified by `disambiguator` — the
/// owning remote ID) into `target_folder`, keeping its file name, resolving
/// collisions with a different file by appending a numeric suffix.
async fn move_into_folder(
    vault: &dyn VaultFileSystem,
    current_path: &Utf8Path,
    target_folder: &Utf8Path,
    disambiguator: &str,
) -> Result<Utf8PathBuf, Error> {
    let file_name = current_path.file_name().unwrap_or("untitled.md");
    let mut desired = target_folder.to_path_buf();
    desired.push(file_name);

    if desired == current_path {
        return Ok(desired);
    }

    vault.ensure_folder(target_folder).await?;

    let mut occupied_by_other = Vec::new();
    for candidate in [&desired] {
        if vault.exists(candidate).await? && candidate.as_path() != current_path {
            occupied_by_other.push(candidate.clone());
        }
    }
    let final_path = allocate_unique_path(&desired, disambiguator, |p| {
        occupied_by_other.iter().any(|o| o == p)
    });

    vault.rename_file(current_path, &final_path).await?;
    Ok(final_path)
}

/// Archives a project note (§4.5.8): moves it to the configured project
/// archive folder.
pub async fn archive_project(
    vault: &dyn VaultFileSystem,
    current_path: &Utf8Path,
    remote_project_id: &str,
    config: &ArchiveConfig,
) -> Result<Utf8PathBuf, Error> {
    move_into_folder(vault, current_path, &config.project_archive_folder, remote_project_id).await
}

/// Archives a section note (§4.5.8).
pub async fn archive_section(
    vault: &dyn VaultFileSystem,
    current_path: &Utf8Path,
    remote_section_id: &str,
    config: &ArchiveConfig,
) -> Result<Utf8PathBuf, Error> {
    move_into_folder(vault, current_path, config.section_folder(), remote_section_id).await
}

/// Unarchives a note back to its freshly computed active path (§4.5.8).
/// The engine never attempts to reconstruct the pre-archive path; `active_path`
/// is whatever PathPolicy computes from current name/parent relationships.
pub async fn unarchive_to(
    vault: &dyn VaultFileSystem,
    current_path: &Utf8Path,
    active_path: &Utf8PathBuf,
    disambiguator: &str,
) -> Result<Utf8PathBuf, Error> {
    if active_path.as_path() == current_path {
        return Ok(active_path.clone());
    }
    if let Some(parent) = active_path.parent() {
        vault.ensure_folder(parent).await?;
    }
    let mut occupied_by_other = Vec::new();
    if vault.exists(active_path).await? && active_path.as_path() != current_path {
        occupied_by_other.push(active_path.clone());
    }
    let final_path = allocate_unique_path(active_path, disambiguator, |p| {
        occupied_by_other.iter().any(|o| o == p)
    });
    vault.rename_file(current_path, &final_path).await?;
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::InMemoryVault;
    use pretty_assertions::assert_eq;

    fn config() -> ArchiveConfig {
        ArchiveConfig {
            project_archive_folder: "Archive/Projects".into(),
            section_archive_folder: None,
        }
    }

    #[tokio::test]
    async fn archive_project_moves_file_keeping_name() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Tasks/Personal/_.md"), "x")
            .await
            .unwrap();
        let new_path = archive_project(&vault, Utf8Path::new("Tasks/Personal/_.md"), "P1", &config())
            .await
            .unwrap();
        assert_eq!(new_path, Utf8PathBuf::from("Archive/Projects/_.md"));
        assert!(!vault.exists(Utf8Path::new("Tasks/Personal/_.md")).await.unwrap());
    }

    #[tokio::test]
    async fn archive_section_falls_back_to_project_archive_folder() {
        let vault = InMemoryVault::new();
        vault.create_file(Utf8Path::new("Tasks/S.md"), "x").await.unwrap();
        let new_path = archive_section(&vault, Utf8Path::new("Tasks/S.md"), "S1", &config())
            .await
            .unwrap();
        assert_eq!(new_path, Utf8PathBuf::from("Archive/Projects/S.md"));
    }

    #[tokio::test]
    async fn unarchive_resolves_collision_with_numeric_suffix() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Archive/Projects/_.md"), "archived")
            .await
            .unwrap();
        vault
            .create_file(Utf8Path::new("Tasks/Personal/_.md"), "already here")
            .await
            .unwrap();
        let active = Utf8PathBuf::from("Tasks/Personal/_.md");
        let new_path = unarchive_to(&vault, Utf8Path::new("Archive/Projects/_.md"), &active, "P1")
            .await
            .unwrap();
        assert_ne!(new_path, active);
        assert!(vault.exists(&new_path).await.unwrap());
    }
}
