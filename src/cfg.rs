use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use figment::{
    providers::{Env, Format, Json, Serialized, Yaml},
    Figment,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveConfig;
use crate::error::{Error, WrapError};
use crate::path_policy::TaskPathConfig;
use crate::reconciler::{ConflictPolicy, ImportableFilter, MissingRemoteMode, MissingRemotePolicy, ReconcilerConfig};

pub static CFG: Lazy<Config> = Lazy::new(|| Config::load().during("reading config").unwrap());
static BASE_DIRS: Lazy<BaseDirs> = Lazy::new(|| BaseDirs::new().expect("failed to get base dirs"));

/// On-disk configuration (§1.1, §9). Every field here is a plain
/// serde-friendly value; [`Config::reconciler_config`] is where the domain
/// types the reconciler actually consumes (`ConflictPolicy`,
/// `MissingRemoteMode`, ...) get assembled from them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub base_folder: Utf8PathBuf,
    pub use_project_subfolders: bool,
    pub use_section_subfolders: bool,
    pub auto_rename_files: bool,

    pub project_archive_folder: Utf8PathBuf,
    pub section_archive_folder: Option<Utf8PathBuf>,

    /// `"local_wins"` or `"remote_wins"` (§4.5.5).
    pub conflict_policy: String,

    /// `"keep_in_place"`, `"move_to_folder"`, or `"stop_syncing"` (§4.5.7).
    pub completed_mode: String,
    pub completed_folder: Option<Utf8PathBuf>,
    pub deleted_mode: String,
    pub deleted_folder: Option<Utf8PathBuf>,

    pub assigned_to_uid: Option<String>,
    pub required_label: Option<String>,
    pub excluded_labels: Vec<String>,
    pub allowed_project_names: Option<Vec<String>>,
    pub excluded_project_names: Vec<String>,
    pub excluded_section_names: Vec<String>,

    pub recently_deleted_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_folder: "Tasks".into(),
            use_project_subfolders: true,
            use_section_subfolders: false,
            auto_rename_files: true,
            project_archive_folder: "Tasks/Archive".into(),
            section_archive_folder: None,
            conflict_policy: "local_wins".into(),
            completed_mode: "keep_in_place".into(),
            completed_folder: None,
            deleted_mode: "keep_in_place".into(),
            deleted_folder: None,
            assigned_to_uid: None,
            required_label: None,
            excluded_labels: Vec::new(),
            allowed_project_names: None,
            excluded_project_names: Vec::new(),
            excluded_section_names: Vec::new(),
            recently_deleted_limit: 200,
        }
    }
}

const ERR_INVALID_UTF8: &str = "default path contains non-UTF8";

const DIR: &str = "vault-task-sync";

fn config_dir() -> Utf8PathBuf {
    Utf8Path::from_path(BASE_DIRS.config_dir())
        .expect(ERR_INVALID_UTF8)
        .to_owned()
        .join(DIR)
}

fn config_name() -> Utf8PathBuf {
    config_dir().join("config.yaml")
}

fn config_fallback_name() -> Utf8PathBuf {
    config_dir().join("config-fallback.json")
}

fn parse_missing_remote_mode(s: &str) -> MissingRemoteMode {
    match s {
        "move_to_folder" => MissingRemoteMode::MoveToFolder,
        "stop_syncing" => MissingRemoteMode::StopSyncing,
        _ => MissingRemoteMode::KeepInPlace,
    }
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        Ok(Figment::new()
            .merge(Yaml::file(config_name()))
            .merge(Env::prefixed("VAULT_TASK_SYNC_"))
            .join(Json::file(config_fallback_name()))
            .join(Serialized::defaults(Config::default()))
            .extract()?)
    }

    /// Assembles the reconciler's policy/config types from the raw,
    /// serde-friendly fields above.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            task_path: TaskPathConfig {
                base_folder: self.base_folder.clone(),
                use_project_subfolders: self.use_project_subfolders,
                use_section_subfolders: self.use_section_subfolders,
            },
            archive: ArchiveConfig {
                project_archive_folder: self.project_archive_folder.clone(),
                section_archive_folder: self.section_archive_folder.clone(),
            },
            conflict_policy: if self.conflict_policy == "remote_wins" {
                ConflictPolicy::RemoteWins
            } else {
                ConflictPolicy::LocalWins
            },
            missing_remote: MissingRemotePolicy {
                completed_mode: parse_missing_remote_mode(&self.completed_mode),
                completed_folder: self.completed_folder.clone(),
                deleted_mode: parse_missing_remote_mode(&self.deleted_mode),
                deleted_folder: self.deleted_folder.clone(),
            },
            importable: ImportableFilter {
                assigned_to_uid: self.assigned_to_uid.clone(),
                required_label: self.required_label.clone(),
                excluded_labels: self.excluded_labels.iter().cloned().collect(),
                allowed_project_names: self
                    .allowed_project_names
                    .as_ref()
                    .map(|v| v.iter().cloned().collect()),
                excluded_project_names: self.excluded_project_names.iter().cloned().collect(),
                excluded_section_names: self.excluded_section_names.iter().cloned().collect(),
            },
            auto_rename_files: self.auto_rename_files,
            recently_deleted_limit: self.recently_deleted_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_conflict_policy_is_local_wins() {
        let cfg = Config::default();
        assert_eq!(cfg.reconciler_config().conflict_policy, ConflictPolicy::LocalWins);
    }

    #[test]
    fn unrecognized_missing_remote_mode_falls_back_to_keep_in_place() {
        let mut cfg = Config::default();
        cfg.completed_mode = "bogus".into();
        assert_eq!(
            cfg.reconciler_config().missing_remote.completed_mode,
            MissingRemoteMode::KeepInPlace
        );
    }
}
