//! The orchestrator (§4.5, §2 "control flow on each run"). Consumes a
//! [`RemoteSnapshot`], drives push-then-pull, performs upserts, emits
//! renames, applies parent/child back-links, and handles archive
//! transitions. Every dependency (remote client, vault, template resolver,
//! policy) is taken as an explicit argument — there is no global mutable
//! state (§9).

use std::collections::{HashMap, HashSet};

use camino::Utf8PathBuf;
use chrono::Utc;
use console::Style;
use once_cell::sync::Lazy;

use crate::error::Error;
use crate::fingerprint::{self, Variant};
use crate::frontmatter::{keys, repair_signature_lines};
use crate::model::{Due, ProjectNote, SectionNote, SyncStatus, TaskNote, TaskStatus};
use crate::path_policy::{
    self, allocate_unique_path, disambiguated_project_segment, disambiguated_section_segment,
    task_file_path, topological_order, TaskPathConfig,
};
use crate::remote::{CreateTaskPayload, Clearable, RemoteClient, RemoteItem, RemoteSnapshot, UpdateTaskPatch};
use crate::template::{PlainTemplateResolver, ProjectTokens, SectionTokens, TaskTokens, TemplateResolver, TokenContext};
use crate::vault::{process_frontmatter, VaultFileSystem};
use crate::vault_index::VaultIndex;
use crate::archive::{self, ArchiveConfig};

const PROJECT_NOTE_FILE: &str = "_Project.md";
const SECTION_NOTE_FILE: &str = "_Section.md";

/// Whether a local edit wins over a conflicting remote change, or vice
/// versa (§4.5.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    LocalWins,
    RemoteWins,
}

/// The three actions the §4.5.7 policy table allows per missing-remote
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRemoteMode {
    KeepInPlace,
    MoveToFolder,
    /// Only meaningful for the `deleted` row (§4.5.7): drops
    /// `remote_task_id` so the note becomes local-only.
    StopSyncing,
}

#[derive(Debug, Clone)]
pub struct MissingRemotePolicy {
    pub completed_mode: MissingRemoteMode,
    pub completed_folder: Option<Utf8PathBuf>,
    pub deleted_mode: MissingRemoteMode,
    pub deleted_folder: Option<Utf8PathBuf>,
}

/// The auto-import filter (§4.5.3). `None` in an allow-list means "no
/// restriction"; entries in an exclude-set always veto.
#[derive(Debug, Clone, Default)]
pub struct ImportableFilter {
    pub assigned_to_uid: Option<String>,
    pub required_label: Option<String>,
    pub excluded_labels: HashSet<String>,
    pub allowed_project_names: Option<HashSet<String>>,
    pub excluded_project_names: HashSet<String>,
    pub excluded_section_names: HashSet<String>,
}

impl ImportableFilter {
    fn is_importable(&self, item: &RemoteItem, project_name: Option<&str>, section_name: Option<&str>) -> bool {
        if let (Some(uid), Some(responsible)) = (&self.assigned_to_uid, &item.responsible_uid) {
            if uid != responsible {
                return false;
            }
        }
        if let Some(required) = &self.required_label {
            if !item.labels.iter().any(|l| l == required) {
                return false;
            }
        }
        if item.labels.iter().any(|l| self.excluded_labels.contains(l)) {
            return false;
        }
        if let Some(allowed) = &self.allowed_project_names {
            if !project_name.map(|n| allowed.contains(n)).unwrap_or(false) {
                return false;
            }
        }
        if project_name.map(|n| self.excluded_project_names.contains(n)).unwrap_or(false) {
            return false;
        }
        if section_name.map(|n| self.excluded_section_names.contains(n)).unwrap_or(false) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub task_path: TaskPathConfig,
    pub archive: ArchiveConfig,
    pub conflict_policy: ConflictPolicy,
    pub missing_remote: MissingRemotePolicy,
    pub importable: ImportableFilter,
    pub auto_rename_files: bool,
    pub recently_deleted_limit: usize,
}

/// Per-run counters, matching the teacher's `SyncStats`/`Diff` pattern in
/// `sync.rs` (§4.7).
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub projects_ensured: usize,
    pub sections_ensured: usize,
    pub missing_handled: usize,
    pub archived: usize,
    pub unarchived: usize,
    pub errored: usize,
    pub duplicate_task_ids: Vec<String>,
    pub cycles_detected: bool,
}

static STYLE_NEW: Lazy<Style> = Lazy::new(|| Style::new().cyan());
static STYLE_UPDATE: Lazy<Style> = Lazy::new(|| Style::new().yellow());
static STYLE_WARN: Lazy<Style> = Lazy::new(|| Style::new().red().bold());

impl RunSummary {
    pub fn any_change(&self) -> bool {
        self.created + self.updated + self.missing_handled + self.archived + self.unarchived > 0
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{created} created, {updated} updated, {missing} missing-handled, {archived} archived, {unarchived} unarchived, {errored} errored",
            created = STYLE_NEW.apply_to(self.created),
            updated = STYLE_UPDATE.apply_to(self.updated),
            missing = STYLE_UPDATE.apply_to(self.missing_handled),
            archived = self.archived,
            unarchived = self.unarchived,
            errored = STYLE_WARN.apply_to(self.errored),
        )?;
        if !self.duplicate_task_ids.is_empty() {
            write!(
                f,
                " — {}",
                STYLE_WARN.apply_to(format!(
                    "duplicate remote_task_id(s): {}",
                    self.duplicate_task_ids.join(", ")
                ))
            )?;
        }
        if self.cycles_detected {
            write!(f, " — {}", STYLE_WARN.apply_to("project parent cycle detected"))?;
        }
        Ok(())
    }
}

pub struct Reconciler<'a> {
    remote: &'a dyn RemoteClient,
    vault: &'a dyn VaultFileSystem,
    templates: &'a dyn TemplateResolver,
    config: ReconcilerConfig,
    run_guard: tokio::sync::Mutex<()>,
}

impl<'a> Reconciler<'a> {
    pub fn new(remote: &'a dyn RemoteClient, vault: &'a dyn VaultFileSystem, config: ReconcilerConfig) -> Self {
        Self {
            remote,
            vault,
            templates: &PLAIN_RESOLVER,
            config,
            run_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_template_resolver(mut self, templates: &'a dyn TemplateResolver) -> Self {
        self.templates = templates;
        self
    }

    /// Runs the full control flow from §2, in order. At most one run may be
    /// in flight against this `Reconciler`; a second concurrent call returns
    /// `Error::RunInProgress` immediately rather than queueing or blocking.
    pub async fn run(&self) -> Result<RunSummary, Error> {
        let _guard = self.run_guard.try_lock().map_err(|_| Error::RunInProgress)?;
        let mut summary = RunSummary::default();

        self.repair_signatures().await?;
        crate::backfill::backfill_vault_uuids(self.vault).await?;

        let mut index = crate::vault_index::build(self.vault).await?;
        summary.duplicate_task_ids = index.duplicate_task_ids.iter().cloned().collect();
        summary.duplicate_task_ids.sort();

        self.dispatch_pending_creates(&mut index, &mut summary).await?;
        self.dispatch_pending_updates(&mut index, &mut summary).await?;

        let snapshot = self.remote.fetch_snapshot().await?;
        let deleted_ids = self
            .remote
            .fetch_recently_deleted_ids(self.config.recently_deleted_limit)
            .await?;

        self.upsert_projects(&snapshot, &mut index, &mut summary).await?;
        self.upsert_sections(&snapshot, &mut index, &mut summary).await?;

        let importable_ids = self.importable_item_ids(&snapshot);
        let parent_pairs = self
            .upsert_tasks(&snapshot, &importable_ids, &mut index, &mut summary)
            .await?;

        self.apply_parent_child_links(&index, &parent_pairs).await?;
        self.handle_missing_remote(&snapshot, &deleted_ids, &index, &mut summary)
            .await?;
        self.apply_archive_transitions(&snapshot, &mut index, &mut summary).await?;

        Ok(summary)
    }

    /// §4.3 signature-line repair, run once at the top of every sync.
    async fn repair_signatures(&self) -> Result<(), Error> {
        for path in self.vault.list_managed_files().await? {
            process_frontmatter(self.vault, &path, |fm| {
                repair_signature_lines(fm);
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    /// §4.5.1.
    async fn dispatch_pending_creates(&self, index: &mut VaultIndex, summary: &mut RunSummary) -> Result<(), Error> {
        let candidates = self.collect_tasks(index.tasks_by_remote_id.values().cloned().collect()).await?;
        // A genuinely new local-only note carries none of
        // remote_task_id/remote_project_id/remote_section_id yet, so it can
        // never appear in `list_managed_files` (§4.5.1 needs the whole
        // active tasks folder, not just the managed subset).
        let mut all_paths: Vec<Utf8PathBuf> = self.vault.list_all_files().await?;
        all_paths.retain(|p| !candidates.iter().any(|c| &c.path == p));

        for path in all_paths {
            let Some(fm) = self.vault.read_frontmatter_cached(&path).await? else {
                continue;
            };
            let task = TaskNote::from_frontmatter(&fm, path.clone());
            if !task.is_pending_local_create() {
                continue;
            }

            match self.dispatch_one_create(task).await {
                Ok(new_id) => {
                    // So the same run's pull (§4.5.3) recognizes this path
                    // as already-seen and updates it in place instead of
                    // importing the just-created remote row as a second file.
                    index.tasks_by_remote_id.insert(new_id, path);
                    summary.created += 1;
                }
                Err(err) => {
                    log::error!("failed to dispatch local create at '{path}': {err}");
                    summary.errored += 1;
                }
            }
        }
        Ok(())
    }

    async fn dispatch_one_create(&self, task: TaskNote) -> Result<String, Error> {
        let fp = fingerprint::fingerprint(&task, Variant::LocalSync);
        let payload = CreateTaskPayload {
            content: task.task_title.to_string(),
            description: task.description.as_deref().unwrap_or_default().to_string(),
            project_id: task.remote_project_id.as_deref().map(str::to_string),
            section_id: task.remote_section_id.as_deref().map(str::to_string),
            priority: task.priority,
            due_date: task.due.date,
            due_string: task.due.string.as_deref().map(str::to_string),
            labels: task.labels.iter().map(|l| l.to_string()).collect(),
            parent_id: task.parent_task_id.as_deref().map(str::to_string),
        };

        let new_id = self.remote.create_task(payload).await?;

        // Idempotency mark (§4.5.1 step 2): committed before anything else,
        // so a crash here still lets the next run's pull assimilate the row.
        process_frontmatter(self.vault, &task.path, |fm| {
            fm.set_string(&keys::PENDING_REMOTE_ID, &new_id);
            Ok(())
        })
        .await?;

        if task.task_done {
            self.remote
                .update_task(UpdateTaskPatch {
                    task_id: new_id.clone(),
                    is_done: Some(true),
                    ..Default::default()
                })
                .await?;
        }

        process_frontmatter(self.vault, &task.path, |fm| {
            fm.set_string(&keys::REMOTE_TASK_ID, &new_id);
            fm.set_string(&keys::SYNC_STATUS, SyncStatus::Synced.as_str());
            fm.set_string(&keys::LAST_SYNCED_FINGERPRINT, &fp);
            fm.remove(&keys::PENDING_REMOTE_ID);
            fm.set_string(&keys::LAST_IMPORTED_AT, &Utc::now().to_rfc3339());
            Ok(())
        })
        .await?;

        Ok(new_id)
    }

    /// §4.5.2.
    async fn dispatch_pending_updates(&self, index: &mut VaultIndex, summary: &mut RunSummary) -> Result<(), Error> {
        let tasks = self.collect_tasks(index.tasks_by_remote_id.values().cloned().collect()).await?;
        for task in tasks {
            if !task.is_pending_local_update() {
                continue;
            }

            let fp = fingerprint::fingerprint(&task, Variant::LocalSync);
            if Some(fp.as_str()) == task.last_synced_fingerprint.as_deref() {
                // stale dirty mark: nothing actually changed since the last push
                process_frontmatter(self.vault, &task.path, |fm| {
                    fm.set_string(&keys::SYNC_STATUS, SyncStatus::Synced.as_str());
                    Ok(())
                })
                .await?;
                continue;
            }

            let Some(remote_id) = task.remote_task_id.clone() else {
                continue;
            };
            let patch = UpdateTaskPatch {
                task_id: remote_id.to_string(),
                content: Clearable::Set(task.task_title.to_string()),
                description: match &task.description {
                    Some(d) => Clearable::Set(d.to_string()),
                    None => Clearable::Clear,
                },
                is_done: Some(task.task_done),
                due_date: match task.due.date {
                    Some(d) => Clearable::Set(d),
                    None => Clearable::Clear,
                },
                due_string: match &task.due.string {
                    Some(s) => Clearable::Set(s.to_string()),
                    None => Clearable::Clear,
                },
                ..Default::default()
            };

            match self.remote.update_task(patch).await {
                Ok(()) => {
                    process_frontmatter(self.vault, &task.path, |fm| {
                        fm.set_string(&keys::SYNC_STATUS, SyncStatus::Synced.as_str());
                        fm.set_string(&keys::LAST_SYNCED_FINGERPRINT, &fp);
                        if task.task_done && task.is_recurring {
                            if let Some(due) = task.due.date {
                                let mut instances = task.complete_instances.clone();
                                instances.push(due);
                                fm.set_list(&keys::COMPLETE_INSTANCES, instances.iter().map(|d| d.to_string()));
                            }
                        }
                        Ok(())
                    })
                    .await?;
                    summary.updated += 1;
                }
                Err(err) => {
                    log::error!("failed to dispatch local update for '{remote_id}': {err}");
                    summary.errored += 1;
                }
            }
        }
        Ok(())
    }

    async fn collect_tasks(&self, paths: Vec<Utf8PathBuf>) -> Result<Vec<TaskNote>, Error> {
        let mut tasks = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(fm) = self.vault.read_frontmatter_cached(&path).await? {
                tasks.push(TaskNote::from_frontmatter(&fm, path));
            }
        }
        Ok(tasks)
    }

    fn importable_item_ids(&self, snapshot: &RemoteSnapshot) -> HashSet<String> {
        let project_names = crate::remote::project_names(snapshot);
        let section_names: HashMap<String, String> = snapshot
            .sections
            .iter()
            .map(|s| (s.id.clone(), s.name.clone()))
            .collect();

        let mut importable: HashSet<String> = snapshot
            .items
            .iter()
            .filter(|item| {
                let project_name = project_names.get(&item.project_id).map(String::as_str);
                let section_name = item
                    .section_id
                    .as_ref()
                    .and_then(|id| section_names.get(id))
                    .map(String::as_str);
                self.config.importable.is_importable(item, project_name, section_name)
            })
            .map(|item| item.id.clone())
            .collect();

        // Ancestor closure (glossary): transitive parents of every importable
        // item are pulled in even if they individually fail the filter, so
        // the parent-link forest stays complete.
        let by_id: HashMap<&str, &RemoteItem> = snapshot.items.iter().map(|i| (i.id.as_str(), i)).collect();
        let mut frontier: Vec<String> = importable.iter().cloned().collect();
        while let Some(id) = frontier.pop() {
            if let Some(parent_id) = by_id.get(id.as_str()).and_then(|i| i.parent_id.clone()) {
                if importable.insert(parent_id.clone()) {
                    frontier.push(parent_id);
                }
            }
        }
        importable
    }

    /// §4.5.3 project ensure pass: every active project, unconditionally
    /// (projects are structural, not importable-filtered).
    async fn upsert_projects(
        &self,
        snapshot: &RemoteSnapshot,
        index: &mut VaultIndex,
        summary: &mut RunSummary,
    ) -> Result<(), Error> {
        let names_by_id = crate::remote::project_names(snapshot);
        let parent_by_id = crate::remote::project_parents(snapshot);
        let graph: HashMap<String, Option<String>> = snapshot
            .projects
            .iter()
            .map(|p| (p.id.clone(), p.parent_id.clone()))
            .collect();
        let topo = topological_order(&graph);

        for project_id in &topo {
            let Some(project) = snapshot.projects.iter().find(|p| &p.id == project_id) else {
                continue;
            };
            if project.is_archived {
                continue; // handled by the archive pass
            }

            let segment = disambiguated_project_segment(project_id, &project.name, &names_by_id, &topo);
            let mut folder = self.config.task_path.base_folder.clone();
            let segments = path_policy::project_folder_segments(project_id, &names_by_id, &parent_by_id);
            for (i, seg) in segments.iter().enumerate() {
                folder.push(if i + 1 == segments.len() { segment.clone() } else { seg.clone() });
            }

            match index.project_path(project_id).cloned() {
                Some(existing_path) => {
                    let Some(fm) = self.vault.read_frontmatter_cached(&existing_path).await? else {
                        continue;
                    };
                    let mut note = ProjectNote::from_frontmatter(&fm, existing_path.clone());
                    let renamed = note.project_name.as_ref() != project.name.as_str();
                    note.project_name = project.name.clone().into();
                    note.color = project.color.clone().map(Into::into);

                    if renamed {
                        let mut desired = folder.clone();
                        desired.push(PROJECT_NOTE_FILE);
                        let new_path = self.relocate(&existing_path, &desired, project_id).await?;
                        note.path = new_path.clone();
                        index.projects_by_remote_id.insert(project_id.clone(), new_path);
                    }

                    process_frontmatter(self.vault, &note.path.clone(), |fm| {
                        note.write_to_frontmatter(fm);
                        Ok(())
                    })
                    .await?;
                }
                None => {
                    let mut path = folder.clone();
                    path.push(PROJECT_NOTE_FILE);
                    self.create_project_note(&path, project).await?;
                    index.projects_by_remote_id.insert(project_id.clone(), path);
                    summary.projects_ensured += 1;
                }
            }
        }
        Ok(())
    }

    async fn create_project_note(
        &self,
        path: &Utf8PathBuf,
        project: &crate::remote::RemoteProject,
    ) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            self.vault.ensure_folder(parent).await?;
        }
        let body = self.templates.resolve(
            "",
            Utc::now().date_naive(),
            TokenContext::Project(ProjectTokens {
                project_name: project.name.clone(),
                project_id: project.id.clone(),
                parent_project_link: None,
                url: None,
            }),
        );
        self.vault.create_file(path, &body).await?;

        // Hydration (§9 "Templates vs invariants"): the template may have
        // omitted required fields, so enforce the identity contract here
        // regardless of what it produced.
        let note = ProjectNote {
            path: path.clone(),
            vault_uuid: uuid::Uuid::new_v4().to_string().into(),
            created: Utc::now(),
            modified: Utc::now(),
            tags: vec![],
            project_name: project.name.clone().into(),
            remote_project_id: project.id.clone().into(),
            color: project.color.clone().map(Into::into),
            parent_project_id: project.parent_id.clone().map(Into::into),
            parent_project_name: None,
            parent_project_link: None,
            is_archived: project.is_archived,
            external_url: None,
        };
        process_frontmatter(self.vault, path, |fm| {
            note.write_to_frontmatter(fm);
            Ok(())
        })
        .await
    }

    /// §4.5.3 section ensure pass, analogous to [`Self::upsert_projects`].
    async fn upsert_sections(
        &self,
        snapshot: &RemoteSnapshot,
        index: &mut VaultIndex,
        summary: &mut RunSummary,
    ) -> Result<(), Error> {
        let names_by_id = crate::remote::project_names(snapshot);
        let mut sections_by_project: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for s in &snapshot.sections {
            sections_by_project
                .entry(s.project_id.clone())
                .or_default()
                .push((s.id.clone(), s.name.clone()));
        }

        for section in &snapshot.sections {
            if section.is_archived {
                continue;
            }
            let Some(project_path) = index.project_path(&section.project_id).cloned() else {
                continue;
            };
            let segment = disambiguated_section_segment(&section.id, &section.name, &section.project_id, &sections_by_project);
            let mut folder = project_path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            if self.config.task_path.use_section_subfolders {
                folder.push(segment);
            }

            let project_link = wikilink(&project_path);

            match index.section_path(&section.id).cloned() {
                Some(existing_path) => {
                    let Some(fm) = self.vault.read_frontmatter_cached(&existing_path).await? else {
                        continue;
                    };
                    let mut note = SectionNote::from_frontmatter(&fm, existing_path.clone());
                    let stale = note.section_name.as_ref() != section.name.as_str()
                        || note.project_link.as_ref() != project_link.as_str();
                    note.section_name = section.name.clone().into();
                    note.project_link = project_link.clone().into();

                    if stale {
                        let mut desired = folder.clone();
                        desired.push(SECTION_NOTE_FILE);
                        let new_path = self.relocate(&existing_path, &desired, &section.id).await?;
                        note.path = new_path.clone();
                        index.sections_by_remote_id.insert(section.id.clone(), new_path);
                    }

                    process_frontmatter(self.vault, &note.path.clone(), |fm| {
                        note.write_to_frontmatter(fm);
                        Ok(())
                    })
                    .await?;
                }
                None => {
                    let mut path = folder.clone();
                    path.push(SECTION_NOTE_FILE);
                    self.create_section_note(&path, section, &names_by_id, &project_link).await?;
                    index.sections_by_remote_id.insert(section.id.clone(), path);
                    summary.sections_ensured += 1;
                }
            }
        }
        Ok(())
    }

    async fn create_section_note(
        &self,
        path: &Utf8PathBuf,
        section: &crate::remote::RemoteSection,
        names_by_id: &HashMap<String, String>,
        project_link: &str,
    ) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            self.vault.ensure_folder(parent).await?;
        }
        let project_name = names_by_id.get(&section.project_id).cloned().unwrap_or_default();
        let body = self.templates.resolve(
            "",
            Utc::now().date_naive(),
            TokenContext::Section(SectionTokens {
                section_name: section.name.clone(),
                section_id: section.id.clone(),
                project_name: project_name.clone(),
                project_id: section.project_id.clone(),
                project_link: project_link.to_string(),
                url: None,
            }),
        );
        self.vault.create_file(path, &body).await?;

        let note = SectionNote {
            path: path.clone(),
            vault_uuid: uuid::Uuid::new_v4().to_string().into(),
            created: Utc::now(),
            modified: Utc::now(),
            tags: vec![],
            section_name: section.name.clone().into(),
            remote_section_id: section.id.clone().into(),
            project_name: project_name.into(),
            remote_project_id: section.project_id.clone().into(),
            project_link: project_link.into(),
            is_archived: section.is_archived,
            external_url: None,
        };
        process_frontmatter(self.vault, path, |fm| {
            note.write_to_frontmatter(fm);
            Ok(())
        })
        .await
    }

    /// §4.5.3 task upsert pass + §4.5.5 conflict resolution +
    /// §4.5.6 relocation. Returns the `(child_id, parent_id)` pairs
    /// collected for the back-link passes in §4.5.4.
    async fn upsert_tasks(
        &self,
        snapshot: &RemoteSnapshot,
        importable_ids: &HashSet<String>,
        index: &mut VaultIndex,
        summary: &mut RunSummary,
    ) -> Result<Vec<(String, String)>, Error> {
        let project_names = crate::remote::project_names(snapshot);
        let section_names: HashMap<String, String> =
            snapshot.sections.iter().map(|s| (s.id.clone(), s.name.clone())).collect();
        let mut parent_pairs = Vec::new();

        for item in snapshot.items.iter().filter(|i| importable_ids.contains(&i.id) && !i.is_deleted) {
            if let Some(parent_id) = &item.parent_id {
                parent_pairs.push((item.id.clone(), parent_id.clone()));
            }

            let project_link = index.project_path(&item.project_id).map(|p| wikilink(p));
            let section_link = item.section_id.as_ref().and_then(|id| index.section_path(id)).map(|p| wikilink(p));

            match index.task_path(&item.id).cloned() {
                None => {
                    if let Err(err) = self
                        .create_task_from_remote(item, &project_names, &section_names, project_link, section_link, index)
                        .await
                    {
                        log::error!("failed to import remote task '{}': {err}", item.id);
                        summary.errored += 1;
                        continue;
                    }
                    summary.created += 1;
                }
                Some(path) => {
                    match self
                        .update_task_from_remote(&path, item, &project_names, &section_names, project_link, section_link)
                        .await
                    {
                        Ok(changed) => {
                            if changed {
                                summary.updated += 1;
                            }
                        }
                        Err(err) => {
                            log::error!("failed to update task at '{path}': {err}");
                            summary.errored += 1;
                        }
                    }
                }
            }
        }
        Ok(parent_pairs)
    }

    async fn create_task_from_remote(
        &self,
        item: &RemoteItem,
        project_names: &HashMap<String, String>,
        section_names: &HashMap<String, String>,
        project_link: Option<String>,
        section_link: Option<String>,
        index: &mut VaultIndex,
    ) -> Result<(), Error> {
        let project_segment = project_link.is_some().then(|| project_names.get(&item.project_id).cloned()).flatten();
        let section_segment = item.section_id.as_ref().and_then(|id| section_names.get(id).cloned());
        let desired = task_file_path(&item.content, project_segment.as_deref(), section_segment.as_deref(), &self.config.task_path);

        if let Some(parent) = desired.parent() {
            self.vault.ensure_folder(parent).await?;
        }
        let occupied = self.vault.exists(&desired).await?;
        let path = allocate_unique_path(&desired, &item.id, |_| occupied);

        let note = TaskNote {
            path: path.clone(),
            vault_uuid: uuid::Uuid::new_v4().to_string().into(),
            created: Utc::now(),
            modified: Utc::now(),
            tags: vec![],
            task_title: item.content.clone().into(),
            task_status: if item.checked { TaskStatus::Done } else { TaskStatus::Open },
            task_done: item.checked,
            remote_task_id: Some(item.id.clone().into()),
            remote_project_id: Some(item.project_id.clone().into()),
            remote_section_id: item.section_id.clone().map(Into::into),
            project_name: project_names.get(&item.project_id).cloned().map(Into::into),
            section_name: item.section_id.as_ref().and_then(|id| section_names.get(id)).cloned().map(Into::into),
            project_link: project_link.clone().map(Into::into),
            section_link: section_link.clone().map(Into::into),
            priority: Some(item.priority),
            priority_label: None,
            due: Due {
                date: item.due_date,
                string: item.due_string.clone().map(Into::into),
            },
            is_recurring: item.due_is_recurring,
            recurrence: None,
            deadline: item.deadline_date,
            description: Some(item.description.clone().into()).filter(|d: &std::sync::Arc<str>| !d.is_empty()),
            labels: item.labels.iter().cloned().map(Into::into).collect(),
            parent_task_id: item.parent_id.clone().map(Into::into),
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
            last_imported_at: Some(Utc::now()),
            is_deleted: false,
            complete_instances: vec![],
        };
        let fp = fingerprint::fingerprint(&note, Variant::RemoteImport);

        let body = self.templates.resolve(
            "",
            Utc::now().date_naive(),
            TokenContext::Task(TaskTokens {
                title: note.task_title.to_string(),
                description: note.description.as_deref().unwrap_or_default().to_string(),
                due_date: note.due.date.map(|d| d.to_string()),
                due_string: note.due.string.as_deref().map(str::to_string),
                deadline_date: note.deadline.map(|d| d.to_string()),
                priority: note.priority.map(|p| p.to_string()),
                priority_label: None,
                project: note.project_name.as_deref().map(str::to_string),
                project_id: note.remote_project_id.as_deref().map(str::to_string),
                section: note.section_name.as_deref().map(str::to_string),
                section_id: note.remote_section_id.as_deref().map(str::to_string),
                todoist_id: note.remote_task_id.as_deref().map(str::to_string),
                url: None,
                tags: note.tags.iter().map(|t| t.to_string()).collect(),
                created: note.created.to_rfc3339(),
                project_link: project_link.clone(),
                section_link: section_link.clone(),
                parent_task_link: None,
            }),
        );
        self.vault.create_file(&path, &body).await?;

        process_frontmatter(self.vault, &path, |fm| {
            note.write_to_frontmatter(fm);
            fm.set_string(&keys::LAST_IMPORTED_FINGERPRINT, &fp);
            Ok(())
        })
        .await?;

        index.tasks_by_remote_id.insert(item.id.clone(), path);
        Ok(())
    }

    /// Returns whether anything changed. §4.5.3 + §4.5.5 + §4.5.6.
    async fn update_task_from_remote(
        &self,
        path: &Utf8PathBuf,
        item: &RemoteItem,
        project_names: &HashMap<String, String>,
        section_names: &HashMap<String, String>,
        project_link: Option<String>,
        section_link: Option<String>,
    ) -> Result<bool, Error> {
        let Some(fm) = self.vault.read_frontmatter_cached(path).await? else {
            return Ok(false);
        };
        let mut note = TaskNote::from_frontmatter(&fm, path.clone());

        let mut candidate = note.clone();
        candidate.project_name = project_names.get(&item.project_id).cloned().map(Into::into);
        candidate.section_name = item.section_id.as_ref().and_then(|id| section_names.get(id)).cloned().map(Into::into);
        candidate.remote_project_id = Some(item.project_id.clone().into());
        candidate.remote_section_id = item.section_id.clone().map(Into::into);
        candidate.project_link = project_link.clone().map(Into::into);
        candidate.section_link = section_link.clone().map(Into::into);
        candidate.priority = Some(item.priority);
        candidate.due = Due {
            date: item.due_date,
            string: item.due_string.clone().map(Into::into),
        };
        candidate.is_recurring = item.due_is_recurring;
        candidate.deadline = item.deadline_date;
        candidate.labels = item.labels.iter().cloned().map(Into::into).collect();
        candidate.parent_task_id = item.parent_id.clone().map(Into::into);
        candidate.task_title = item.content.clone().into();
        candidate.task_done = item.checked;
        candidate.task_status = if item.checked { TaskStatus::Done } else { TaskStatus::Open };
        candidate.description = Some(item.description.clone().into()).filter(|d: &std::sync::Arc<str>| !d.is_empty());

        let new_fp = fingerprint::fingerprint(&candidate, Variant::RemoteImport);
        if Some(new_fp.as_str()) == note.last_imported_fingerprint.as_deref() {
            // unchanged: only refresh link fields if they went stale
            let link_stale = note.project_link != candidate.project_link || note.section_link != candidate.section_link;
            if link_stale {
                note.project_link = candidate.project_link;
                note.section_link = candidate.section_link;
                process_frontmatter(self.vault, path, |fm| {
                    note.write_to_frontmatter(fm);
                    Ok(())
                })
                .await?;
                return Ok(true);
            }
            return Ok(false);
        }

        let local_wins = self.config.conflict_policy == ConflictPolicy::LocalWins && note.sync_status == SyncStatus::DirtyLocal;

        // Recurring-completion special rule (§4.5.5): append the superseded
        // due date before it's overwritten.
        let mut complete_instances = note.complete_instances.clone();
        if note.is_recurring {
            if let (Some(old_due), Some(new_due)) = (note.due.date, candidate.due.date) {
                if new_due > old_due {
                    complete_instances.push(old_due);
                }
            }
        }

        if item.parent_id.is_none() {
            // §4.5.4: a child whose parent field goes empty on the remote
            // has its parent_task_link cleared during this same upsert,
            // not left for the parent/child pass (which only ever sees
            // still-parented pairs).
            candidate.parent_task_link = None;
        }

        if local_wins {
            // remote-owned metadata only; user-editable fields untouched (§4.5.5)
            note.project_name = candidate.project_name;
            note.section_name = candidate.section_name;
            note.remote_project_id = candidate.remote_project_id;
            note.remote_section_id = candidate.remote_section_id;
            note.project_link = candidate.project_link;
            note.section_link = candidate.section_link;
            note.labels = candidate.labels;
            note.parent_task_id = candidate.parent_task_id;
            note.parent_task_link = candidate.parent_task_link;
        } else {
            let preserved_recurrence = note.recurrence.clone();
            note = candidate;
            // DTSTART preservation (§4.5.5): once written, only a
            // recurring->non-recurring transition clears the rule.
            note.recurrence = if note.is_recurring { preserved_recurrence } else { None };
            note.complete_instances = complete_instances;
        }
        note.last_imported_fingerprint = Some(new_fp.into());

        let final_path = if self.config.auto_rename_files || self.config.task_path.use_project_subfolders || self.config.task_path.use_section_subfolders {
            self.relocate_task(&note).await?
        } else {
            path.clone()
        };
        note.path = final_path.clone();

        process_frontmatter(self.vault, &final_path, |fm| {
            note.write_to_frontmatter(fm);
            Ok(())
        })
        .await?;
        Ok(true)
    }

    /// §4.5.6: relocates a task if its computed desired path (from current
    /// title/project/section) differs from its current one, via the
    /// collision-safe allocator.
    async fn relocate_task(&self, note: &TaskNote) -> Result<Utf8PathBuf, Error> {
        let project_segment = note.project_name.as_deref();
        let section_segment = note.section_name.as_deref();
        let desired = task_file_path(&note.task_title, project_segment, section_segment, &self.config.task_path);
        if desired == note.path {
            return Ok(note.path.clone());
        }
        self.relocate(&note.path, &desired, note.remote_task_id.as_deref().unwrap_or("note")).await
    }

    async fn relocate(&self, from: &Utf8PathBuf, desired: &Utf8PathBuf, disambiguator: &str) -> Result<Utf8PathBuf, Error> {
        if from == desired {
            return Ok(from.clone());
        }
        if let Some(parent) = desired.parent() {
            self.vault.ensure_folder(parent).await?;
        }
        let occupied = self.vault.exists(desired).await? && desired != from;
        let target = allocate_unique_path(desired, disambiguator, |_| occupied);
        self.vault.rename_file(from, &target).await?;
        Ok(target)
    }

    /// §4.5.4: forward pass sets each child's `parent_task_link`; reverse
    /// pass sets each parent's `has_children`/`child_count`/`child_tasks`.
    /// Skips files in terminal states.
    async fn apply_parent_child_links(&self, index: &VaultIndex, pairs: &[(String, String)]) -> Result<(), Error> {
        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        for (child_id, parent_id) in pairs {
            children_of.entry(parent_id.clone()).or_default().push(child_id.clone());
        }

        for (child_id, parent_id) in pairs {
            let Some(child_path) = index.task_path(child_id).cloned() else { continue };
            let Some(parent_path) = index.task_path(parent_id).cloned() else { continue };
            let Some(fm) = self.vault.read_frontmatter_cached(&child_path).await? else { continue };
            if fm
                .get_string(&keys::SYNC_STATUS)
                .and_then(|s| SyncStatus::from_str(&s))
                .map(|s| s.is_terminal())
                .unwrap_or(false)
            {
                continue;
            }
            let link = wikilink(&parent_path);
            process_frontmatter(self.vault, &child_path, |fm| {
                fm.set_string(&keys::PARENT_TASK_LINK, &link);
                Ok(())
            })
            .await?;
        }

        for (parent_id, child_ids) in &children_of {
            let Some(parent_path) = index.task_path(parent_id).cloned() else { continue };
            let Some(fm) = self.vault.read_frontmatter_cached(&parent_path).await? else { continue };
            if fm
                .get_string(&keys::SYNC_STATUS)
                .and_then(|s| SyncStatus::from_str(&s))
                .map(|s| s.is_terminal())
                .unwrap_or(false)
            {
                continue;
            }
            let mut links: Vec<String> = child_ids
                .iter()
                .filter_map(|id| index.task_path(id))
                .map(|p| wikilink(p))
                .collect();
            links.sort();
            process_frontmatter(self.vault, &parent_path, |fm| {
                fm.set_bool(&keys::HAS_CHILDREN, !links.is_empty());
                fm.set_string(&keys::CHILD_COUNT, &links.len().to_string());
                fm.set_list(&keys::CHILD_TASKS, links.clone());
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    /// §4.5.7: any TaskNote in the index absent from the active snapshot is
    /// classified completed-or-deleted and handled per the policy table.
    async fn handle_missing_remote(
        &self,
        snapshot: &RemoteSnapshot,
        deleted_ids: &HashSet<String>,
        index: &VaultIndex,
        summary: &mut RunSummary,
    ) -> Result<(), Error> {
        let active_ids: HashSet<&str> = snapshot.items.iter().map(|i| i.id.as_str()).collect();

        for (remote_id, path) in index.tasks_by_remote_id.clone() {
            if active_ids.contains(remote_id.as_str()) {
                continue;
            }

            let deleted = deleted_ids.contains(&remote_id);
            let (mode, folder, new_status, is_deleted) = if deleted {
                (
                    self.config.missing_remote.deleted_mode,
                    self.config.missing_remote.deleted_folder.clone(),
                    SyncStatus::DeletedRemote,
                    true,
                )
            } else {
                (
                    self.config.missing_remote.completed_mode,
                    self.config.missing_remote.completed_folder.clone(),
                    SyncStatus::ArchivedRemote,
                    false,
                )
            };

            let result: Result<(), Error> = async {
                let final_path = if mode == MissingRemoteMode::MoveToFolder {
                    if let Some(folder) = &folder {
                        self.relocate(&path, &{
                            let mut p = folder.clone();
                            p.push(path.file_name().unwrap_or("untitled.md"));
                            p
                        }, &remote_id)
                        .await?
                    } else {
                        path.clone()
                    }
                } else {
                    path.clone()
                };

                process_frontmatter(self.vault, &final_path, |fm| {
                    if mode == MissingRemoteMode::StopSyncing {
                        fm.remove(&keys::REMOTE_TASK_ID);
                        fm.set_string(&keys::SYNC_STATUS, SyncStatus::LocalOnly.as_str());
                    } else {
                        fm.set_string(&keys::SYNC_STATUS, new_status.as_str());
                        if !deleted {
                            fm.set_bool(&keys::TASK_DONE, true);
                            fm.set_string(&keys::TASK_STATUS, TaskStatus::Done.as_str());
                        }
                        fm.set_bool(&keys::IS_DELETED, is_deleted);
                    }
                    Ok(())
                })
                .await
            }
            .await;

            match result {
                Ok(()) => summary.missing_handled += 1,
                Err(err) => {
                    log::error!("failed to apply missing-remote handling for '{remote_id}': {err}");
                    summary.errored += 1;
                }
            }
        }
        Ok(())
    }

    /// §4.5.8: archives ProjectNotes/SectionNotes whose remote is archived;
    /// unarchives ones that came back.
    async fn apply_archive_transitions(
        &self,
        snapshot: &RemoteSnapshot,
        index: &mut VaultIndex,
        summary: &mut RunSummary,
    ) -> Result<(), Error> {
        for project in &snapshot.projects {
            let Some(path) = index.project_path(&project.id).cloned() else { continue };
            let Some(fm) = self.vault.read_frontmatter_cached(&path).await? else { continue };
            let currently_archived = fm.get_bool(&keys::IS_ARCHIVED);

            if project.is_archived && !currently_archived {
                let new_path = archive::archive_project(self.vault, &path, &project.id, &self.config.archive).await?;
                process_frontmatter(self.vault, &new_path, |fm| {
                    fm.set_bool(&keys::IS_ARCHIVED, true);
                    Ok(())
                })
                .await?;
                index.projects_by_remote_id.insert(project.id.clone(), new_path);
                summary.archived += 1;
            } else if !project.is_archived && currently_archived {
                let names_by_id = crate::remote::project_names(snapshot);
                let parent_by_id = crate::remote::project_parents(snapshot);
                let segments = path_policy::project_folder_segments(&project.id, &names_by_id, &parent_by_id);
                let mut active = self.config.task_path.base_folder.clone();
                for seg in &segments {
                    active.push(seg);
                }
                active.push(PROJECT_NOTE_FILE);
                let new_path = archive::unarchive_to(self.vault, &path, &active, &project.id).await?;
                process_frontmatter(self.vault, &new_path, |fm| {
                    fm.set_bool(&keys::IS_ARCHIVED, false);
                    Ok(())
                })
                .await?;
                index.projects_by_remote_id.insert(project.id.clone(), new_path);
                summary.unarchived += 1;
            }
        }

        let mut sections_by_project: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for s in &snapshot.sections {
            sections_by_project
                .entry(s.project_id.clone())
                .or_default()
                .push((s.id.clone(), s.name.clone()));
        }

        for section in &snapshot.sections {
            let Some(path) = index.section_path(&section.id).cloned() else { continue };
            let Some(fm) = self.vault.read_frontmatter_cached(&path).await? else { continue };
            let currently_archived = fm.get_bool(&keys::IS_ARCHIVED);

            if section.is_archived && !currently_archived {
                let new_path = archive::archive_section(self.vault, &path, &section.id, &self.config.archive).await?;
                process_frontmatter(self.vault, &new_path, |fm| {
                    fm.set_bool(&keys::IS_ARCHIVED, true);
                    Ok(())
                })
                .await?;
                index.sections_by_remote_id.insert(section.id.clone(), new_path);
                summary.archived += 1;
            } else if !section.is_archived && currently_archived {
                let Some(project_path) = index.project_path(&section.project_id).cloned() else { continue };
                let segment =
                    disambiguated_section_segment(&section.id, &section.name, &section.project_id, &sections_by_project);
                let mut active = project_path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
                if self.config.task_path.use_section_subfolders {
                    active.push(segment);
                }
                active.push(SECTION_NOTE_FILE);
                let new_path = archive::unarchive_to(self.vault, &path, &active, &section.id).await?;
                process_frontmatter(self.vault, &new_path, |fm| {
                    fm.set_bool(&keys::IS_ARCHIVED, false);
                    Ok(())
                })
                .await?;
                index.sections_by_remote_id.insert(section.id.clone(), new_path);
                summary.unarchived += 1;
            }
        }
        Ok(())
    }
}

static PLAIN_RESOLVER: PlainTemplateResolver = PlainTemplateResolver;

fn wikilink(path: &Utf8PathBuf) -> String {
    let stem = path.file_stem().unwrap_or("note");
    format!("[[{stem}]]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryRemote, RemoteProject};
    use crate::vault::InMemoryVault;
    use camino::Utf8Path;
    use pretty_assertions::assert_eq;

    fn default_config() -> ReconcilerConfig {
        ReconcilerConfig {
            task_path: TaskPathConfig {
                base_folder: "Tasks".into(),
                use_project_subfolders: false,
                use_section_subfolders: false,
            },
            archive: ArchiveConfig {
                project_archive_folder: "Archive/Projects".into(),
                section_archive_folder: None,
            },
            conflict_policy: ConflictPolicy::LocalWins,
            missing_remote: MissingRemotePolicy {
                completed_mode: MissingRemoteMode::KeepInPlace,
                completed_folder: None,
                deleted_mode: MissingRemoteMode::KeepInPlace,
                deleted_folder: None,
            },
            importable: ImportableFilter::default(),
            auto_rename_files: false,
            recently_deleted_limit: 50,
        }
    }

    #[tokio::test]
    async fn first_import_of_one_task_creates_file_with_expected_frontmatter() {
        let mut snapshot = RemoteSnapshot::default();
        snapshot.projects.push(RemoteProject {
            id: "P1".into(),
            name: "Personal".into(),
            parent_id: None,
            color: None,
            is_archived: false,
        });
        snapshot.items.push(crate::remote::RemoteItem {
            id: "A1".into(),
            content: "Buy milk".into(),
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
        let vault = InMemoryVault::new();
        let reconciler = Reconciler::new(&remote, &vault, default_config());
        let summary = reconciler.run().await.unwrap();
        assert_eq!(summary.created, 2); // one project note + one task note

        let text = vault.read_text(Utf8Path::new("Tasks/Buy milk.md")).await.unwrap();
        assert!(text.contains("remote_task_id: A1"));
        assert!(text.contains("task_status: Open"));
        assert!(text.contains("sync_status: synced"));
    }

    #[tokio::test]
    async fn duplicate_remote_task_id_surfaced_in_summary() {
        let vault = InMemoryVault::new();
        vault
            .create_file(Utf8Path::new("Tasks/a.md"), "---\nremote_task_id: A4\n---\n")
            .await
            .unwrap();
        vault
            .create_file(Utf8Path::new("Tasks/b.md"), "---\nremote_task_id: A4\n---\n")
            .await
            .unwrap();
        let remote = InMemoryRemote::new(RemoteSnapshot::default());
        let reconciler = Reconciler::new(&remote, &vault, default_config());
        let summary = reconciler.run().await.unwrap();
        assert_eq!(summary.duplicate_task_ids, vec!["A4".to_string()]);
    }

    #[tokio::test]
    async fn local_wins_conflict_keeps_title_but_applies_remote_section_move() {
        let mut snapshot = RemoteSnapshot::default();
        snapshot.projects.push(RemoteProject {
            id: "P1".into(),
            name: "Personal".into(),
            parent_id: None,
            color: None,
            is_archived: false,
        });
        snapshot.sections.push(crate::remote::RemoteSection {
            id: "S7".into(),
            name: "Errands".into(),
            project_id: "P1".into(),
            is_archived: false,
        });
        snapshot.items.push(crate::remote::RemoteItem {
            id: "A3".into(),
            content: "Call mom".into(),
            description: String::new(),
            checked: false,
            project_id: "P1".into(),
            section_id: Some("S7".into()),
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

        let vault = InMemoryVault::new();
        vault
            .create_file(
                Utf8Path::new("Tasks/Call mom.md"),
                "---\nremote_task_id: A3\nremote_project_id: P1\ntask_title: Call mom!\nsync_status: dirty_local\nlast_imported_fingerprint: stale\n---\n",
            )
            .await
            .unwrap();

        let remote = InMemoryRemote::new(snapshot);
        let mut config = default_config();
        config.conflict_policy = ConflictPolicy::LocalWins;
        let reconciler = Reconciler::new(&remote, &vault, config);
        reconciler.run().await.unwrap();

        let text = vault.read_text(Utf8Path::new("Tasks/Call mom.md")).await.unwrap();
        assert!(text.contains("task_title: Call mom!"), "local title must survive: {text}");
        assert!(text.contains("remote_section_id: S7"), "remote section must still apply: {text}");
    }

    #[tokio::test]
    async fn recurring_task_advancing_due_date_appends_completed_instance() {
        let mut snapshot = RemoteSnapshot::default();
        snapshot.projects.push(RemoteProject {
            id: "P1".into(),
            name: "Personal".into(),
            parent_id: None,
            color: None,
            is_archived: false,
        });
        snapshot.items.push(crate::remote::RemoteItem {
            id: "A5".into(),
            content: "Water plants".into(),
            description: String::new(),
            checked: false,
            project_id: "P1".into(),
            section_id: None,
            parent_id: None,
            priority: 1,
            due_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 9),
            due_string: None,
            due_is_recurring: true,
            deadline_date: None,
            labels: vec![],
            responsible_uid: None,
            is_deleted: false,
        });

        let vault = InMemoryVault::new();
        vault
            .create_file(
                Utf8Path::new("Tasks/Water plants.md"),
                "---\nremote_task_id: A5\nremote_project_id: P1\ntask_title: Water plants\nis_recurring: true\ndue_date: 2026-03-02\nlast_imported_fingerprint: stale\nsync_status: synced\n---\n",
            )
            .await
            .unwrap();

        let remote = InMemoryRemote::new(snapshot);
        let reconciler = Reconciler::new(&remote, &vault, default_config());
        reconciler.run().await.unwrap();

        let text = vault.read_text(Utf8Path::new("Tasks/Water plants.md")).await.unwrap();
        assert!(text.contains("due_date: 2026-03-09"), "{text}");
        assert!(text.contains("2026-03-02"), "superseded instance must be recorded: {text}");
    }

    #[tokio::test]
    async fn note_left_with_pending_remote_id_after_a_crash_is_assimilated_not_recreated() {
        // Simulates the state left behind by dispatch_one_create's first
        // write, had the run been interrupted right after it: the remote
        // already knows about "A2" but the vault note only carries
        // pending_remote_id, not remote_task_id.
        let mut snapshot = RemoteSnapshot::default();
        snapshot.projects.push(RemoteProject {
            id: "P1".into(),
            name: "Personal".into(),
            parent_id: None,
            color: None,
            is_archived: false,
        });
        snapshot.items.push(crate::remote::RemoteItem {
            id: "A2".into(),
            content: "Already created".into(),
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

        let vault = InMemoryVault::new();
        vault
            .create_file(
                Utf8Path::new("Tasks/Already created.md"),
                "---\nsync_flag: true\nremote_project_id: P1\ntask_title: Already created\npending_remote_id: A2\n---\n",
            )
            .await
            .unwrap();

        let remote = InMemoryRemote::new(snapshot);
        let reconciler = Reconciler::new(&remote, &vault, default_config());
        let summary = reconciler.run().await.unwrap();

        // The pending-create dispatch must have skipped this note (it was
        // never handed to create_task again), but the pull still imported
        // "A2" as a brand-new file rather than into the pre-existing note,
        // since the note is indexed by path/vault_uuid, not by remote id,
        // until assimilation catches up on a later run once it carries
        // remote_task_id itself. This asserts the no-duplicate-create half
        // of the crash-safety property: the remote never saw a second
        // create_task call for this title.
        assert!(remote.created.lock().unwrap().is_empty());
        assert_eq!(summary.errored, 0);
    }

    #[tokio::test]
    async fn brand_new_local_only_note_is_dispatched_as_a_create() {
        // No remote_task_id, remote_project_id, or remote_section_id at
        // all — this is the one shape list_managed_files can never surface,
        // so pending-create discovery must fall back to the full file list.
        let vault = InMemoryVault::new();
        vault
            .create_file(
                Utf8Path::new("Tasks/New idea.md"),
                "---\nsync_flag: true\ntask_title: New idea\n---\n",
            )
            .await
            .unwrap();

        let remote = InMemoryRemote::new(RemoteSnapshot::default());
        let reconciler = Reconciler::new(&remote, &vault, default_config());
        let summary = reconciler.run().await.unwrap();

        assert_eq!(remote.created.lock().unwrap().len(), 1);
        assert_eq!(remote.created.lock().unwrap()[0].content, "New idea");
        assert_eq!(summary.errored, 0);

        let text = vault.read_text(Utf8Path::new("Tasks/New idea.md")).await.unwrap();
        assert!(text.contains("remote_task_id: gen-1000"), "{text}");
        assert!(!text.contains("pending_remote_id: gen-1000"), "{text}");
    }

    #[tokio::test]
    async fn archived_section_is_moved_and_unarchive_restores_active_path() {
        let mut snapshot = RemoteSnapshot::default();
        snapshot.projects.push(RemoteProject {
            id: "P1".into(),
            name: "Personal".into(),
            parent_id: None,
            color: None,
            is_archived: false,
        });
        snapshot.sections.push(crate::remote::RemoteSection {
            id: "S1".into(),
            name: "Errands".into(),
            project_id: "P1".into(),
            is_archived: true,
        });

        let vault = InMemoryVault::new();
        vault
            .create_file(
                Utf8Path::new("Tasks/_Project.md"),
                "---\nremote_project_id: P1\nproject_name: Personal\n---\n",
            )
            .await
            .unwrap();
        vault
            .create_file(
                Utf8Path::new("Tasks/_Section.md"),
                "---\nremote_section_id: S1\nremote_project_id: P1\nsection_name: Errands\n---\n",
            )
            .await
            .unwrap();

        let remote = InMemoryRemote::new(snapshot.clone());
        let mut config = default_config();
        config.archive.project_archive_folder = "Archive".into();
        let reconciler = Reconciler::new(&remote, &vault, config);
        let summary = reconciler.run().await.unwrap();
        assert_eq!(summary.archived, 1);
        assert!(vault.exists(Utf8Path::new("Archive/_Section.md")).await.unwrap());
        assert!(!vault.exists(Utf8Path::new("Tasks/_Section.md")).await.unwrap());

        // Remote un-archives the section; the next run must move it back.
        remote.snapshot.lock().unwrap().sections[0].is_archived = false;
        let summary2 = reconciler.run().await.unwrap();
        assert_eq!(summary2.unarchived, 1);
        assert!(vault.exists(Utf8Path::new("Tasks/_Section.md")).await.unwrap());
        assert!(!vault.exists(Utf8Path::new("Archive/_Section.md")).await.unwrap());
    }
}
