mod archive;
mod backfill;
mod cfg;
mod error;
mod fingerprint;
mod frontmatter;
mod model;
mod opts;
mod path_policy;
mod progress_bar;
mod reconciler;
mod remote;
mod run;
mod template;
mod vault;
mod vault_index;

pub use archive::ArchiveConfig;
pub use error::Error;
pub use frontmatter::{keys, Frontmatter, PropName};
pub use path_policy::TaskPathConfig;
pub use model::{Due, ProjectNote, SectionNote, SyncStatus, TaskNote, TaskStatus};
pub use opts::Opts;
pub use reconciler::{
    ConflictPolicy, ImportableFilter, MissingRemoteMode, MissingRemotePolicy, Reconciler, ReconcilerConfig, RunSummary,
};
pub use remote::{Clearable, CreateTaskPayload, RemoteClient, RemoteItem, RemoteProject, RemoteSection, RemoteSnapshot, UpdateTaskPatch};
pub use run::run;
pub use template::{PlainTemplateResolver, ProjectTokens, SectionTokens, TaskTokens, TemplateResolver, TokenContext};
pub use vault::VaultFileSystem;
