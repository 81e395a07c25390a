use clap::CommandFactory;
use clap_complete::generate;

use crate::cfg::CFG;
use crate::error::Error;
use crate::opts::{Command, ConfigCommand, GenerateTarget, Opts, Sync};

pub async fn run(opts: &Opts) -> Result<(), Error> {
    match opts.command {
        Command::Config(ref cfg_cmd) => match cfg_cmd.command {
            ConfigCommand::Show => eprintln!("{:#?}", *CFG),
        },

        Command::Generate(ref gen) => match gen.target {
            GenerateTarget::HelpMarkdown => println!("{}", clap_markdown::help_markdown::<Opts>()),
            GenerateTarget::Completion(ref comp_opts) => {
                let mut cmd = Opts::command();
                let name = cmd.get_name().to_string();
                generate(comp_opts.shell, &mut cmd, name, &mut std::io::stdout());
            }
        },

        Command::Sync(ref sync_opts) => run_sync(sync_opts).await?,
    }
    Ok(())
}

/// This crate ships the reconciliation engine as a library (`Reconciler`);
/// the concrete Todoist REST client and real vault filesystem are explicitly
/// out of scope, so the CLI has nothing to wire `sync` up to on its own.
/// Callers embedding this crate construct a `Reconciler` directly with their
/// own `RemoteClient`/`VaultFileSystem` implementations.
async fn run_sync(opts: &Sync) -> Result<(), Error> {
    log::info!("would reconcile vault at '{}' (dry_run={})", opts.vault_root, opts.dry_run);
    Err(Error::NotSupported {
        arg: "sync".into(),
        command: "this build has no concrete RemoteClient/VaultFileSystem wired in; embed vault_task_sync::Reconciler with your own implementations".into(),
    })
}
