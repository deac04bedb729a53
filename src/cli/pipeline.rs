//! Subcommand definitions for the `gc` binary. Grounded on the teacher's
//! `gc.rs` `#[derive(Parser)]`/`#[derive(Subcommand)]` shape, narrowed to
//! the five commands the pipeline actually exposes.

use crate::command::{Command, IdKind, RunMode};
use crate::contracts::{ExternalId, Source};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "gc", version, about = "catalog-reconciler admin CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Run the selected command without writing to the database.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SourceArg {
    Store,
    Meta,
}

impl From<SourceArg> for Source {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Store => Source::Store,
            SourceArg::Meta => Source::Meta,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum IdKindArg {
    StoreAppId,
    MetaId,
}

impl From<IdKindArg> for IdKind {
    fn from(value: IdKindArg) -> Self {
        match value {
            IdKindArg::StoreAppId => IdKind::StoreAppId,
            IdKindArg::MetaId => IdKind::MetaId,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RunModeArg {
    Incremental,
    Full,
}

impl From<RunModeArg> for RunMode {
    fn from(value: RunModeArg) -> Self {
        match value {
            RunModeArg::Incremental => RunMode::Incremental,
            RunModeArg::Full => RunMode::Full,
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum Commands {
    /// Refresh up to `limit` games the candidate selector judges due for a
    /// recheck.
    RefreshWindow {
        #[arg(long, default_value_t = 500)]
        limit: u32,
    },
    /// Ingest Store (and, in `full` mode, Meta) ids not yet present in the
    /// catalog.
    IngestNew {
        #[arg(long, value_enum, default_value = "incremental")]
        mode: RunModeArg,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Process exactly one external id, against one or more sources.
    Single {
        #[arg(long, value_enum)]
        id_kind: IdKindArg,
        #[arg(long)]
        external_id: String,
        /// Source(s) to call; repeat the flag for more than one.
        #[arg(long = "source", value_enum, num_args = 1..)]
        sources: Vec<SourceArg>,
    },
    /// Walk the entire upstream catalog, paginated.
    FullRefresh {
        #[arg(long, value_enum, default_value = "incremental")]
        mode: RunModeArg,
        #[arg(long, default_value_t = 500)]
        page_size: u32,
    },
    /// Backfill `game_details`/`game_releases` for games missing one.
    BackfillDetails {
        #[arg(long, default_value_t = 200)]
        limit: u32,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
}

impl Commands {
    pub fn into_command(self) -> Command {
        match self {
            Commands::RefreshWindow { limit } => Command::RefreshWindow { limit },
            Commands::IngestNew { mode, limit } => Command::IngestNew {
                mode: mode.into(),
                limit,
            },
            Commands::Single {
                id_kind,
                external_id,
                sources,
            } => Command::Single {
                id_kind: id_kind.into(),
                external_id: ExternalId(external_id),
                sources: if sources.is_empty() {
                    vec![Source::Store, Source::Meta]
                } else {
                    sources.into_iter().map(Source::from).collect()
                },
            },
            Commands::FullRefresh { mode, page_size } => Command::FullRefresh {
                mode: mode.into(),
                page_size,
            },
            Commands::BackfillDetails { limit, concurrency } => Command::BackfillDetails {
                limit,
                concurrency,
            },
        }
    }
}
