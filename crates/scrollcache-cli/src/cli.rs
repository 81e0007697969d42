use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "scrollcache",
    version,
    about = "Offline-capable chapter reader backed by a versioned response cache"
)]
pub struct Cli {
    /// Worker config file (JSON). Defaults to the user config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Origin serving the app, e.g. https://reader.example.org/app/
    #[arg(long, env = "SCROLLCACHE_ORIGIN", global = true)]
    pub origin: Option<String>,

    /// Directory holding the cache partitions
    #[arg(long, env = "SCROLLCACHE_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Never touch the network; serve from cache or fallbacks only
    #[arg(long, global = true)]
    pub offline: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pre-populate the cache and activate the current version
    Install,
    /// Print one chapter
    Read { book: String, chapter: u32 },
    /// Fetch any path under the origin through the cache policies
    Fetch {
        path: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
    },
    /// Cache administration
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List partitions with entry counts and ages
    Status,
    /// List the books and their chapter counts
    Books,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum CacheAction {
    /// Total number of cached entries
    Size,
    /// Delete every partition
    Clear,
    /// Re-fetch the shell and all chapters
    Update,
}
