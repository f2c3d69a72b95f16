use clap::Parser;

/// Loader process configuration. Field names and defaults mirror
/// spec.md §6's configuration parameter table; the final group is ambient
/// (logging, namespacing, and the reorder on/off switch) and does not
/// change the meaning of any named parameter.
#[derive(Debug, Clone, Parser)]
#[command(name = "loader", about = "Multi-process asynchronous bulk file loader")]
pub struct LoaderConfig {
    /// Entries per worker queue; bounds outstanding requests per worker.
    #[arg(long, default_value_t = 16)]
    pub queue_depth: u32,

    /// Advisory upper bound, in bytes, on a single read. Oversized files
    /// are rejected with `LoadError::FileTooLarge` before being submitted.
    #[arg(long, default_value_t = 1 << 30)]
    pub max_file_size: u64,

    /// Number of independent worker queues to create.
    #[arg(long, default_value_t = 1)]
    pub n_workers: u32,

    /// Batch trigger size for the reorder path.
    #[arg(long, default_value_t = 32)]
    pub dispatch_n: usize,

    /// Idle-drain threshold per worker, used only when `--reorder` is set.
    #[arg(long, default_value_t = 16)]
    pub max_idle_iters: u32,

    /// Turn on the optional LBA-sorted reorder/batch path (spec §4.6).
    /// Without this flag the reader always takes the direct path.
    #[arg(long, default_value_t = false)]
    pub reorder: bool,

    /// Use O_DIRECT when opening files for read.
    #[arg(long, default_value_t = false)]
    pub direct_io: bool,

    /// Depth of the io_uring submission/completion rings.
    #[arg(long, default_value_t = 128)]
    pub ring_entries: u32,

    /// Prefix folded into every worker-queue segment name and every
    /// per-request shared-memory object name, so multiple loader
    /// instances on one host don't collide on `/dev/shm`.
    #[arg(long)]
    pub shm_namespace: Option<String>,

    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or `debug`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl LoaderConfig {
    pub fn open_flags(&self) -> nix::fcntl::OFlag {
        let mut flags = nix::fcntl::OFlag::O_RDONLY;
        if self.direct_io {
            flags |= nix::fcntl::OFlag::O_DIRECT;
        }
        flags
    }

    /// Name of worker `worker_id`'s queue segment.
    pub fn queue_name(&self, worker_id: u32) -> String {
        match &self.shm_namespace {
            Some(ns) => format!("/{ns}_queue_w{worker_id}"),
            None => format!("/queue_w{worker_id}"),
        }
    }
}
