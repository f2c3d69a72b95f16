//! A minimal worker process: requests every path given on the command
//! line, spins until each is ready, prints its size, and releases it.

use clap::Parser;
use worker::WorkerQueue;

#[derive(Parser)]
struct Args {
    /// Name of the queue segment created by the loader for this worker.
    #[arg(long)]
    queue_name: String,

    /// Filepaths to load, in order.
    paths: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let queue = WorkerQueue::attach(&args.queue_name)?;

    let mut pending = 0usize;
    for path in &args.paths {
        if queue.try_request(path.as_bytes())? {
            pending += 1;
        } else {
            tracing::warn!(path, "free list empty, skipping");
        }
    }

    while pending > 0 {
        match queue.try_get()? {
            Some(loaded) => {
                let path = String::from_utf8_lossy(&loaded.path()).into_owned();
                println!("{path}: {} bytes", loaded.size());
                loaded.release();
                pending -= 1;
            }
            None => std::thread::yield_now(),
        }
    }

    Ok(())
}
