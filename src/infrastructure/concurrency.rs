//! Worker pool sizing for inlining sessions.
//! Independent call graph groups are decided on a local rayon pool so a
//! session never touches the global pool of its host.

use rayon::{ThreadPool, ThreadPoolBuildError};

/// Default worker count: half the cores, minimum 1.
pub fn default_workers() -> usize {
    std::cmp::max(1, num_cpus::get() / 2)
}

/// Build a local pool with `threads` workers (or the default).
pub fn build_pool(threads: Option<usize>) -> Result<ThreadPool, ThreadPoolBuildError> {
    let workers = threads.unwrap_or_else(default_workers).max(1);
    tracing::debug!(workers, cores = num_cpus::get(), "building inlining worker pool");
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("xmod-inline-{}", i))
        .build()
}
