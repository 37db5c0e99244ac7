//! Thread-pool setup for batch analysis.

use anyhow::Result;

/// Initialize the global rayon thread pool.
/// `jobs` defaults to one worker per core; at least one worker is used.
pub fn init_thread_pool(jobs: Option<usize>) -> Result<usize> {
    let cores = num_cpus::get();
    let workers = jobs.unwrap_or(cores).max(1);

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()?;

    log::debug!("initialized thread pool: {} workers (system has {} cores)", workers, cores);

    Ok(workers)
}
