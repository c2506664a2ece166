//! Sized rayon pools for feature building and backtest folds.

use tracing::warn;

/// Where parallel work runs: a dedicated pool, or rayon's global one.
#[derive(Debug, Default)]
pub struct WorkerPool {
    dedicated: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    /// A dedicated pool of `threads` workers. Zero, or a pool that fails to start, means the
    /// global pool.
    pub fn sized(threads: usize) -> Self {
        if threads == 0 {
            return Self::global();
        }
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Self {
                dedicated: Some(pool),
            },
            Err(err) => {
                warn!(threads, error = %err, "could not start worker pool, using the global one");
                Self::global()
            }
        }
    }

    pub fn global() -> Self {
        Self::default()
    }

    pub fn threads(&self) -> usize {
        match &self.dedicated {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `work` so that its `par_iter` calls use this pool.
    pub fn run<T: Send>(&self, work: impl FnOnce() -> T + Send) -> T {
        match &self.dedicated {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::WorkerPool;

    #[test]
    fn sized_pool_runs_parallel_work_on_its_own_threads() {
        let pool = WorkerPool::sized(2);
        assert_eq!(pool.threads(), 2);
        let (sum, inside) = pool.run(|| {
            let sum: u64 = (1..=100u64).into_par_iter().sum();
            (sum, rayon::current_num_threads())
        });
        assert_eq!(sum, 5050);
        assert_eq!(inside, 2);
        assert_eq!(WorkerPool::sized(0).threads(), rayon::current_num_threads());
    }
}
