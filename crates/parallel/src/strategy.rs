//! Processing strategies for independent units of work

use covershift_core::{Error, Result};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Processing mode for block-wise stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing on the global rayon pool
    #[default]
    Parallel,
    /// Parallel on a dedicated pool with the given number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Mode for a `--threads`-style setting: `Some(1)` is sequential,
    /// `Some(n)` a dedicated pool, `None` the global pool.
    pub fn from_threads(threads: Option<usize>) -> Self {
        match threads {
            Some(0) | None => ProcessingMode::Parallel,
            Some(1) => ProcessingMode::Sequential,
            Some(n) => ProcessingMode::ParallelWith(n),
        }
    }
}

/// Strategy for mapping a function over independent items.
///
/// Results are returned in input order regardless of how the work was
/// scheduled.
pub trait ParallelStrategy {
    /// Map `f` over `items`, stopping at the first failure observed.
    ///
    /// When several items fail concurrently, which error is reported is unspecified.
    fn try_map<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T> + Sync + Send;
}

/// Executes work according to a [`ProcessingMode`].
///
/// A dedicated thread pool for `ParallelWith` is built once and reused for
/// every call.
pub struct Executor {
    mode: ProcessingMode,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub fn new(mode: ProcessingMode) -> Result<Self> {
        #[cfg(feature = "parallel")]
        {
            let pool = match mode {
                ProcessingMode::ParallelWith(threads) => Some(
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(threads)
                        .build()
                        .map_err(|e| Error::Other(format!("cannot build thread pool: {}", e)))?,
                ),
                _ => None,
            };
            Ok(Self { mode, pool })
        }
        #[cfg(not(feature = "parallel"))]
        {
            Ok(Self { mode })
        }
    }

    /// Mode requested at construction
    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Number of worker threads the executor runs on
    pub fn threads(&self) -> usize {
        #[cfg(feature = "parallel")]
        {
            match (&self.mode, &self.pool) {
                (ProcessingMode::Sequential, _) => 1,
                (_, Some(pool)) => pool.current_num_threads(),
                (_, None) => rayon::current_num_threads(),
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            1
        }
    }
}

impl ParallelStrategy for Executor {
    fn try_map<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T> + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            match (&self.mode, &self.pool) {
                (ProcessingMode::Sequential, _) => items.into_iter().map(f).collect(),
                (_, Some(pool)) => pool.install(|| items.into_par_iter().map(f).collect()),
                (_, None) => items.into_par_iter().map(f).collect(),
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            items.into_iter().map(f).collect()
        }
    }
}

/// Configure the global thread pool
pub fn set_num_threads(threads: usize) -> Result<()> {
    #[cfg(feature = "parallel")]
    {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| Error::Other(format!("cannot configure global thread pool: {}", e)))
    }
    #[cfg(not(feature = "parallel"))]
    {
        let _ = threads;
        Ok(())
    }
}
