//! Dedicated worker pool for kernel launches.
//!
//! Kernels are plain rayon code and run on the global pool when called
//! directly. A [`KernelLauncher`] pins them to its own pool instead, times
//! each launch and turns a worker panic into [`SphError::KernelPanicked`] so
//! the driver never consumes a partially written output.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{SphError, SphResult};

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Worker threads, zero picks one per logical CPU
    pub worker_threads: usize,
    pub thread_name: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            thread_name: "sph-worker".to_string(),
        }
    }
}

impl LaunchConfig {
    pub fn threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

/// Runs kernels on a private rayon pool
pub struct KernelLauncher {
    config: LaunchConfig,
    thread_pool: rayon::ThreadPool,
    launches: u64,
}

impl KernelLauncher {
    pub fn new(config: LaunchConfig) -> SphResult<Self> {
        let prefix = config.thread_name.clone();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads())
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| SphError::Launch {
                message: e.to_string(),
            })?;

        log::info!("[launch] kernel pool ready with {} threads", thread_pool.current_num_threads());
        Ok(Self {
            config,
            thread_pool,
            launches: 0,
        })
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn threads(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Number of launches issued so far
    pub fn launches(&self) -> u64 {
        self.launches
    }

    /// Run `kernel` on the pool and wait for it.
    ///
    /// A panic in any worker is reported as [`SphError::KernelPanicked`].
    pub fn run<R, F>(&mut self, label: &str, kernel: F) -> SphResult<R>
    where
        R: Send,
        F: FnOnce() -> SphResult<R> + Send,
    {
        self.launches += 1;
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.thread_pool.install(kernel)));
        let elapsed = start.elapsed().as_micros();

        match result {
            Ok(Ok(value)) => {
                log::debug!("[launch] {} finished in {}us", label, elapsed);
                Ok(value)
            }
            Ok(Err(e)) => {
                log::debug!("[launch] {} rejected after {}us: {}", label, elapsed, e);
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("[launch] {} panicked: {}", label, message);
                Err(SphError::KernelPanicked {
                    label: label.to_string(),
                    message,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
