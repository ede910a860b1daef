use std::io;

use tokio::runtime::{Builder, Handle, Runtime};

/// Tokio runtime owned by one store. It drives the pressure monitor and
/// runs timed disk reads on a bounded blocking pool.
pub(crate) struct StoreRuntime {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl StoreRuntime {
    pub(crate) fn new(blocking_threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(blocking_threads.max(1))
            .thread_name("crs-runtime")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True when the calling thread is already inside some tokio runtime,
    /// where blocking on this one would panic.
    pub(crate) fn in_async_context() -> bool {
        Handle::try_current().is_ok()
    }
}

impl Drop for StoreRuntime {
    fn drop(&mut self) {
        // The last store handle may be dropped from async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for StoreRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRuntime").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn runs_blocking_work_with_a_deadline() {
        let rt = StoreRuntime::new(2).unwrap();
        let quick = rt.handle().block_on(async {
            tokio::time::timeout(Duration::from_secs(5), tokio::task::spawn_blocking(|| 7)).await
        });
        assert_eq!(quick.unwrap().unwrap(), 7);

        let slow = rt.handle().block_on(async {
            let sleeper =
                tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(200)));
            tokio::time::timeout(Duration::from_millis(10), sleeper).await
        });
        assert!(slow.is_err());
    }

    #[test]
    fn detects_async_context() {
        assert!(!StoreRuntime::in_async_context());
        let rt = StoreRuntime::new(1).unwrap();
        assert!(rt.handle().block_on(async { StoreRuntime::in_async_context() }));
    }

    #[test]
    fn drops_inside_async_code() {
        let outer = StoreRuntime::new(1).unwrap();
        let inner = StoreRuntime::new(1).unwrap();
        outer.handle().block_on(async move { drop(inner) });
    }
}
