use std::future::Future;
use std::time::Duration;

use crosswind_core::prelude::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    abort_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, abort_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            abort_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the run is aborted. You do not need to do anything
    /// special to handle this, but you should be aware that submitting a future which does not support
    /// cancelling may prevent the runner from shutting down.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut abort_listener = self.abort_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = abort_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// As [Executor::execute_in_place], but the future is also cancelled when `interrupt` fires.
    ///
    /// This is how a single VU's in-flight iteration is cut short once its grace period is over.
    pub(crate) fn execute_interruptible<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
        mut interrupt: DelegatedShutdownListener,
    ) -> anyhow::Result<T> {
        self.execute_in_place(async move {
            tokio::select! {
                result = fut => result,
                _ = interrupt.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Sleep for `duration` without holding up the runtime. Cancelled like any other future passed
    /// to [Executor::execute_in_place].
    pub fn sleep(&self, duration: Duration) -> anyhow::Result<()> {
        self.execute_in_place(async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }

    /// Submit async code to be run in the background.
    ///
    /// Note that the future will not be cancelled if the run is aborted. It is also not guaranteed
    /// that the runner will wait for the future to complete before shutting down.
    ///
    /// In VU behaviour hooks, you should use [Executor::execute_in_place] instead of [Executor::spawn]
    /// so that your future completes before the iteration completes and is scheduled again.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> (Executor, ShutdownHandle) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let abort = ShutdownHandle::new();
        (Executor::new(runtime, abort.clone()), abort)
    }

    #[test]
    fn execute_returns_future_result() {
        let (executor, _) = executor();
        assert_eq!(5, executor.execute_in_place(async { Ok(5) }).unwrap());
    }

    #[test]
    fn abort_cancels_in_flight_future() {
        let (executor, abort) = executor();
        abort.shutdown();

        let result = executor.execute_in_place(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        assert!(result.unwrap_err().is::<ShutdownSignalError>());
    }

    #[test]
    fn interrupt_cancels_only_its_own_future() {
        let (executor, _) = executor();
        let interrupt = ShutdownHandle::new();
        interrupt.shutdown();

        let result = executor.execute_interruptible(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            interrupt.new_listener(),
        );
        assert!(result.unwrap_err().is::<ShutdownSignalError>());

        assert!(executor.sleep(Duration::from_millis(1)).is_ok());
    }
}
