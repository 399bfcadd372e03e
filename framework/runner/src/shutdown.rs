use crosswind_core::prelude::ShutdownHandle;
use tokio::signal;

/// Listen for Ctrl-C.
///
/// The first signal asks the scenario to stop gracefully: no new iterations start and in-flight
/// ones get the scenario's graceful stop period. A second signal aborts the run, cancelling
/// anything still in flight.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
    stop_handle: ShutdownHandle,
    abort_handle: ShutdownHandle,
) {
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C, the run can only end on schedule: {e:?}");
            return;
        }
        println!("Received shutdown signal, stopping gracefully. Press Ctrl-C again to abort.");
        stop_handle.shutdown();

        if signal::ctrl_c().await.is_ok() {
            println!("Received second shutdown signal, aborting...");
            abort_handle.shutdown();
        }
    });
}
