use tokio::signal;

pub(crate) use stampede_core::prelude::{
    DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError,
};

/// Raise the returned handle when the process receives Ctrl-C.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, the run can only be stopped by its stages: {e}");
            return;
        }
        listener_handle.shutdown();
        println!("Received shutdown signal, letting virtual users finish their current iteration...");
    });

    handle
}
