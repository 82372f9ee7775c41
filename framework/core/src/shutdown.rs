use std::sync::Arc;

use tokio::sync::watch::{self, Receiver, Sender};

/// A stop signal that can be raised once and observed by any number of listeners.
///
/// The signal is level-triggered: once [ShutdownHandle::shutdown] has been called, every listener
/// reports it on every check, including listeners created after the fact.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        // `send_replace` succeeds even when nobody is listening yet.
        let already_shutdown = self.sender.send_replace(true);
        if !already_shutdown {
            log::trace!("Shutdown signal raised");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been raised. If this returns true then work
    /// should be stopped at the next safe point.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait for the shutdown signal to be raised. It is safe to race this with another future so
    /// that the shutdown signal can be used to cut a wait short.
    ///
    /// Returns immediately if the signal was raised before this call, or if the owning
    /// [ShutdownHandle] has been dropped.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|stopped| *stopped).await.is_err() {
            log::trace!("Shutdown handle dropped while waiting for shutdown");
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
