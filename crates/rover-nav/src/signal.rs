use tokio::sync::watch;

/// Fires the stop signal. Dropping the handle without calling `stop` does not stop anything.
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// External stop request (user interrupt) observed by the navigator.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn new() -> (StopHandle, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (StopHandle(tx), StopSignal(rx))
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once `stop` is called; pending forever if the handle is gone.
    pub async fn stopped(&mut self) {
        let fired = self.0.wait_for(|s| *s).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}
