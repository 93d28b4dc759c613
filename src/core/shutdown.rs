//! # Termination signals.
//!
//! [`wait_for_signal`] resolves with the [`Signal`] that asked the process to stop.
//! `Engine::run_until_signal` records its name as the reason of the
//! `ShutdownRequested` event.
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`.
//! **Windows:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    Interrupt,
    #[cfg_attr(not(unix), allow(dead_code))]
    Terminate,
    #[cfg_attr(not(unix), allow(dead_code))]
    Quit,
}

impl Signal {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Signal::Interrupt => "sigint",
            Signal::Terminate => "sigterm",
            Signal::Quit => "sigquit",
        }
    }
}

/// Waits for the first termination signal.
///
/// Returns `Err` if a handler cannot be installed.
#[cfg(unix)]
pub(crate) async fn wait_for_signal() -> std::io::Result<Signal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        _ = interrupt.recv() => Signal::Interrupt,
        _ = terminate.recv() => Signal::Terminate,
        _ = quit.recv() => Signal::Quit,
    };
    Ok(received)
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_signal() -> std::io::Result<Signal> {
    tokio::signal::ctrl_c().await.map(|()| Signal::Interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names_are_stable() {
        assert_eq!(Signal::Interrupt.as_str(), "sigint");
        assert_eq!(Signal::Terminate.as_str(), "sigterm");
        assert_eq!(Signal::Quit.as_str(), "sigquit");
    }
}
