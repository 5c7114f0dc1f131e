//! Turns SIGINT/SIGTERM into a cancellation of the running validation.
//!
//! The polling loop is blocking, so the signal listener runs on its own
//! thread with a single-threaded runtime. Once a handler is registered the
//! signal no longer terminates the process; the loop observes the token,
//! stops polling and still runs the scenario's cleanup.

use std::future::Future;
use std::io;
use std::thread;

use tokio::runtime::{Builder, Runtime};
use tracing::warn;
use vkcheck_core::CancellationToken;

#[cfg(unix)]
struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}

fn listener_runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// Cancel `token` on the first SIGINT or SIGTERM.
pub fn cancel_on_shutdown(token: CancellationToken) -> io::Result<()> {
    let runtime = listener_runtime()?;
    // Handlers are installed before returning so a signal that arrives while
    // the first round runs is not lost.
    let signals = runtime.block_on(async { ShutdownSignals::register() })?;
    cancel_when(runtime, signals.recv(), token)
}

/// Cancel `token` once `trigger` resolves, driving it on a background thread.
fn cancel_when<F>(runtime: Runtime, trigger: F, token: CancellationToken) -> io::Result<()>
where
    F: Future<Output = &'static str> + Send + 'static,
{
    thread::Builder::new()
        .name("vkcheck-signals".to_string())
        .spawn(move || {
            let signal = runtime.block_on(trigger);
            warn!(signal, "Shutdown requested, stopping validation and cleaning up");
            token.cancel();
        })?;
    Ok(())
}
