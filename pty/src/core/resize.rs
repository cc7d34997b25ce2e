use std::io;
use std::pin::pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use portable_pty::PtySize;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Anything whose window size follows the controlling terminal.
pub trait ResizeTarget: Send + Sync {
    fn resize(&self, size: PtySize) -> anyhow::Result<()>;
}

/// Deliveries of one signal as a stream. The handler is installed before
/// this returns.
pub fn signal_notifications(kind: SignalKind) -> io::Result<impl Stream<Item = ()>> {
    let incoming = signal(kind)?;
    Ok(futures::stream::unfold(incoming, |mut incoming| async move {
        incoming.recv().await.map(|()| ((), incoming))
    }))
}

/// SIGWINCH notifications as a stream.
pub fn window_changes() -> io::Result<impl Stream<Item = ()>> {
    signal_notifications(SignalKind::window_change())
}

/// Applies the current size once, then again on every notification.
///
/// Runs regardless of interactions so a menu never leaves the PTY with a stale
/// geometry.
pub async fn forward_resizes<S, F>(
    target: Arc<dyn ResizeTarget>,
    current_size: F,
    notifications: S,
    cancel: CancellationToken,
) where
    S: Stream<Item = ()>,
    F: Fn() -> PtySize,
{
    let mut notifications = pin!(notifications);
    apply(target.as_ref(), current_size());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = notifications.next() => match next {
                Some(()) => apply(target.as_ref(), current_size()),
                None => break,
            },
        }
    }
}

fn apply(target: &dyn ResizeTarget, size: PtySize) {
    if let Err(err) = target.resize(size) {
        debug!(error = %err, "failed to resize pty");
    }
}
