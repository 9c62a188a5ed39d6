//! X11 Async Event Stream
//!
//! Readiness notification for the X connection's socket. A mio poller on a
//! blocking thread wakes the main loop, which then drains events through
//! [`areawm::wm::x11::X11Conn::poll_event`].

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{oneshot, Notify};
use x11rb::rust_connection::RustConnection;

/// Wakes the event loop when the X socket becomes readable
pub struct X11EventStream {
    notify: Arc<Notify>,
    _task_guard: oneshot::Receiver<()>,
}

impl X11EventStream {
    /// Start polling the connection's file descriptor
    ///
    /// The polling thread exits once the stream is dropped.
    pub fn new(conn: &Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        let (guard, task_guard) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);

        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), mio::Token(0), mio::Interest::READABLE)
            .context("Failed to register X11 FD with mio")?;

        let timeout = Duration::from_millis(100);
        tokio::task::spawn_blocking(move || loop {
            if guard.is_closed() {
                tracing::info!("X11: socket polling thread shutting down");
                return;
            }

            if let Err(err) = poll.poll(&mut events, Some(timeout)) {
                tracing::warn!("X11: socket poll failed: {:?}", err);
                continue;
            }

            events
                .iter()
                .filter(|event| event.token() == mio::Token(0))
                .for_each(|_| task_notify.notify_one());
        });

        Ok(Self {
            notify,
            _task_guard: task_guard,
        })
    }

    /// Wait until the X socket has data
    pub async fn wait_readable(&self) {
        self.notify.notified().await;
    }
}
