//! areawm
//!
//! A reparenting X11 window manager.

mod x11_async;

use std::os::unix::process::CommandExt;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use areawm::config::Config;
use areawm::wm::conn::XConn;
use areawm::wm::display::Display;
use areawm::wm::ui::LoggingUi;
use areawm::wm::x11::X11Conn;

use x11_async::X11EventStream;

/// Handle everything queued, then fire due timers and flush
fn dispatch_pending(display: &mut Display<X11Conn>) -> Result<()> {
    while let Some((event, serial)) = display.conn.poll_event()? {
        if let Err(e) = display.handle_event(&event, serial) {
            warn!("Event handling failed: {:#}", e);
        }
        if display.quit_requested() {
            break;
        }
    }
    if let Err(e) = display.run_timers() {
        warn!("Timer handling failed: {:#}", e);
    }
    display.conn.flush()
}

async fn run(display: &mut Display<X11Conn>, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
    let stream = X11EventStream::new(display.conn.connection())?;
    info!("Starting main event loop");

    loop {
        dispatch_pending(display)?;
        if display.quit_requested() {
            info!("Quit requested, leaving main loop");
            return Ok(());
        }

        let deadline = display.next_deadline();
        tokio::select! {
            () = stream.wait_readable() => {}
            _ = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                    None => std::future::pending::<()>().await,
                }
            } => {}
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, cleaning up...");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "areawm=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting areawm");

    let args: Vec<String> = std::env::args().collect();
    let replace = args.iter().any(|arg| arg == "--replace" || arg == "-r");
    if replace {
        info!("--replace flag detected: will attempt to replace existing WM");
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            let _ = tx.send(()).await;
        });
    }

    let config = Config::load()?;
    let settings = config.window_manager;
    let ui = Box::new(LoggingUi::new(settings.frame));
    let mut display = Display::open(settings, ui, replace).context("Failed to open display")?;

    let result = run(&mut display, shutdown_rx).await;
    if let Err(e) = &result {
        error!("Application error: {:#}", e);
    }

    if let Err(e) = display.close(x11rb::CURRENT_TIME) {
        warn!("Failed to close display cleanly: {:#}", e);
    }

    if result.is_ok() && display.restart_requested() {
        info!("Restarting");
        let exe = std::env::current_exe().context("Failed to locate own executable")?;
        let err = std::process::Command::new(exe).args(args.iter().skip(1)).exec();
        return Err(err).context("Failed to restart");
    }
    result
}
