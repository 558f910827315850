//! `walink pair`: run one pairing session in the foreground.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use wl_core::pairing::RenderHint;
use wl_core::{Generation, OwnerId, PairingCode, SessionNotice, SessionState, SessionUpdate};

use crate::bootstrap::AppRuntime;
use crate::webhook_server;

pub async fn run_pair(
    runtime: &AppRuntime,
    owner: OwnerId,
    listen: Option<SocketAddr>,
) -> anyhow::Result<()> {
    if runtime.registry.cleanup_stale(&owner).await? {
        tracing::info!(%owner, "removed stale pairing session");
    }

    let receiver = match listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind webhook receiver on {addr}"))?;
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let task = tokio::spawn(webhook_server::serve(
                listener,
                runtime.registry.clone(),
                async move {
                    stop_rx.await.ok();
                },
            ));
            Some((stop_tx, task))
        }
        None => None,
    };

    let result = drive_session(runtime, &owner).await;

    if let Some((stop_tx, task)) = receiver {
        let _ = stop_tx.send(());
        match task.await {
            Ok(Err(err)) => tracing::warn!(error = %err, "webhook receiver stopped with error"),
            Err(err) => tracing::warn!(error = %err, "webhook receiver task failed"),
            Ok(Ok(())) => {}
        }
    }

    result
}

async fn drive_session(runtime: &AppRuntime, owner: &OwnerId) -> anyhow::Result<()> {
    let handle = runtime
        .registry
        .create(owner.clone())
        .await
        .context("Failed to create pairing session")?;
    println!("Pairing session {} started", handle.session_id());

    let code_path = runtime.pairing_code_path();
    let mut last_written: Option<Generation> = None;
    let mut observer = handle.observe().await;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = observer.next() => {
                let Some(update) = update else { break };
                print_update(&update);

                if let Some(code) = &update.pairing_code {
                    if last_written != Some(update.generation) {
                        let path = write_pairing_code(&code_path, code).await?;
                        println!("Scan the pairing code at {}", path.display());
                        last_written = Some(update.generation);
                    }
                }

                if update.state.is_terminal() {
                    runtime.registry.remove(owner).await;
                    break;
                }
            }
            _ = &mut ctrl_c => {
                if handle.snapshot().state == SessionState::Connected {
                    println!("Leaving the linked account connected");
                    runtime.registry.remove(owner).await;
                } else {
                    println!("Interrupted, disconnecting");
                    runtime.registry.disconnect(owner).await?;
                }
                break;
            }
        }
    }

    Ok(())
}

fn print_update(update: &SessionUpdate) {
    println!(
        "[{}] state={:?} generation={}",
        update.session_id, update.state, update.generation
    );
    if let Some(notice) = &update.notice {
        println!("  {}", describe_notice(notice));
    }
}

fn describe_notice(notice: &SessionNotice) -> String {
    match notice {
        SessionNotice::CreationFailed { reason } => format!("creation failed: {reason}"),
        SessionNotice::RefreshFailed { reason } => format!("refresh failed: {reason}"),
        SessionNotice::CodeExpired { reason } => {
            format!("pairing code expired ({reason}), run again to retry")
        }
        SessionNotice::NotificationFailed { reason } => {
            format!("welcome message not delivered: {reason}")
        }
        SessionNotice::PairingTimedOut => "pairing timed out".to_string(),
        SessionNotice::ConnectionLost => "connection lost".to_string(),
    }
}

/// Write the code next to `png_path`: decoded PNG, or raw text for text codes.
async fn write_pairing_code(png_path: &Path, code: &PairingCode) -> anyhow::Result<PathBuf> {
    if let Some(parent) = png_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let (path, bytes) = match code.render_hint {
        RenderHint::PngBase64 => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(code.payload.trim())
                .context("Pairing code is not valid base64")?;
            (png_path.to_path_buf(), bytes)
        }
        RenderHint::Text => (
            png_path.with_extension("txt"),
            code.payload.clone().into_bytes(),
        ),
    };

    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
