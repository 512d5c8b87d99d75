use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parley_core::models::Conversation;
use parley_core::{BridgeOutcome, ChatRuntime, CoreConfig, NoticeKind};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a send waits for its echo before the process exits.
const ECHO_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub enum CliCommand {
    Inbox,
    History { peer: String },
    Send { peer: String, text: String },
    SendImage { peer: String, file: PathBuf },
    Read { peer: String },
    Delete { peer: String },
    Watch,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InboxView<'a> {
    total_unread: u32,
    conversations: &'a [Conversation],
}

pub async fn run_command(command: CliCommand, config: CoreConfig, pretty: bool) -> Result<()> {
    let mut runtime = ChatRuntime::connect(config).context("Failed to start chat session")?;
    let result = execute(&mut runtime, command, pretty).await;
    runtime.shutdown();
    result
}

async fn execute(runtime: &mut ChatRuntime, command: CliCommand, pretty: bool) -> Result<()> {
    match command {
        CliCommand::Inbox => {
            runtime.session().refresh_inbox().await?;
            print_inbox(runtime, pretty)
        }
        CliCommand::History { peer } => {
            runtime.session().open_conversation(&peer).await?;
            print_json(&runtime.session().snapshot().thread, pretty)
        }
        CliCommand::Send { peer, text } => {
            wait_connected(runtime).await?;
            open_for_send(runtime, &peer).await;
            let delivery = runtime.session().send_text(&text)?;
            let echoed = wait_for_echo(runtime).await;
            print_json(&json!({ "peer": peer, "delivery": delivery, "echoed": echoed }), pretty)
        }
        CliCommand::SendImage { peer, file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read image: {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .context("Image path has no file name")?
                .to_string();
            wait_connected(runtime).await?;
            open_for_send(runtime, &peer).await;
            let delivery = runtime
                .session()
                .send_image(&file_name, mime_type(&file_name), bytes)
                .await?;
            print_json(&json!({ "peer": peer, "delivery": delivery }), pretty)
        }
        CliCommand::Read { peer } => {
            runtime.session().refresh_inbox().await?;
            runtime.session().mark_read(&peer).await?;
            print_inbox(runtime, pretty)
        }
        CliCommand::Delete { peer } => {
            runtime.session().refresh_inbox().await?;
            runtime.session().delete_conversation(&peer).await?;
            print_inbox(runtime, pretty)
        }
        CliCommand::Watch => watch(runtime, pretty).await,
    }
}

/// Print badge changes and notices until interrupted.
async fn watch(runtime: &mut ChatRuntime, pretty: bool) -> Result<()> {
    let mut updates = runtime.session().subscribe();
    let mut notices = runtime.session().notices();
    let mut last_unread = None;

    let printer = async {
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    if last_unread != Some(snapshot.total_unread) {
                        last_unread = Some(snapshot.total_unread);
                        let line = json!({
                            "totalUnread": snapshot.total_unread,
                            "connected": snapshot.connected,
                            "conversations": snapshot.conversations.len(),
                        });
                        if let Err(e) = print_json(&line, pretty) {
                            warn!("Failed to print update: {}", e);
                        }
                    }
                }
                notice = notices.recv() => {
                    match notice {
                        Ok(notice) => {
                            let kind = match notice.kind {
                                NoticeKind::NetworkFailure => "network",
                                NoticeKind::ChannelDisconnect => "disconnected",
                                NoticeKind::Validation => "validation",
                            };
                            let line = json!({
                                "notice": kind,
                                "operation": notice.operation.to_string(),
                                "message": notice.message,
                            });
                            if let Err(e) = print_json(&line, pretty) {
                                warn!("Failed to print notice: {}", e);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Notice receiver lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
        }
    };

    tokio::select! {
        _ = runtime.run(shutdown) => {}
        _ = printer => {}
    }
    Ok(())
}

async fn wait_connected(runtime: &mut ChatRuntime) -> Result<()> {
    let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while !runtime.session().is_connected() {
            if runtime.next_event().await.is_none() {
                return false;
            }
        }
        true
    })
    .await;
    match connected {
        Ok(true) => Ok(()),
        _ => bail!("Could not connect to the push channel"),
    }
}

/// Open (or create) the conversation. A failed history load does not block sending.
async fn open_for_send(runtime: &ChatRuntime, peer: &str) {
    if let Err(e) = runtime.session().start_conversation(peer, None).await {
        warn!(%peer, "Could not load history: {}", e);
    }
}

async fn wait_for_echo(runtime: &mut ChatRuntime) -> bool {
    let echoed = tokio::time::timeout(ECHO_TIMEOUT, async {
        while let Some(outcome) = runtime.next_event().await {
            if outcome == BridgeOutcome::Echo {
                return true;
            }
        }
        false
    })
    .await;
    matches!(echoed, Ok(true))
}

fn mime_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn print_inbox(runtime: &ChatRuntime, pretty: bool) -> Result<()> {
    let snapshot = runtime.session().snapshot();
    print_json(
        &InboxView {
            total_unread: snapshot.total_unread,
            conversations: &snapshot.conversations,
        },
        pretty,
    )
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type("cat.PNG"), "image/png");
        assert_eq!(mime_type("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_type("archive"), "application/octet-stream");
    }
}
