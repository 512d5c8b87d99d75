use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChannelEvent, ClientEvent, ServerEvent};
use crate::constants::PUSH_EVENT_BUFFER;
use crate::error::ChatError;

/// Something that can carry client → server push events.
pub trait PushChannel {
    fn emit(&self, event: ClientEvent) -> Result<(), ChatError>;
}

/// Session-side handle of a running `SocketPushClient`.
#[derive(Clone)]
pub struct PushHandle {
    outbound_tx: mpsc::UnboundedSender<ClientEvent>,
}

impl PushChannel for PushHandle {
    fn emit(&self, event: ClientEvent) -> Result<(), ChatError> {
        self.outbound_tx
            .send(event)
            .map_err(|_| ChatError::ChannelDisconnected)
    }
}

enum PumpExit {
    /// Connection lost; frames that could not be written.
    Lost(Vec<ClientEvent>),
    /// The session dropped its handle or its receiver.
    Shutdown,
}

/// Client for the push channel: one JSON event per line over TCP.
/// Reconnects automatically if the connection is lost.
pub struct SocketPushClient {
    address: String,
    reconnect_delay: Duration,
}

impl SocketPushClient {
    pub fn new(address: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            address: address.into(),
            reconnect_delay,
        }
    }

    /// Start the client on its own task.
    pub fn spawn(self) -> (PushHandle, mpsc::Receiver<ChannelEvent>, JoinHandle<()>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(PUSH_EVENT_BUFFER);
        let task = tokio::spawn(self.run(event_tx, outbound_rx));
        (PushHandle { outbound_tx }, event_rx, task)
    }

    /// Run the client, reporting connection changes and server events through
    /// `event_tx` and writing frames received on `outbound_rx`.
    pub async fn run(
        self,
        event_tx: mpsc::Sender<ChannelEvent>,
        mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    ) {
        loop {
            if event_tx.is_closed() {
                break;
            }

            match TcpStream::connect(&self.address).await {
                Ok(stream) => {
                    info!(address = %self.address, "Connected to push channel");
                    if event_tx.send(ChannelEvent::Connected).await.is_err() {
                        break;
                    }
                    match self.pump(stream, &event_tx, &mut outbound_rx).await {
                        PumpExit::Shutdown => break,
                        PumpExit::Lost(mut unsent) => {
                            // Frames queued after the socket died were never written either.
                            while let Ok(event) = outbound_rx.try_recv() {
                                unsent.push(event);
                            }
                            warn!(unsent = unsent.len(), "Push channel disconnected");
                            if event_tx
                                .send(ChannelEvent::Disconnected { unsent })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(address = %self.address, "Failed to connect to push channel: {}", e);
                }
            }

            tokio::time::sleep(self.reconnect_delay).await;
        }
        debug!("Push channel client stopped");
    }

    async fn pump(
        &self,
        stream: TcpStream,
        event_tx: &mpsc::Sender<ChannelEvent>,
        outbound_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    ) -> PumpExit {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => return PumpExit::Lost(Vec::new()),
                        Err(e) => {
                            debug!("Push channel read error: {}", e);
                            return PumpExit::Lost(Vec::new());
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ServerEvent>(&line) {
                        Ok(event) => {
                            if event_tx.send(ChannelEvent::Server(event)).await.is_err() {
                                return PumpExit::Shutdown;
                            }
                        }
                        Err(e) => {
                            debug!("Ignoring push frame: {} - line: {}", e, line);
                        }
                    }
                }
                frame = outbound_rx.recv() => {
                    let Some(event) = frame else {
                        return PumpExit::Shutdown;
                    };
                    let mut encoded = match serde_json::to_string(&event) {
                        Ok(encoded) => encoded,
                        Err(e) => {
                            warn!("Failed to encode push frame: {}", e);
                            continue;
                        }
                    };
                    encoded.push('\n');
                    if let Err(e) = writer.write_all(encoded.as_bytes()).await {
                        debug!("Push channel write error: {}", e);
                        return PumpExit::Lost(vec![event]);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantPair;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            writer
                .write_all(
                    b"{\"event\":\"receive-message\",\"data\":{\"from\":\"s@x\",\"to\":\"b@x\",\"text\":\"hi\",\"timestamp\":5}}\nnot json\n",
                )
                .await
                .unwrap();
            let mut lines = BufReader::new(reader).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        let client = SocketPushClient::new(address, Duration::from_millis(50));
        let (handle, mut events, task) = client.spawn();

        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));
        match events.recv().await {
            Some(ChannelEvent::Server(ServerEvent::ReceiveMessage(m))) => assert_eq!(m.text, "hi"),
            other => panic!("unexpected event: {:?}", other),
        }

        handle
            .emit(ClientEvent::JoinChat(ParticipantPair {
                buyer_email: "b@x".into(),
                seller_email: "s@x".into(),
            }))
            .unwrap();
        let written = server.await.unwrap();
        assert!(written.contains("\"join-chat\""));

        // Server closed the socket.
        assert!(matches!(
            events.recv().await,
            Some(ChannelEvent::Disconnected { .. })
        ));
        task.abort();
    }
}
