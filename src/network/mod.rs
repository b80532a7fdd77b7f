pub mod notification;
pub mod router;

use self::notification::{wallet_stream, Envelope, Notification, Operation};
use self::router::{Router, StreamKey};
use crate::error::{SyncError, SyncResult};
use ethers::types::Address;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::{
    net::TcpStream,
    select,
    sync::{mpsc, watch},
    time,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectBackoff,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub ws_url: String,
    /// Silence after which the connection is pinged
    pub message_timeout: Duration,
    /// How long a ping may go unanswered
    pub ping_timeout: Duration,
    /// Pause before reconnecting after the connection died
    pub reconnect_delay: Duration,
    /// Pause after a message failed to process
    pub message_error_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://rinkeby.liquidity.network/ws/".to_string(),
            message_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(20),
            message_error_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub enum Command {
    Subscribe {
        key: StreamKey,
        queue: mpsc::UnboundedSender<Notification>,
    },
    Unsubscribe {
        key: StreamKey,
    },
}

/// Cloneable access to a running [`Synchronizer`].
#[derive(Clone)]
pub struct SyncHandle {
    command_sender: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl SyncHandle {
    /// Registers a queue for `(token, wallet)`. It keeps receiving across
    /// reconnects until unsubscribed or dropped.
    pub async fn subscribe(
        &self,
        wallet: Address,
        token: Address,
    ) -> SyncResult<mpsc::UnboundedReceiver<Notification>> {
        let (queue, receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(Command::Subscribe {
                key: StreamKey { token, wallet },
                queue,
            })
            .await
            .map_err(|_| SyncError::Stopped)?;
        Ok(receiver)
    }

    pub async fn unsubscribe(&self, wallet: Address, token: Address) -> SyncResult<()> {
        self.command_sender
            .send(Command::Unsubscribe {
                key: StreamKey { token, wallet },
            })
            .await
            .map_err(|_| SyncError::Stopped)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Owns the single operator websocket. Acknowledges every message, routes
/// notifications to subscriber queues and reconnects forever until cancelled.
pub struct Synchronizer {
    config: SyncConfig,
    router: Router,

    command_sender: mpsc::Sender<Command>,
    command_receiver: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl Synchronizer {
    pub fn new(config: SyncConfig, cancel: CancellationToken) -> Self {
        let (command_sender, command_receiver) = mpsc::channel(32);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            router: Router::default(),
            command_sender,
            command_receiver,
            state,
            cancel,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            command_sender: self.command_sender.clone(),
            state: self.state.subscribe(),
            cancel: self.cancel.clone(),
        }
    }

    pub async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            info!("(sync) connecting to {}", self.config.ws_url);

            let connection = select! {
                _ = self.cancel.cancelled() => break,
                connection = connect_async(self.config.ws_url.as_str()) => connection,
            };

            match connection {
                Ok((mut ws, _)) => {
                    info!("(sync) connected");
                    self.set_state(ConnectionState::Connected);
                    let result = self.serve(&mut ws).await;
                    self.close(&mut ws).await;
                    match result {
                        Err(SyncError::Cancelled) => break,
                        Err(e) => error!("(sync) connection lost: {}", e),
                        Ok(()) => info!("(sync) connection ended"),
                    }
                }
                Err(e) => error!("(sync) failed to connect: {}", e),
            }

            self.set_state(ConnectionState::ReconnectBackoff);
            debug!("(sync) reconnecting in {:?}", self.config.reconnect_delay);
            select! {
                _ = self.cancel.cancelled() => break,
                _ = time::sleep(self.config.reconnect_delay) => {}
            }
        }
        info!("(sync) stopped");
        self.set_state(ConnectionState::Disconnected);
    }

    /// Sends a close frame unless cancelled first, the socket is dropped
    /// either way.
    async fn close(&self, ws: &mut WsStream) {
        let closed = select! {
            _ = self.cancel.cancelled() => return,
            closed = time::timeout(self.config.ping_timeout, ws.close(None)) => closed,
        };
        match closed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("(sync) close failed: {}", e),
            Err(_) => debug!("(sync) close timed out"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn serve(&mut self, ws: &mut WsStream) -> SyncResult<()> {
        // subscriptions made while disconnected
        while let Ok(command) = self.command_receiver.try_recv() {
            self.apply_command(command);
        }
        let streams = self.router.streams();
        if !streams.is_empty() {
            send_operation(ws, &Operation::Subscribe { streams }).await?;
        }

        loop {
            select! {
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                command = self.command_receiver.recv() => {
                    if let Some(command) = command {
                        self.command_handler(ws, command).await?;
                    }
                }
                frame = time::timeout(self.config.message_timeout, ws.next()) => {
                    match frame {
                        Ok(frame) => self.frame_handler(ws, frame).await?,
                        Err(_) => self.heartbeat(ws).await?,
                    }
                }
            }
        }
    }

    /// Pings after a quiet period, any frame within the ping timeout counts
    /// as an answer.
    async fn heartbeat(&mut self, ws: &mut WsStream) -> SyncResult<()> {
        debug!(
            "(sync) no message for {:?}, pinging",
            self.config.message_timeout
        );
        ws.send(Message::Ping(Vec::new())).await?;
        let frame = select! {
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            frame = time::timeout(self.config.ping_timeout, ws.next()) => frame,
        };
        match frame {
            Ok(frame) => self.frame_handler(ws, frame).await,
            Err(_) => {
                warn!("(sync) ping timed out");
                Err(SyncError::PongTimeout)
            }
        }
    }

    async fn frame_handler(
        &mut self,
        ws: &mut WsStream,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> SyncResult<()> {
        match frame {
            None | Some(Ok(Message::Close(_))) => Err(SyncError::ConnectionClosed),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(Message::Text(text))) => self.message_handler(ws, &text).await,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => self.message_handler(ws, &text).await,
                Err(e) => {
                    warn!("(sync) dropping non utf8 binary message: {}", e);
                    Ok(())
                }
            },
            Some(Ok(_)) => Ok(()),
        }
    }

    /// Acks and routes one message. Failing to process it never kills the
    /// connection, failing to ack it does.
    async fn message_handler(&mut self, ws: &mut WsStream, text: &str) -> SyncResult<()> {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("(sync) malformed message {}: {}", text, e);
                return self.pause_after_error().await;
            }
        };

        if let Some(uuid) = envelope.uuid.clone() {
            send_operation(ws, &Operation::Ack { uuid }).await?;
        }

        if let Err(e) = self.router.route(envelope) {
            error!("(sync) failed to route message {}: {}", text, e);
            return self.pause_after_error().await;
        }
        Ok(())
    }

    async fn pause_after_error(&self) -> SyncResult<()> {
        select! {
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            _ = time::sleep(self.config.message_error_delay) => Ok(()),
        }
    }

    async fn command_handler(&mut self, ws: &mut WsStream, command: Command) -> SyncResult<()> {
        let wallet = match &command {
            Command::Subscribe { key, .. } | Command::Unsubscribe { key } => key.wallet,
        };
        let subscribing = matches!(command, Command::Subscribe { .. });
        self.apply_command(command);

        let streams = vec![wallet_stream(&wallet)];
        if subscribing {
            send_operation(ws, &Operation::Subscribe { streams }).await
        } else if !self.router.has_wallet(&wallet) {
            send_operation(ws, &Operation::Unsubscribe { streams }).await
        } else {
            Ok(())
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { key, queue } => {
                info!("(sync) subscribing {:?}/{:?}", key.token, key.wallet);
                self.router.subscribe(key, queue);
            }
            Command::Unsubscribe { key } => {
                info!("(sync) unsubscribing {:?}/{:?}", key.token, key.wallet);
                self.router.unsubscribe(&key);
            }
        }
    }
}

async fn send_operation(ws: &mut WsStream, operation: &Operation) -> SyncResult<()> {
    let text = serde_json::to_string(operation)?;
    ws.send(Message::Text(text)).await?;
    Ok(())
}
