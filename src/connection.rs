//! Realtime channel management.
//!
//! [`ConnectionManager`] owns at most one live channel. The channel runs in a
//! background task that multiplexes outbound commands, a shutdown signal, and
//! inbound frames with `tokio::select!`. Inbound pushes are forwarded as
//! [`DuelEvent`]s on one bounded channel created with the manager and reused
//! across reconnects; the manager never interprets them.
//!
//! Whenever the link comes up (first connect or after a recovered drop) the
//! channel task reads the [`SessionStore`] and, when a room id and token are
//! stored, sends `join_room` before emitting [`DuelEvent::Connected`]. Rejoin
//! is therefore automatic after every network blip.
//!
//! The heartbeat timer is owned by the manager instance. Starting it while a
//! timer runs, or stopping it when none runs, is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = Arc::new(SessionStore::new(MemoryStorage::new()));
//! let connector = Arc::new(WebSocketConnector::new(url, timeout));
//! let (mut conn, mut events) = ConnectionManager::new(connector, session, &DuelConfig::default());
//!
//! conn.connect().await?;
//! while let Some(event) = events.recv().await {
//!     if let DuelEvent::Disconnected { .. } = event { break; }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::DuelConfig;
use crate::error::Result;
use crate::event::DuelEvent;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{SessionRecord, SessionStore};
use crate::transport::{Connector, Frame, Transport};

/// Snapshot of the link as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    /// The link is up.
    pub connected: bool,
    /// When the last inbound frame of any kind arrived.
    pub last_heartbeat_ack: Option<Instant>,
}

// ── Shared link state ───────────────────────────────────────────────

/// State shared between the manager, its channel task, and its heartbeat task.
struct LinkState {
    connected: AtomicBool,
    last_activity: StdMutex<Option<Instant>>,
    outbound: StdMutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
}

impl LinkState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            last_activity: StdMutex::new(None),
            outbound: StdMutex::new(None),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    fn touch(&self) {
        let mut last = self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = Some(Instant::now());
    }

    fn last_activity(&self) -> Option<Instant> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, tx: mpsc::UnboundedSender<ClientMessage>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    fn is_attached(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn detach(&self) {
        self.set_connected(false);
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Queue `msg` on the live channel. Returns `false` when there is none.
    fn queue(&self, msg: ClientMessage) -> bool {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            debug!(event = msg.name(), "no live channel, dropping client action");
            return false;
        };
        let name = msg.name();
        if tx.send(msg).is_err() {
            debug!(event = name, "channel task gone, dropping client action");
            return false;
        }
        true
    }
}

/// Handle to a running channel task.
struct Channel {
    task: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Channel {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the task to close the transport, aborting it if it does not exit
    /// within `timeout`.
    async fn shutdown(mut self, timeout: Duration) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                warn!("channel task terminated with join error: {join_err}");
            }
            Err(_) => {
                warn!("channel task did not exit within timeout; aborting task");
                self.task.abort();
                if let Err(join_err) = (&mut self.task).await {
                    debug!("channel task aborted: {join_err}");
                }
            }
        }
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owns the realtime channel and the heartbeat timer for one session.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    session: Arc<SessionStore>,
    link: Arc<LinkState>,
    event_tx: mpsc::Sender<DuelEvent>,
    channel: Option<Channel>,
    heartbeat: Option<JoinHandle<()>>,
    heartbeat_interval: Duration,
    shutdown_timeout: Duration,
}

impl ConnectionManager {
    /// Create a manager and the receiver for its event stream. No channel is
    /// opened until [`connect`](Self::connect).
    #[must_use = "the event receiver must be used to receive events"]
    pub fn new(
        connector: Arc<dyn Connector>,
        session: Arc<SessionStore>,
        config: &DuelConfig,
    ) -> (Self, mpsc::Receiver<DuelEvent>) {
        // Clamp capacity to at least 1 (tokio panics on 0).
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let manager = Self {
            connector,
            session,
            link: Arc::new(LinkState::new()),
            event_tx,
            channel: None,
            heartbeat: None,
            heartbeat_interval: config.heartbeat_interval.max(Duration::from_millis(1)),
            shutdown_timeout: config.shutdown_timeout,
        };
        (manager, event_rx)
    }

    /// Open the channel and start the heartbeat. A no-op while a live channel
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the channel cannot be opened.
    pub async fn connect(&mut self) -> Result<()> {
        if self.has_channel() {
            debug!("connect: channel already live");
            return Ok(());
        }
        // A closing channel may still be delivering its last event.
        if let Some(channel) = self.channel.take() {
            channel.shutdown(self.shutdown_timeout).await;
        }
        let transport = self.connector.connect().await?;
        self.attach(transport);
        self.start_heartbeat();
        Ok(())
    }

    fn attach(&mut self, transport: Box<dyn Transport>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.link.attach(cmd_tx);
        let task = tokio::spawn(channel_loop(
            transport,
            cmd_rx,
            shutdown_rx,
            self.event_tx.clone(),
            Arc::clone(&self.link),
            Arc::clone(&self.session),
        ));
        self.channel = Some(Channel {
            task,
            shutdown_tx: Some(shutdown_tx),
        });
        info!("channel opened");
    }

    /// Stop the heartbeat, close the channel, and clear the session record.
    /// A later [`connect`](Self::connect) opens a fresh channel.
    pub async fn disconnect(&mut self) {
        debug!("disconnect requested");
        self.stop_heartbeat();
        if let Some(channel) = self.channel.take() {
            channel.shutdown(self.shutdown_timeout).await;
        }
        self.link.detach();
        self.session.clear();
    }

    // ── Heartbeat ───────────────────────────────────────────────────

    /// Start the heartbeat timer unless one is already running. The first
    /// ping goes out one interval after start.
    pub fn start_heartbeat(&mut self) {
        if self.heartbeat_active() {
            debug!("heartbeat already running");
            return;
        }
        let period = self.heartbeat_interval;
        let link = Arc::clone(&self.link);
        let session = Arc::clone(&self.session);
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !link.is_connected() {
                    continue;
                }
                if let Some(record) = session.load() {
                    link.queue(ClientMessage::Heartbeat {
                        player_token: record.player_token,
                    });
                }
            }
        }));
        debug!(?period, "heartbeat started");
    }

    /// Stop the heartbeat timer if one is running.
    pub fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
            debug!("heartbeat stopped");
        }
    }

    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(|task| !task.is_finished())
    }

    // ── Client actions ──────────────────────────────────────────────
    //
    // Each returns whether the message was queued. Without a live channel or
    // a stored token the action is dropped.

    /// Bind the channel to the stored room seat.
    pub fn join_socket_room(&self) -> bool {
        self.with_session(|record| ClientMessage::JoinRoom {
            room_id: record.room_id,
            player_token: record.player_token,
        })
    }

    pub fn send_ready(&self) -> bool {
        self.with_session(|record| ClientMessage::Ready {
            player_token: record.player_token,
        })
    }

    /// Ask the server to judge `value` at `(row, col)`; `0` erases.
    pub fn send_fill_cell(&self, row: usize, col: usize, value: u8) -> bool {
        self.with_session(|record| ClientMessage::FillCell {
            player_token: record.player_token,
            row,
            col,
            value,
        })
    }

    pub fn send_heartbeat(&self) -> bool {
        self.with_session(|record| ClientMessage::Heartbeat {
            player_token: record.player_token,
        })
    }

    pub fn request_restart(&self) -> bool {
        self.with_session(|record| ClientMessage::RestartGame {
            player_token: record.player_token,
        })
    }

    fn with_session(&self, build: impl FnOnce(SessionRecord) -> ClientMessage) -> bool {
        match self.session.load() {
            Some(record) => self.link.queue(build(record)),
            None => {
                debug!("no session token, dropping client action");
                false
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        ConnectionState {
            connected: self.link.is_connected(),
            last_heartbeat_ack: self.link.last_activity(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Whether a channel is running and has not begun closing.
    pub fn has_channel(&self) -> bool {
        self.channel.as_ref().is_some_and(Channel::is_live) && self.link.is_attached()
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected", &self.is_connected())
            .field("has_channel", &self.has_channel())
            .field("heartbeat_active", &self.heartbeat_active())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; abort instead.
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
        if let Some(channel) = self.channel.take() {
            channel.task.abort();
        }
    }
}

// ── Channel loop ────────────────────────────────────────────────────

/// Background loop for one channel.
///
/// Exits when the shutdown signal fires or the transport reports a permanent
/// close or an error. A failed write drops that message only; the transport's
/// next `recv` says whether the link is interrupted or gone.
async fn channel_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
    event_tx: mpsc::Sender<DuelEvent>,
    link: Arc<LinkState>,
    session: Arc<SessionStore>,
) {
    debug!("channel loop started");

    link_up(transport.as_mut(), &link, &session, &event_tx).await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed, shutting down channel loop");
                    let _ = transport.close().await;
                    emit_disconnected(&event_tx, &link, Some("client shut down".into())).await;
                    break;
                };
                if let Err(reason) = send_message(transport.as_mut(), &msg).await {
                    warn!(event = msg.name(), "dropping client action: {reason}");
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &link, Some("client disconnected".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(Frame::Text(text))) => {
                        link.touch();
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => {
                                debug!(event = msg.name(), "server push");
                                emit_event(&event_tx, DuelEvent::Server(msg));
                            }
                            Err(e) => {
                                warn!("failed to deserialize server message: {e} (raw: {text})");
                            }
                        }
                    }
                    Some(Ok(Frame::Reconnected)) => {
                        info!("link restored");
                        link_up(transport.as_mut(), &link, &session, &event_tx).await;
                    }
                    Some(Ok(Frame::Interrupted { reason })) => {
                        warn!(reason = ?reason, "link interrupted");
                        link.set_connected(false);
                        emit_event(&event_tx, DuelEvent::ConnectionLost { reason });
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &link,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &link, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("channel loop exited");
}

/// Mark the link up, rejoin the stored room if any, then announce it.
///
/// If the rejoin cannot be written the link stays down and nothing is
/// announced; the transport reports the drop on its next `recv`.
async fn link_up(
    transport: &mut dyn Transport,
    link: &LinkState,
    session: &SessionStore,
    event_tx: &mpsc::Sender<DuelEvent>,
) {
    link.set_connected(true);
    link.touch();
    match session.load() {
        Some(record) => {
            info!(room_id = %record.room_id, "rejoining room");
            let rejoin = ClientMessage::JoinRoom {
                room_id: record.room_id,
                player_token: record.player_token,
            };
            if let Err(reason) = send_message(transport, &rejoin).await {
                warn!("rejoin not sent: {reason}");
                link.set_connected(false);
                return;
            }
        }
        None => debug!("no stored session, skipping rejoin"),
    }
    emit_event(event_tx, DuelEvent::Connected);
}

async fn send_message(
    transport: &mut dyn Transport,
    msg: &ClientMessage,
) -> std::result::Result<(), String> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            // Programming error; keep the channel alive.
            error!("failed to serialize ClientMessage: {e}");
            return Ok(());
        }
    };
    debug!(event = msg.name(), "sending client message");
    transport
        .send(json)
        .await
        .map_err(|e| format!("transport send error: {e}"))
}

/// Forward an event, dropping it with a warning when the queue is full.
fn emit_event(event_tx: &mpsc::Sender<DuelEvent>, event: DuelEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Detach the link, then emit [`DuelEvent::Disconnected`] with a blocking send.
/// It is the last event of a channel and is never dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<DuelEvent>,
    link: &LinkState,
    reason: Option<String>,
) {
    link.detach();
    if event_tx.send(DuelEvent::Disconnected { reason }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::DuelError;
    use crate::protocol::{Difficulty, Role};
    use crate::session::MemoryStorage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    // ── Mock transport ──────────────────────────────────────────────

    /// Shared between a [`MockTransport`] and the test driving it.
    #[derive(Default)]
    struct WireState {
        sent: StdMutex<Vec<ClientMessage>>,
        closed: AtomicBool,
        refuse_writes: AtomicBool,
    }

    /// A `None` item closes the channel; once the sender is dropped `recv`
    /// pends forever.
    struct MockTransport {
        inbound: mpsc::UnboundedReceiver<Option<Frame>>,
        state: Arc<WireState>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), DuelError> {
            if self.state.refuse_writes.load(Ordering::SeqCst) {
                return Err(DuelError::TransportSend("broken pipe".into()));
            }
            let msg = serde_json::from_str(&message).unwrap();
            self.state.sent.lock().unwrap().push(msg);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<Frame, DuelError>> {
            match self.inbound.recv().await {
                Some(Some(frame)) => Some(Ok(frame)),
                Some(None) => None,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), DuelError> {
            self.state.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    struct Wire {
        inbound: mpsc::UnboundedSender<Option<Frame>>,
        state: Arc<WireState>,
    }

    impl Wire {
        fn push(&self, frame: Frame) {
            self.inbound.send(Some(frame)).unwrap();
        }

        fn push_text(&self, text: &str) {
            self.push(Frame::Text(text.into()));
        }

        fn close(&self) {
            self.inbound.send(None).unwrap();
        }

        fn sent(&self) -> Vec<ClientMessage> {
            self.state.sent.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct MockConnector {
        transports: StdMutex<VecDeque<MockTransport>>,
        connects: AtomicUsize,
    }

    impl MockConnector {
        fn wire(&self) -> Wire {
            let (tx, rx) = mpsc::unbounded_channel();
            let state = Arc::new(WireState::default());
            self.transports.lock().unwrap().push_back(MockTransport {
                inbound: rx,
                state: Arc::clone(&state),
            });
            Wire { inbound: tx, state }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> std::result::Result<Box<dyn Transport>, DuelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.transports
                .lock()
                .unwrap()
                .pop_front()
                .map(|t| Box::new(t) as Box<dyn Transport>)
                .ok_or(DuelError::TransportClosed)
        }
    }

    fn record() -> SessionRecord {
        SessionRecord {
            room_id: "123456".into(),
            player_token: "tok-a".into(),
            player_id: "pid-a".into(),
            nickname: "Alice".into(),
            role: Role::Host,
            difficulty: Difficulty::Medium,
        }
    }

    fn manager(
        with_session: bool,
    ) -> (
        ConnectionManager,
        mpsc::Receiver<DuelEvent>,
        Arc<MockConnector>,
    ) {
        let session = Arc::new(SessionStore::new(MemoryStorage::new()));
        if with_session {
            session.save(&record());
        }
        let connector = Arc::new(MockConnector::default());
        let (conn, events) = ConnectionManager::new(
            Arc::clone(&connector) as Arc<dyn Connector>,
            session,
            &DuelConfig::default(),
        );
        (conn, events, connector)
    }

    fn heartbeats(wire: &Wire) -> usize {
        wire.sent()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Heartbeat { .. }))
            .count()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn connect_rejoins_stored_room_before_connected_event() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        assert!(conn.is_connected());
        assert_eq!(
            wire.sent(),
            vec![ClientMessage::JoinRoom {
                room_id: "123456".into(),
                player_token: "tok-a".into(),
            }]
        );
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn connect_without_session_sends_nothing() {
        let (mut conn, mut events, connector) = manager(false);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        assert!(wire.sent().is_empty());
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn second_connect_is_noop() {
        let (mut conn, mut events, connector) = manager(true);
        let _wire = connector.wire();
        conn.connect().await.unwrap();
        conn.connect().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn reconnected_frame_rejoins_again() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);

        wire.push(Frame::Interrupted {
            reason: Some("blip".into()),
        });
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::ConnectionLost {
                reason: Some("blip".into())
            }
        );
        assert!(!conn.is_connected());

        wire.push(Frame::Reconnected);
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        assert!(conn.is_connected());

        let joins = wire
            .sent()
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::JoinRoom { .. }))
            .count();
        assert_eq!(joins, 2);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn failed_write_leaves_the_verdict_to_the_transport() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);

        wire.state.refuse_writes.store(true, Ordering::SeqCst);
        assert!(conn.send_ready());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), events.recv())
                .await
                .is_err()
        );
        assert!(conn.has_channel());

        wire.push(Frame::Interrupted {
            reason: Some("broken pipe".into()),
        });
        assert!(matches!(
            events.recv().await.unwrap(),
            DuelEvent::ConnectionLost { .. }
        ));
        wire.state.refuse_writes.store(false, Ordering::SeqCst);
        wire.push(Frame::Reconnected);
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        assert_eq!(
            wire.sent().last(),
            Some(&ClientMessage::JoinRoom {
                room_id: "123456".into(),
                player_token: "tok-a".into(),
            })
        );
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn unsent_rejoin_keeps_link_down_until_next_recovery() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        let _ = events.recv().await;

        wire.push(Frame::Interrupted { reason: None });
        let _ = events.recv().await;
        wire.state.refuse_writes.store(true, Ordering::SeqCst);
        wire.push(Frame::Reconnected);
        wire.push_text(r#"{"event":"opponent_progress","data":{"filled":2}}"#);
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::Server(ServerMessage::OpponentProgress { filled: 2 })
        );
        assert!(!conn.is_connected());

        wire.state.refuse_writes.store(false, Ordering::SeqCst);
        wire.push(Frame::Reconnected);
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        assert!(conn.is_connected());
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn server_pushes_forwarded_and_malformed_skipped() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        let _ = events.recv().await;

        wire.push_text("{not json");
        wire.push_text(r#"{"event":"mystery","data":{}}"#);
        wire.push_text(r#"{"event":"opponent_progress","data":{"filled":7}}"#);
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::Server(ServerMessage::OpponentProgress { filled: 7 })
        );
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn inbound_frames_update_last_heartbeat_ack() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        assert_eq!(conn.state().last_heartbeat_ack, None);
        conn.connect().await.unwrap();
        let _ = events.recv().await;
        let first = conn.state().last_heartbeat_ack.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        wire.push_text(r#"{"event":"timer_update","data":{"timers":{"host":1,"guest":1}}}"#);
        let _ = events.recv().await;
        assert!(conn.state().last_heartbeat_ack.unwrap() > first);
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn server_close_emits_disconnected_and_allows_fresh_connect() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        let _ = events.recv().await;

        wire.close();
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::Disconnected { reason: None }
        );
        assert!(!conn.is_connected());
        assert!(!conn.has_channel());

        let _second = connector.wire();
        conn.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn connector_failure_surfaces_and_leaves_no_channel() {
        let (mut conn, _events, _connector) = manager(true);
        assert!(conn.connect().await.is_err());
        assert!(!conn.has_channel());
        assert!(!conn.heartbeat_active());
    }

    #[tokio::test]
    async fn actions_queue_only_with_channel_and_token() {
        let (mut conn, mut events, connector) = manager(true);
        assert!(!conn.send_ready());

        let wire = connector.wire();
        conn.connect().await.unwrap();
        let _ = events.recv().await;
        assert!(conn.send_ready());
        assert!(conn.send_fill_cell(2, 3, 7));
        assert!(conn.request_restart());
        assert!(conn.send_heartbeat());
        assert!(conn.join_socket_room());

        // Without a token the action is dropped even with a live channel.
        conn.session().clear();
        assert!(!conn.send_ready());

        while wire.state.sent.lock().unwrap().len() < 6 {
            tokio::task::yield_now().await;
        }

        let sent = wire.sent();
        assert_eq!(
            &sent[1..],
            &[
                ClientMessage::Ready {
                    player_token: "tok-a".into()
                },
                ClientMessage::FillCell {
                    player_token: "tok-a".into(),
                    row: 2,
                    col: 3,
                    value: 7
                },
                ClientMessage::RestartGame {
                    player_token: "tok-a".into()
                },
                ClientMessage::Heartbeat {
                    player_token: "tok-a".into()
                },
                ClientMessage::JoinRoom {
                    room_id: "123456".into(),
                    player_token: "tok-a".into()
                },
            ]
        );
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_closes_transport_and_clears_session() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        let _ = events.recv().await;
        assert!(conn.heartbeat_active());

        conn.disconnect().await;
        assert!(wire.state.closed.load(Ordering::Relaxed));
        assert!(!conn.heartbeat_active());
        assert!(!conn.has_channel());
        assert!(conn.session().load().is_none());
        assert!(matches!(
            events.recv().await.unwrap(),
            DuelEvent::Disconnected { .. }
        ));
        // Idempotent.
        conn.disconnect().await;
        assert!(!conn.send_ready());
    }

    #[tokio::test]
    async fn disconnected_is_delivered_on_full_queue() {
        let session = Arc::new(SessionStore::new(MemoryStorage::new()));
        let connector = Arc::new(MockConnector::default());
        let wire = connector.wire();
        let (mut conn, mut events) = ConnectionManager::new(
            Arc::clone(&connector) as Arc<dyn Connector>,
            session,
            &DuelConfig::default()
                .with_event_channel_capacity(1)
                .with_shutdown_timeout(Duration::from_secs(5)),
        );
        conn.connect().await.unwrap();
        // Connected fills the queue; these are dropped.
        wire.push_text(r#"{"event":"opponent_progress","data":{"filled":1}}"#);
        wire.close();

        assert_eq!(events.recv().await.unwrap(), DuelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            DuelEvent::Disconnected { reason: None }
        );
        conn.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_keeps_one_heartbeat_timer() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        let _ = events.recv().await;

        conn.start_heartbeat();
        conn.start_heartbeat();
        conn.start_heartbeat();
        tokio::time::sleep(Duration::from_secs(16)).await;

        assert_eq!(heartbeats(&wire), 3);
        conn.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_carries_token_and_stops_cleanly() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.stop_heartbeat();
        conn.connect().await.unwrap();
        let _ = events.recv().await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(wire.sent().contains(&ClientMessage::Heartbeat {
            player_token: "tok-a".into()
        }));

        conn.stop_heartbeat();
        conn.stop_heartbeat();
        let before = heartbeats(&wire);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(heartbeats(&wire), before);
        conn.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_silent_while_interrupted_or_without_token() {
        let (mut conn, mut events, connector) = manager(true);
        let wire = connector.wire();
        conn.connect().await.unwrap();
        let _ = events.recv().await;

        wire.push(Frame::Interrupted { reason: None });
        let _ = events.recv().await;
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(heartbeats(&wire), 0);

        wire.push(Frame::Reconnected);
        let _ = events.recv().await;
        conn.session().clear();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(heartbeats(&wire), 0);
        conn.disconnect().await;
    }
}
