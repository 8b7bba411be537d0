//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the duel channel over a WebSocket. Both
//! `ws://` and `wss://` URLs are supported. When built with
//! [`WebSocketTransport::connect`] the transport remembers its URL and
//! re-dials after an abrupt drop, reporting [`Frame::Interrupted`] and then
//! [`Frame::Reconnected`]. A drop noticed by a failed write is reported the
//! same way on the next [`recv`](Transport::recv). A close frame from the
//! server is final.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is
//! enabled (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), sudoku_duel_client::DuelError> {
//! use sudoku_duel_client::transport::{Frame, Transport};
//! use sudoku_duel_client::WebSocketTransport;
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:8000/ws").await?;
//!
//! if let Some(Ok(Frame::Text(msg))) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::config::DuelConfig;
use crate::error::DuelError;
use crate::transport::{Connector, Frame, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Re-dial policy after an abrupt link drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before the channel is reported closed. Zero disables re-dialing.
    pub max_attempts: u32,
    /// Wait before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum Link {
    Open(Box<WsStream>),
    Down { attempts: u32 },
    Closed,
}

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe. A re-dial cancelled half way is
/// simply retried on the next call.
#[derive(Debug)]
pub struct WebSocketTransport {
    link: Link,
    url: Option<String>,
    policy: ReconnectPolicy,
    /// A drop seen by `send` that `recv` has not reported yet.
    write_loss: Option<String>,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to `url` with the default
    /// [`ReconnectPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::Io`] if the URL is invalid or the connection
    /// cannot be established. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); anything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, DuelError> {
        Self::connect_with_policy(url, ReconnectPolicy::default()).await
    }

    /// Establish a new connection with an explicit re-dial policy.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_policy(url: &str, policy: ReconnectPolicy) -> Result<Self, DuelError> {
        let stream = dial(url).await?;
        Ok(Self {
            link: Link::Open(Box::new(stream)),
            url: Some(url.to_owned()),
            policy,
            write_loss: None,
        })
    }

    /// Wrap an already-established stream. Such a transport cannot re-dial.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            link: Link::Open(Box::new(stream)),
            url: None,
            policy: ReconnectPolicy {
                max_attempts: 0,
                ..ReconnectPolicy::default()
            },
            write_loss: None,
        }
    }

    /// Establish a new connection, failing with [`DuelError::Timeout`] if it
    /// is not up within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::Timeout`] if the deadline elapses, or any error
    /// that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, DuelError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| DuelError::Timeout)?
    }

    /// Whether the socket is currently up.
    pub fn is_open(&self) -> bool {
        matches!(self.link, Link::Open(_))
    }

    fn can_redial(&self) -> bool {
        self.url.is_some() && self.policy.max_attempts > 0
    }

    /// Mark the link down after an abrupt drop, or closed if re-dialing is
    /// not possible.
    fn link_lost(&mut self, reason: String) -> Option<Result<Frame, DuelError>> {
        if self.can_redial() {
            tracing::warn!(reason = %reason, "WebSocket link lost, will re-dial");
            self.link = Link::Down { attempts: 0 };
            Some(Ok(Frame::Interrupted {
                reason: Some(reason),
            }))
        } else {
            self.link = Link::Closed;
            Some(Err(DuelError::TransportReceive(reason)))
        }
    }

    /// Take the link out of service after a failed write. The next `recv`
    /// reports the drop.
    fn write_failed(&mut self, reason: &str) {
        self.link = if self.can_redial() {
            tracing::warn!(reason = %reason, "WebSocket write failed, will re-dial");
            Link::Down { attempts: 0 }
        } else {
            Link::Closed
        };
        self.write_loss = Some(reason.to_owned());
    }

    /// Re-dial until the link is back or the policy gives up. Progress is
    /// stored on `self` after every attempt, so a cancelled call resumes.
    async fn redial(&mut self) -> Option<Result<Frame, DuelError>> {
        let url = self.url.clone()?;
        while let Link::Down { attempts } = self.link {
            if attempts >= self.policy.max_attempts {
                tracing::warn!(url = %url, attempts, "WebSocket re-dial attempts exhausted");
                self.link = Link::Closed;
                return None;
            }
            tokio::time::sleep(self.policy.delay).await;
            match dial(&url).await {
                Ok(stream) => {
                    self.link = Link::Open(Box::new(stream));
                    return Some(Ok(Frame::Reconnected));
                }
                Err(e) => {
                    tracing::debug!(attempt = attempts + 1, "WebSocket re-dial failed: {e}");
                    self.link = Link::Down {
                        attempts: attempts + 1,
                    };
                }
            }
        }
        None
    }
}

async fn dial(url: &str) -> Result<WsStream, DuelError> {
    tracing::debug!(url = %url, "connecting to WebSocket server");
    let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
        let kind = match &e {
            tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
            _ => std::io::ErrorKind::Other,
        };
        DuelError::Io(std::io::Error::new(kind, e))
    })?;
    tracing::info!(url = %url, "WebSocket connection established");
    Ok(stream)
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), DuelError> {
        let written = match &mut self.link {
            Link::Open(stream) => stream.send(Message::Text(message.into())).await,
            Link::Down { .. } => return Err(DuelError::TransportSend("link interrupted".into())),
            Link::Closed => return Err(DuelError::TransportClosed),
        };
        written.map_err(|e| {
            let reason = e.to_string();
            self.write_failed(&reason);
            DuelError::TransportSend(reason)
        })
    }

    async fn recv(&mut self) -> Option<Result<Frame, DuelError>> {
        if let Some(reason) = self.write_loss.take() {
            return Some(match self.link {
                Link::Down { .. } => Ok(Frame::Interrupted {
                    reason: Some(reason),
                }),
                Link::Open(_) | Link::Closed => Err(DuelError::TransportSend(reason)),
            });
        }
        loop {
            if matches!(self.link, Link::Down { .. }) {
                return self.redial().await;
            }
            let Link::Open(stream) = &mut self.link else {
                return None;
            };

            let msg = match stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return self.link_lost(e.to_string()),
                None => return self.link_lost("stream ended without close frame".into()),
            };

            match msg {
                Message::Text(text) => return Some(Ok(Frame::Text(text.to_string()))),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    self.link = Link::Closed;
                    return None;
                }
                Message::Ping(_) => {
                    tracing::debug!("received WebSocket ping (auto-pong handled by tungstenite)");
                }
                Message::Pong(_) => {
                    tracing::debug!("received WebSocket pong (ignored)");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), DuelError> {
        self.write_loss = None;
        match std::mem::replace(&mut self.link, Link::Closed) {
            Link::Open(mut stream) => stream
                .close(None)
                .await
                .map_err(|e| DuelError::TransportSend(e.to_string())),
            Link::Down { .. } | Link::Closed => Ok(()),
        }
    }
}

/// [`Connector`] that dials a fixed WebSocket URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    timeout: Duration,
    policy: ReconnectPolicy,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            policy: ReconnectPolicy::default(),
        }
    }

    /// Dial `socket_url` with the request timeout and re-dial settings of `config`.
    pub fn from_config(config: &DuelConfig) -> Self {
        Self::new(config.socket_url.clone(), config.request_timeout).with_reconnect_policy(
            ReconnectPolicy {
                max_attempts: config.reconnect_attempts,
                delay: config.reconnect_delay,
            },
        )
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, DuelError> {
        let transport = tokio::time::timeout(
            self.timeout,
            WebSocketTransport::connect_with_policy(&self.url, self.policy),
        )
        .await
        .map_err(|_| DuelError::Timeout)??;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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

    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url").await.unwrap_err();
        assert!(matches!(err, DuelError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, DuelError::Io(_)));
    }

    /// Start a local WebSocket server that runs `handler` on each of the first
    /// `accepts` connections and returns the URL to connect to.
    async fn start_mock_server<F, Fut>(accepts: usize, handler: F) -> String
    where
        F: Fn(usize, tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for n in 0..accepts {
                let (tcp, _) = listener.accept().await.unwrap();
                let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                handler(n, ws).await;
            }
        });

        format!("ws://{addr}")
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn recv_receives_text_frames() {
        let url = start_mock_server(1, |_, mut ws| async move {
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.send(Message::Text("world".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text("hello".into())
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text("world".into())
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(1, |_, mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text("after_binary".into())
        );
    }

    #[tokio::test]
    async fn abrupt_drop_interrupts_then_reconnects() {
        let url = start_mock_server(2, |n, mut ws| async move {
            if n == 0 {
                // Drop the socket without a close frame.
                drop(ws);
            } else {
                ws.send(Message::Text("welcome back".into())).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect_with_policy(&url, fast_policy())
            .await
            .unwrap();
        assert!(matches!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Interrupted { .. }
        ));
        assert!(!transport.is_open());
        assert_eq!(transport.recv().await.unwrap().unwrap(), Frame::Reconnected);
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text("welcome back".into())
        );
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_while_interrupted_fails() {
        let url = start_mock_server(1, |_, ws| async move { drop(ws) }).await;

        let mut transport = WebSocketTransport::connect_with_policy(&url, fast_policy())
            .await
            .unwrap();
        assert!(matches!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Interrupted { .. }
        ));
        let err = transport.send("x".into()).await.unwrap_err();
        assert!(matches!(err, DuelError::TransportSend(_)));
    }

    /// Write into a socket the server has dropped until the write fails.
    async fn write_until_failure(transport: &mut WebSocketTransport) -> DuelError {
        for _ in 0..100 {
            if let Err(e) = transport.send("{}".into()).await {
                return e;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("writes kept succeeding on a dropped socket");
    }

    #[tokio::test]
    async fn failed_write_interrupts_then_reconnects() {
        let url = start_mock_server(2, |n, mut ws| async move {
            if n == 0 {
                drop(ws);
            } else {
                ws.send(Message::Text("welcome back".into())).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect_with_policy(&url, fast_policy())
            .await
            .unwrap();
        let err = write_until_failure(&mut transport).await;
        assert!(matches!(err, DuelError::TransportSend(_)));
        assert!(!transport.is_open());

        assert!(matches!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Interrupted { reason: Some(_) }
        ));
        assert_eq!(transport.recv().await.unwrap().unwrap(), Frame::Reconnected);
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text("welcome back".into())
        );
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_write_without_redial_ends_the_stream() {
        let url = start_mock_server(1, |_, ws| async move { drop(ws) }).await;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(ws_stream);
        write_until_failure(&mut transport).await;

        assert!(matches!(
            transport.recv().await,
            Some(Err(DuelError::TransportSend(_)))
        ));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn from_stream_transport_does_not_redial() {
        let url = start_mock_server(1, |_, ws| async move { drop(ws) }).await;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(ws_stream);
        assert!(matches!(transport.recv().await, Some(Err(_))));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(1, |_, mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, DuelError::TransportClosed));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_round_trip() {
        let url = start_mock_server(1, |_, mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.send("ping_echo".to_string()).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text("ping_echo".into())
        );
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DuelError::Timeout));
    }

    #[tokio::test]
    async fn connector_dials_configured_url() {
        let url = start_mock_server(1, |_, mut ws| async move {
            ws.send(Message::Text("hi".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(url.clone(), Duration::from_secs(5));
        assert_eq!(connector.url(), url);
        let mut transport = connector.connect().await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text("hi".into())
        );
    }

    #[test]
    fn connector_takes_settings_from_config() {
        let config = DuelConfig::default()
            .with_socket_url("ws://duel.test/ws")
            .with_request_timeout(Duration::from_secs(3))
            .with_reconnect(0, Duration::from_millis(250));
        let connector = WebSocketConnector::from_config(&config);
        assert_eq!(connector.url(), "ws://duel.test/ws");
        assert_eq!(connector.timeout, Duration::from_secs(3));
        assert_eq!(
            connector.policy,
            ReconnectPolicy {
                max_attempts: 0,
                delay: Duration::from_millis(250),
            }
        );
    }
}
