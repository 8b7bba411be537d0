//! Concrete [`Transport`](crate::Transport) implementations behind feature gates.
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{ReconnectPolicy, WebSocketConnector, WebSocketTransport};
