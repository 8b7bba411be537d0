//! Room service request/response API.
//!
//! Creating and joining rooms happens over plain HTTP before the realtime
//! channel is opened. [`RoomApi`] is the seam; [`HttpRoomApi`] is the
//! `reqwest`-backed implementation (feature `http-api`).

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DuelError, Result};
use crate::grid::{deserialize_lenient, Grid};
use crate::machine::MatchStatus;
use crate::protocol::{Difficulty, PlayerId, Role, RoomId};

/// Maximum nickname length, in characters.
pub const MAX_NICKNAME_LEN: usize = 20;

/// Room ids are exactly this many characters.
pub const ROOM_ID_LEN: usize = 6;

/// Credentials returned by a successful create or join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTicket {
    pub room_id: RoomId,
    pub player_token: String,
    pub player_id: PlayerId,
    pub role: Role,
    #[serde(default, deserialize_with = "deserialize_difficulty")]
    pub difficulty: Difficulty,
}

/// One seat in [`RoomInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatInfo {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub online: bool,
}

/// Public room summary from `GET /api/room/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub status: MatchStatus,
    #[serde(default, deserialize_with = "deserialize_difficulty")]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub host: SeatInfo,
    #[serde(default)]
    pub guest: Option<SeatInfo>,
    #[serde(default)]
    pub puzzle_id: Option<String>,
    /// Only present once a match exists.
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub puzzle: Option<Grid>,
}

fn deserialize_difficulty<'de, D>(deserializer: D) -> std::result::Result<Difficulty, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?;
    Ok(text.as_deref().map(Difficulty::normalize).unwrap_or_default())
}

/// Check a nickname the way the room service does. Returns the trimmed name.
///
/// # Errors
///
/// [`DuelError::InvalidInput`] when the trimmed name is empty or longer than
/// [`MAX_NICKNAME_LEN`] characters.
pub fn validate_nickname(name: &str) -> Result<&str> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NICKNAME_LEN {
        return Err(DuelError::InvalidInput(format!(
            "nickname must be 1-{MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(name)
}

/// Check a room id. Returns the trimmed id.
///
/// # Errors
///
/// [`DuelError::InvalidInput`] unless the trimmed id is exactly
/// [`ROOM_ID_LEN`] characters.
pub fn validate_room_id(room_id: &str) -> Result<&str> {
    let room_id = room_id.trim();
    if room_id.chars().count() != ROOM_ID_LEN {
        return Err(DuelError::InvalidInput(format!(
            "room id must be {ROOM_ID_LEN} characters"
        )));
    }
    Ok(room_id)
}

/// The room service.
///
/// Failures are surfaced to the caller and never retried.
#[async_trait]
pub trait RoomApi: Send + Sync {
    /// Create a room and take the host seat.
    ///
    /// # Errors
    ///
    /// [`DuelError::CreateFailed`] on a non-success response,
    /// [`DuelError::Serialization`] for an unreadable success body,
    /// [`DuelError::Http`] when the request could not be made.
    async fn create_room(&self, player_name: &str, difficulty: Difficulty) -> Result<RoomTicket>;

    /// Join an existing room as guest.
    ///
    /// # Errors
    ///
    /// [`DuelError::JoinFailed`] carrying the server detail (or `join_failed`)
    /// on a non-success response, [`DuelError::Http`] when the request could
    /// not be made.
    async fn join_room(&self, room_id: &str, player_name: &str) -> Result<RoomTicket>;

    /// Fetch the public summary of a room.
    ///
    /// # Errors
    ///
    /// [`DuelError::RequestFailed`] on a non-success response,
    /// [`DuelError::Http`] when the request could not be made.
    async fn room_info(&self, room_id: &str) -> Result<RoomInfo>;
}

/// Pull a string `detail` out of an error body. Validation errors carry a
/// list there instead, which yields `None`.
fn error_detail(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        detail: Option<serde_json::Value>,
    }
    let body: ErrorBody = serde_json::from_str(body).ok()?;
    match body.detail? {
        serde_json::Value::String(detail) if !detail.is_empty() => Some(detail),
        _ => None,
    }
}

#[cfg(feature = "http-api")]
pub use http::HttpRoomApi;

#[cfg(feature = "http-api")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::de::DeserializeOwned;
    use tracing::{debug, warn};

    use super::{error_detail, RoomApi, RoomInfo, RoomTicket};
    use crate::error::{DuelError, Result};
    use crate::protocol::Difficulty;

    /// [`RoomApi`] over HTTP with `reqwest`.
    #[derive(Debug, Clone)]
    pub struct HttpRoomApi {
        base: String,
        client: reqwest::Client,
    }

    impl HttpRoomApi {
        /// Talk to the room service at `base` (for example
        /// `http://localhost:8000`), giving each request `timeout`.
        ///
        /// # Errors
        ///
        /// [`DuelError::Http`] if the HTTP client cannot be built.
        pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| DuelError::Http(format!("HTTP client error: {e}")))?;
            Ok(Self {
                base: base.into().trim_end_matches('/').to_owned(),
                client,
            })
        }

        pub fn base(&self) -> &str {
            &self.base
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        /// Send `req`. A non-success status is returned as `Err((status, body))`.
        async fn call<T: DeserializeOwned>(
            &self,
            req: reqwest::RequestBuilder,
        ) -> Result<std::result::Result<T, (u16, String)>> {
            let resp = req
                .send()
                .await
                .map_err(|e| DuelError::Http(format!("request failed: {e}")))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                debug!(status = status.as_u16(), body = %body, "room service error response");
                return Ok(Err((status.as_u16(), body)));
            }
            let body = resp
                .text()
                .await
                .map_err(|e| DuelError::Http(format!("failed to read response: {e}")))?;
            Ok(Ok(serde_json::from_str(&body)?))
        }
    }

    #[async_trait]
    impl RoomApi for HttpRoomApi {
        async fn create_room(
            &self,
            player_name: &str,
            difficulty: Difficulty,
        ) -> Result<RoomTicket> {
            let body = serde_json::json!({
                "player_name": player_name,
                "difficulty": difficulty.as_str(),
            });
            let req = self.client.post(self.url("/api/room/create")).json(&body);
            self.call(req).await?.map_err(|(status, _)| {
                warn!(status, "create room rejected");
                DuelError::CreateFailed
            })
        }

        async fn join_room(&self, room_id: &str, player_name: &str) -> Result<RoomTicket> {
            let body = serde_json::json!({
                "room_id": room_id,
                "player_name": player_name,
            });
            let req = self.client.post(self.url("/api/room/join")).json(&body);
            self.call(req).await?.map_err(|(status, body)| {
                let detail = error_detail(&body).unwrap_or_else(|| "join_failed".to_owned());
                warn!(status, detail = %detail, "join room rejected");
                DuelError::JoinFailed(detail)
            })
        }

        async fn room_info(&self, room_id: &str) -> Result<RoomInfo> {
            let req = self
                .client
                .get(self.url("/api/room/info"))
                .query(&[("room_id", room_id)]);
            self.call(req)
                .await?
                .map_err(|(status, _)| DuelError::RequestFailed { status })
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn nickname_bounds() {
        assert_eq!(validate_nickname("  Alice ").unwrap(), "Alice");
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"x".repeat(20)).is_ok());
        assert!(validate_nickname(&"x".repeat(21)).is_err());
        // Characters, not bytes.
        assert!(validate_nickname(&"数".repeat(20)).is_ok());
    }

    #[test]
    fn room_id_must_be_six_characters() {
        assert_eq!(validate_room_id(" 123456 ").unwrap(), "123456");
        assert!(validate_room_id("12345").is_err());
        assert!(validate_room_id("1234567").is_err());
        assert!(matches!(
            validate_room_id(""),
            Err(DuelError::InvalidInput(_))
        ));
    }

    #[test]
    fn detail_extraction() {
        assert_eq!(
            error_detail(r#"{"detail":"room_full"}"#).as_deref(),
            Some("room_full")
        );
        assert_eq!(error_detail(r#"{"detail":[{"loc":["body"]}]}"#), None);
        assert_eq!(error_detail(r#"{"detail":""}"#), None);
        assert_eq!(error_detail("Internal Server Error"), None);
    }

    #[test]
    fn ticket_normalizes_difficulty() {
        let ticket: RoomTicket = serde_json::from_str(
            r#"{"room_id":"123456","player_id":"p","player_token":"t","role":"guest","difficulty":"Very Hard"}"#,
        )
        .unwrap();
        assert_eq!(ticket.role, Role::Guest);
        assert_eq!(ticket.difficulty, Difficulty::VeryHard);

        let ticket: RoomTicket = serde_json::from_str(
            r#"{"room_id":"123456","player_id":"p","player_token":"t","role":"host"}"#,
        )
        .unwrap();
        assert_eq!(ticket.difficulty, Difficulty::Medium);
    }

    #[test]
    fn room_info_before_match_has_no_puzzle() {
        let info: RoomInfo = serde_json::from_str(
            r#"{"room_id":"123456","status":"waiting","difficulty":"easy",
                "host":{"nickname":"Alice","online":true},"guest":null,
                "puzzle_id":null,"puzzle":null}"#,
        )
        .unwrap();
        assert_eq!(info.status, MatchStatus::Waiting);
        assert!(info.host.online);
        assert!(info.guest.is_none());
        assert!(info.puzzle.is_none());
    }

    #[cfg(feature = "http-api")]
    mod over_http {
        use super::*;
        use std::time::Duration;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        /// Serve one HTTP response and report the raw request it answered.
        async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = sock.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap())
                            })
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + length || n == 0 {
                            break;
                        }
                    }
                    if n == 0 {
                        break;
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(response.as_bytes()).await.unwrap();
                let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
            });
            (format!("http://{addr}"), rx)
        }

        fn api(base: &str) -> HttpRoomApi {
            HttpRoomApi::new(format!("{base}/"), Duration::from_secs(5)).unwrap()
        }

        #[tokio::test]
        async fn create_room_posts_name_and_difficulty() {
            let (base, request) = serve_once(
                "200 OK",
                r#"{"room_id":"654321","player_id":"p1","player_token":"t1","role":"host","difficulty":"hard"}"#,
            )
            .await;
            let ticket = api(&base)
                .create_room("Alice", Difficulty::Hard)
                .await
                .unwrap();
            assert_eq!(ticket.room_id, "654321");
            assert_eq!(ticket.role, Role::Host);

            let request = request.await.unwrap();
            assert!(request.starts_with("POST /api/room/create "));
            assert!(request.contains(r#""player_name":"Alice""#));
            assert!(request.contains(r#""difficulty":"hard""#));
        }

        #[tokio::test]
        async fn create_room_rejection_is_create_failed() {
            let (base, _request) = serve_once("500 Internal Server Error", "{}").await;
            let err = api(&base)
                .create_room("Alice", Difficulty::Medium)
                .await
                .unwrap_err();
            assert!(matches!(err, DuelError::CreateFailed));
            assert_eq!(err.to_string(), "create_failed");
        }

        #[tokio::test]
        async fn join_room_rejection_carries_detail() {
            let (base, _request) = serve_once("400 Bad Request", r#"{"detail":"room_full"}"#).await;
            let err = api(&base).join_room("123456", "Bob").await.unwrap_err();
            assert!(matches!(err, DuelError::JoinFailed(ref d) if d == "room_full"));
        }

        #[tokio::test]
        async fn join_room_rejection_without_detail() {
            let (base, _request) =
                serve_once("422 Unprocessable Entity", r#"{"detail":[{"msg":"bad"}]}"#).await;
            let err = api(&base).join_room("123456", "Bob").await.unwrap_err();
            assert_eq!(err.to_string(), "join_failed");
        }

        #[tokio::test]
        async fn room_info_queries_by_id() {
            let (base, request) = serve_once(
                "200 OK",
                r#"{"room_id":"123456","status":"playing","difficulty":"medium","host":{"nickname":"Alice","online":true},"guest":{"nickname":"Bob","online":false},"puzzle_id":"p1","puzzle":null}"#,
            )
            .await;
            let info = api(&base).room_info("123456").await.unwrap();
            assert_eq!(info.status, MatchStatus::Playing);
            assert_eq!(info.guest.unwrap().nickname, "Bob");
            assert!(request
                .await
                .unwrap()
                .starts_with("GET /api/room/info?room_id=123456 "));
        }

        #[tokio::test]
        async fn room_info_not_found_is_request_failed() {
            let (base, _request) = serve_once("404 Not Found", r#"{"detail":"room_not_found"}"#).await;
            let err = api(&base).room_info("000000").await.unwrap_err();
            assert!(matches!(err, DuelError::RequestFailed { status: 404 }));
        }

        #[tokio::test]
        async fn malformed_success_body_is_serialization_error() {
            let (base, _request) = serve_once("200 OK", r#"{"room_id":"654321"}"#).await;
            let err = api(&base)
                .create_room("Alice", Difficulty::Easy)
                .await
                .unwrap_err();
            assert!(matches!(err, DuelError::Serialization(_)), "got {err:?}");
        }

        #[tokio::test]
        async fn unreachable_service_is_http_error() {
            let err = api("http://127.0.0.1:1")
                .join_room("123456", "Bob")
                .await
                .unwrap_err();
            assert!(matches!(err, DuelError::Http(_)));
        }
    }
}
