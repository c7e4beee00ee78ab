//! The streaming session protocol (spec §4.J): a long-lived WebSocket
//! connection that authenticates once at upgrade, then serves repeated
//! `speak`/`list_voices`/`engines` commands, each re-checking the key's
//! rate limit independently.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use ovp_core::{ApiKeyRecord, AudioFormat, GatewayError, SessionInfo, SessionState, SynthesizeOptions};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::auth;
use crate::state::AppState;

const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;
const EMBEDDED_TEXT_LIMIT: usize = 500;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Deserialize)]
struct WsAuthQuery {
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientFrame {
    #[serde(rename = "speak")]
    Speak {
        text: String,
        #[serde(default)]
        engine: Option<String>,
        #[serde(default)]
        voice: Option<String>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default, rename = "sampleRate")]
        sample_rate: Option<u32>,
        #[serde(default)]
        #[allow(dead_code)]
        ssml: Option<bool>,
        #[serde(default)]
        stream: Option<bool>,
        #[serde(default)]
        chunk_size: Option<usize>,
    },
    #[serde(rename = "list_voices", alias = "voices")]
    ListVoices {
        #[serde(default)]
        engine: Option<String>,
    },
    #[serde(rename = "engines")]
    Engines {},
}

#[derive(Serialize)]
struct MetaFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    format: &'a str,
    sample_rate: u32,
    engine: &'a str,
    voice: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<usize>,
}

#[derive(Serialize)]
struct EndFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    bytes: usize,
    chunks: usize,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct ErrorFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    error: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct VoicesFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    voices: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct EnginesFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    engines: Vec<serde_json::Value>,
}

fn extract_presented(headers: &HeaderMap, query: &WsAuthQuery) -> Option<String> {
    if let Some(v) = headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        return Some(v.to_string());
    }
    if let Some(v) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = v.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    query.api_key.clone()
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let presented = extract_presented(&headers, &query);

    let authed = match presented {
        Some(token) => auth::authenticate(&state, &token).await,
        None => Err(GatewayError::Unauthorized("missing API key".to_string())),
    };

    match authed {
        Ok(key) => ws.on_upgrade(move |socket| run_session(socket, state, key)),
        Err(err) => ws.on_upgrade(move |socket| reject_session(socket, err)),
    }
}

async fn reject_session(mut socket: WebSocket, err: GatewayError) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: 1008,
            reason: err.to_string().into(),
        })))
        .await;
}

async fn run_session(mut socket: WebSocket, state: AppState, key: ApiKeyRecord) {
    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed).to_string();
    let mut session = SessionInfo::new(session_id.clone(), key.id.clone(), AudioFormat::Wav, 24_000);
    tracing::debug!(session_id, key_id = %key.id, "session opened");

    loop {
        let next = match timeout(IDLE_TIMEOUT, socket.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {
                tracing::debug!(key_id = %key.id, "session idle timeout, closing");
                break;
            }
        };

        match next {
            Message::Text(text) => {
                if handle_text_frame(&mut socket, &state, &key, &text, &mut session).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    session.state = SessionState::Closing;
    tracing::debug!(
        session_id = %session.id,
        key_id = %key.id,
        bytes_sent = session.bytes_sent,
        chunks_sent = session.chunks_sent,
        "session closed"
    );
}

/// Classifies a raw text frame per spec §4.J rule 4: non-JSON text or a
/// JSON object with no string `type` is `INVALID_JSON`; valid JSON whose
/// `type` names no known command is `UNKNOWN_COMMAND`, distinct from the
/// former; anything else is parsed into a `ClientFrame`, with a
/// structurally malformed known command (e.g. `speak` missing `text`)
/// also reported as `INVALID_JSON`.
fn parse_client_frame(text: &str) -> Result<ClientFrame, (&'static str, &'static str)> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| ("invalid JSON frame", "INVALID_JSON"))?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(("invalid JSON frame", "INVALID_JSON"))?;
    if !matches!(kind, "speak" | "list_voices" | "voices" | "engines") {
        return Err(("unknown command type", "UNKNOWN_COMMAND"));
    }

    serde_json::from_value(value).map_err(|_| ("invalid JSON frame", "INVALID_JSON"))
}

/// Returns `Err` only when the socket itself is no longer usable;
/// protocol-level mistakes (bad JSON, unknown command) are reported as
/// `error` frames and the loop continues (spec §4.J rule 4).
async fn handle_text_frame(
    socket: &mut WebSocket,
    state: &AppState,
    key: &ApiKeyRecord,
    text: &str,
    session: &mut SessionInfo,
) -> Result<(), ()> {
    let frame = match parse_client_frame(text) {
        Ok(f) => f,
        Err((error, code)) => return send_error(socket, error, code).await,
    };

    match frame {
        ClientFrame::Speak {
            text,
            engine,
            voice,
            format,
            sample_rate,
            ssml: _,
            stream,
            chunk_size,
        } => {
            handle_speak(socket, state, key, text, engine, voice, format, sample_rate, stream, chunk_size, session).await
        }
        ClientFrame::ListVoices { engine } => handle_list_voices(socket, state, engine).await,
        ClientFrame::Engines {} => handle_engines(socket, state).await,
    }
}

async fn send_error(socket: &mut WebSocket, error: &str, code: &str) -> Result<(), ()> {
    let frame = ErrorFrame { kind: "error", error, code };
    send_json(socket, &frame).await
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let text = serde_json::to_string(value).map_err(|_| ())?;
    socket.send(Message::Text(text)).await.map_err(|_| ())
}

#[allow(clippy::too_many_arguments)]
async fn handle_speak(
    socket: &mut WebSocket,
    state: &AppState,
    key: &ApiKeyRecord,
    text: String,
    engine: Option<String>,
    voice: Option<String>,
    format: Option<String>,
    sample_rate: Option<u32>,
    stream: Option<bool>,
    chunk_size: Option<usize>,
    session: &mut SessionInfo,
) -> Result<(), ()> {
    if text.chars().count() > EMBEDDED_TEXT_LIMIT {
        return send_error(socket, "text exceeds maximum length", "TEXT_TOO_LONG").await;
    }

    if let Err(e) = auth::enforce_rate_limit(state, key) {
        return send_error(socket, &e.label(), e.tag()).await;
    }

    let engine = engine.unwrap_or_else(|| "espeak".to_string());
    let voice = voice.unwrap_or_else(|| "en".to_string());
    let requested_format = format
        .as_deref()
        .and_then(AudioFormat::from_str_loose)
        .unwrap_or(AudioFormat::Wav);
    let sample_rate = sample_rate.unwrap_or(24_000);
    let stream = stream.unwrap_or(false);
    let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);

    let facade_voice_id = format!("{engine}-{voice}");

    let resolver = ovp_voice::VoiceResolver {
        static_voices: &state.static_voices,
        registry: &state.registry,
        system_credentials: &|provider: &str| state.system_credentials(provider),
    };

    let binding = match resolver.resolve(&facade_voice_id, key, requested_format, sample_rate).await {
        Ok(b) => b,
        Err(e) => return send_error(socket, &e.label(), e.tag()).await,
    };

    let policy = key.engine_config.get(&binding.provider);
    let credentials = resolver.credentials_for(&binding.provider, policy);
    let adapter = match state.registry.get(&binding.provider, credentials.as_ref()).await {
        Ok(a) => a,
        Err(e) => return send_error(socket, &e.label(), e.tag()).await,
    };

    let options = SynthesizeOptions {
        voice_id: binding.native_voice_id.clone(),
        format: requested_format,
        sample_rate,
        ssml: false,
    };

    let started = Instant::now();
    let result = adapter.synthesize(&text, &options).await;

    let audio = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            state
                .record_usage(&key.id, &binding.provider, "ws:speak", text.chars().count(), started.elapsed().as_millis() as u64, 500)
                .await;
            return send_error(socket, &e.label(), e.tag()).await;
        }
    };

    let meta = MetaFrame {
        kind: "meta",
        format: requested_format.content_type(),
        sample_rate,
        engine: &binding.provider,
        voice: &binding.native_voice_id,
        bytes: Some(audio.len()),
        stream,
        chunk_size: stream.then_some(chunk_size),
        chunks: None,
    };
    send_json(socket, &meta).await?;

    let mut chunks = 0usize;
    for chunk in audio.chunks(if stream { chunk_size } else { audio.len().max(1) }) {
        socket.send(Message::Binary(chunk.to_vec())).await.map_err(|_| ())?;
        chunks += 1;
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let end = EndFrame {
        kind: "end",
        bytes: audio.len(),
        chunks,
        elapsed_ms,
    };
    send_json(socket, &end).await?;

    state
        .record_usage(&key.id, &binding.provider, "ws:speak", text.chars().count(), elapsed_ms, 200)
        .await;

    session.format = requested_format;
    session.sample_rate = sample_rate;
    session.bytes_sent += audio.len() as u64;
    session.chunks_sent += chunks as u64;

    Ok(())
}

async fn handle_list_voices(socket: &mut WebSocket, state: &AppState, engine: Option<String>) -> Result<(), ()> {
    let mut voices = Vec::new();
    if let Some(provider) = engine {
        if let Ok(adapter) = state.registry.get(&provider, None).await {
            if let Ok(list) = adapter.list_voices().await {
                voices = list
                    .into_iter()
                    .map(|v| serde_json::json!({"id": format!("{provider}-{}", v.id), "name": v.name}))
                    .collect();
            }
        }
    }
    send_json(socket, &VoicesFrame { kind: "voices", voices }).await
}

async fn handle_engines(socket: &mut WebSocket, _state: &AppState) -> Result<(), ()> {
    let engines = ovp_providers::KNOWN_PROVIDERS
        .iter()
        .map(|p| serde_json::json!({"id": p, "name": p}))
        .collect();
    send_json(socket, &EnginesFrame { kind: "engines", engines }).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_text_is_invalid_json() {
        let err = parse_client_frame("not json").unwrap_err();
        assert_eq!(err, ("invalid JSON frame", "INVALID_JSON"));
    }

    #[test]
    fn json_without_a_type_field_is_invalid_json() {
        let err = parse_client_frame(r#"{"text":"hi"}"#).unwrap_err();
        assert_eq!(err, ("invalid JSON frame", "INVALID_JSON"));
    }

    #[test]
    fn unrecognized_type_is_unknown_command_not_invalid_json() {
        let err = parse_client_frame(r#"{"type":"bogus"}"#).unwrap_err();
        assert_eq!(err, ("unknown command type", "UNKNOWN_COMMAND"));
    }

    #[test]
    fn voices_is_accepted_as_an_alias_for_list_voices() {
        let frame = parse_client_frame(r#"{"type":"voices","engine":"espeak"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::ListVoices { engine: Some(e) } if e == "espeak"));
    }

    #[test]
    fn known_type_with_missing_required_field_is_invalid_json() {
        // "speak" requires `text`; this is a recognized command type but a
        // structurally malformed one, still reported as INVALID_JSON.
        let err = parse_client_frame(r#"{"type":"speak"}"#).unwrap_err();
        assert_eq!(err, ("invalid JSON frame", "INVALID_JSON"));
    }
}
