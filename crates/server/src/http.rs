//! HTTP surface (spec §6): voice catalog, synthesis, the embedded REST
//! path, and the admin API. Everything funnels through the pipeline
//! stages in `crate::auth` and `crate::wire`; this module is wiring and
//! response shaping.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ovp_core::{
    Alignment, ApiKeyPatch, GatewayError, ProviderKeyPolicy, RateLimitPolicy, SynthesizeOptions,
};
use ovp_voice::VoiceResolver;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{AdminContext, AuthContext};
use crate::error::{ApiError, ApiResult};
use crate::ip_filter::ip_filter_middleware;
use crate::session;
use crate::state::AppState;
use crate::wire::{self, TtsQuery, TtsRequestBody};

pub fn create_router(state: AppState) -> Router {
    let (cors_origins, cors_enabled) = {
        let settings = state.get_settings();
        (settings.server.cors_origins.clone(), settings.server.cors_enabled)
    };
    let cors_layer = build_cors_layer(&cors_origins, cors_enabled);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/v1/voices", get(list_voices))
        .route("/v1/text-to-speech/:voice_id", post(synthesize))
        .route(
            "/v1/text-to-speech/:voice_id/stream/with-timestamps",
            post(synthesize_timestamped),
        )
        .route("/v1/user", get(user_stub))
        .route("/v1/models", get(models_stub))
        .route("/api/speak", post(embedded_speak))
        .route("/api/voices", get(embedded_voices))
        .route("/api/engines", get(embedded_engines))
        .route("/api/ws", get(session::ws_upgrade))
        .route("/ws", get(session::ws_upgrade))
        .route("/admin/api/keys", get(admin_list_keys).post(admin_create_key))
        .route(
            "/admin/api/keys/:id",
            axum::routing::patch(admin_update_key).delete(admin_delete_key),
        )
        .route(
            "/admin/api/keys/:id/engine-config",
            get(admin_get_engine_config).put(admin_set_engine_config),
        )
        .route(
            "/admin/api/keys/:id/credentials/:provider",
            axum::routing::put(admin_set_key_credentials),
        )
        .route(
            "/admin/api/credentials",
            get(admin_get_system_credentials),
        )
        .route(
            "/admin/api/credentials/:provider",
            axum::routing::put(admin_set_system_credentials),
        )
        .route("/admin/api/usage", get(admin_usage))
        .layer(axum::middleware::from_fn_with_state(state.clone(), ip_filter_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Builds the CORS policy from configured origins (spec §6 `CORS_ORIGIN`),
/// falling back to `localhost:3000` when none are configured and to
/// permissive-for-dev when CORS is explicitly disabled.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled; allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::PATCH, Method::PUT])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "invalid CORS origin, dropping");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::error!("all configured CORS origins were invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::PATCH, Method::PUT])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::PATCH, Method::PUT])
        .allow_headers(Any)
        .allow_credentials(true)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ovp-gateway",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.uptime_seconds(),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.registry.list_health().await;
    let any_ok = health.is_empty() || health.values().any(|h| h.ok);

    let status = if any_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(serde_json::json!({
            "ready": any_ok,
            "adapters": health.iter().map(|(k, v)| (k.clone(), v.ok)).collect::<HashMap<_, _>>(),
        })),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.usage_tracker.stats(None);
    Json(serde_json::json!({
        "uptime_seconds": state.uptime_seconds(),
        "usage": stats,
    }))
}

async fn list_voices(AuthContext(key): AuthContext, State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut voices = Vec::new();
    for provider in ovp_providers::KNOWN_PROVIDERS {
        if !key.provider_enabled(provider) {
            continue;
        }
        let Ok(adapter) = state.registry.get(provider, state.system_credentials(provider).as_ref()).await else {
            continue;
        };
        let Ok(list) = adapter.list_voices().await else {
            continue;
        };
        for v in list {
            let facade = ovp_core::FacadeVoice {
                id: format!("{provider}-{}", v.id),
                name: v.name,
                languages: v.languages,
                gender: v.gender,
                locale: v.locale,
                provider: provider.to_string(),
            };
            voices.push(wire::facade_to_elevenlabs_wire(&facade));
        }
    }
    Ok(Json(serde_json::json!({ "voices": voices })))
}

async fn resolve_and_get_adapter(
    state: &AppState,
    key: &ovp_core::ApiKeyRecord,
    facade_voice_id: &str,
    requested_format: ovp_core::AudioFormat,
    requested_sample_rate: u32,
) -> Result<(ovp_core::VoiceBinding, std::sync::Arc<dyn ovp_core::ProviderAdapter>), GatewayError> {
    let resolver = VoiceResolver {
        static_voices: &state.static_voices,
        registry: &state.registry,
        system_credentials: &|provider: &str| state.system_credentials(provider),
    };

    let binding = resolver
        .resolve(facade_voice_id, key, requested_format, requested_sample_rate)
        .await?;

    let policy = key.engine_config.get(&binding.provider);
    let credentials = resolver.credentials_for(&binding.provider, policy);
    let adapter = state.registry.get(&binding.provider, credentials.as_ref()).await?;

    Ok((binding, adapter))
}

async fn synthesize(
    AuthContext(key): AuthContext,
    State(state): State<AppState>,
    Path(voice_id): Path<String>,
    Query(query): Query<TtsQuery>,
    Json(body): Json<TtsRequestBody>,
) -> ApiResult<axum::response::Response> {
    let max_len = 5000;
    wire::validate_text(&body.text, max_len)?;

    let started = Instant::now();
    let (binding, adapter) = resolve_and_get_adapter(&state, &key, &voice_id, ovp_core::AudioFormat::Wav, 24_000).await?;

    let options = SynthesizeOptions {
        voice_id: binding.native_voice_id.clone(),
        format: ovp_core::AudioFormat::Wav,
        sample_rate: 24_000,
        ssml: false,
    };

    let result = adapter.synthesize(&body.text, &options).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    // spec §7: `ProviderFailed` on this path MAY fall back to a tiny
    // silent MP3 instead of surfacing the error, a configurable legacy
    // behavior for continuity of AAC clients. Every other error kind, and
    // `ProviderFailed` with the flag off, surfaces as its native status.
    let (audio, native, status) = match result {
        Ok(bytes) => (bytes, wire::native_format(&binding.provider), 200),
        Err(GatewayError::ProviderFailed(detail)) if state.get_settings().legacy_mp3_fallback_enabled() => {
            tracing::warn!(
                provider = %binding.provider, error = %detail,
                "provider synthesis failed, responding with legacy silent MP3 fallback (spec §7)"
            );
            (wire::silent_mp3_fallback(), ovp_core::AudioFormat::Mp3, 200)
        }
        Err(e) => {
            state
                .record_usage(&key.id, &binding.provider, "/v1/text-to-speech", body.text.chars().count(), elapsed_ms, e.status_code())
                .await;
            return Err(ApiError(e));
        }
    };

    state
        .record_usage(&key.id, &binding.provider, "/v1/text-to-speech", body.text.chars().count(), elapsed_ms, status)
        .await;

    let (out_bytes, content_type) = wire::apply_output_format(native, audio, query.output_format.as_deref());

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], out_bytes).into_response())
}

#[derive(Serialize)]
struct TimestampedResponse {
    audio_base64: String,
    alignment: Option<Alignment>,
    normalized_alignment: Option<Alignment>,
}

async fn synthesize_timestamped(
    AuthContext(key): AuthContext,
    State(state): State<AppState>,
    Path(voice_id): Path<String>,
    Query(query): Query<TtsQuery>,
    Json(body): Json<TtsRequestBody>,
) -> ApiResult<axum::response::Response> {
    wire::validate_text(&body.text, 5000)?;

    let started = Instant::now();
    let (binding, adapter) = resolve_and_get_adapter(&state, &key, &voice_id, ovp_core::AudioFormat::Wav, 24_000).await?;

    let native_result = adapter.synthesize_timestamped(&body.text, &binding.native_voice_id).await;

    let (audio, alignment) = match native_result {
        Ok((bytes, alignment)) => (bytes, alignment),
        Err(GatewayError::Unsupported(_)) => {
            let options = SynthesizeOptions {
                voice_id: binding.native_voice_id.clone(),
                format: ovp_core::AudioFormat::Wav,
                sample_rate: 24_000,
                ssml: false,
            };
            match adapter.synthesize(&body.text, &options).await {
                Ok(bytes) => (bytes, None),
                Err(e) => {
                    state
                        .record_usage(
                            &key.id,
                            &binding.provider,
                            "/v1/text-to-speech/stream/with-timestamps",
                            body.text.chars().count(),
                            started.elapsed().as_millis() as u64,
                            e.status_code(),
                        )
                        .await;
                    return Err(ApiError(e));
                }
            }
        }
        Err(e) => {
            state
                .record_usage(
                    &key.id,
                    &binding.provider,
                    "/v1/text-to-speech/stream/with-timestamps",
                    body.text.chars().count(),
                    started.elapsed().as_millis() as u64,
                    e.status_code(),
                )
                .await;
            return Err(ApiError(e));
        }
    };

    // Canonical upstream parity requires `null` when the provider has no
    // native timing (spec §4.I, §9 open question). `legacy_alignment`
    // opts an older client back into a synthesized alignment.
    let alignment = if alignment.is_none() && query.legacy_alignment {
        Some(ovp_voice::synthesize_alignment(&body.text, &binding.native_voice_id))
    } else {
        alignment
    };

    state
        .record_usage(
            &key.id,
            &binding.provider,
            "/v1/text-to-speech/stream/with-timestamps",
            body.text.chars().count(),
            started.elapsed().as_millis() as u64,
            200,
        )
        .await;

    let payload = TimestampedResponse {
        audio_base64: BASE64.encode(audio),
        alignment: alignment.clone(),
        normalized_alignment: alignment,
    };
    let bytes = serde_json::to_vec(&payload)
        .map_err(|e| ApiError(GatewayError::Internal(e.to_string())))?;

    // spec §4.I/§6: this response is sent under chunked transfer encoding,
    // not a known-length body. A single-item stream gives hyper no
    // Content-Length to compute, so it falls back to chunked framing.
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(axum::body::Bytes::from(bytes)) });
    let body = Body::from_stream(stream);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

async fn user_stub(AuthContext(_key): AuthContext) -> impl IntoResponse {
    Json(serde_json::json!({
        "subscription": {
            "tier": "free",
            "character_count": 0,
            "character_limit": 10_000_000,
            "can_extend_character_limit": false,
            "allowed_to_extend_character_limit": false,
            "next_character_count_reset_unix": null,
            "voice_limit": 0,
            "professional_voice_limit": 0,
            "can_extend_voice_limit": false,
            "can_use_instant_voice_cloning": false,
            "can_use_professional_voice_cloning": false,
            "currency": "usd",
            "status": "active",
        },
    }))
}

async fn models_stub(AuthContext(_key): AuthContext) -> impl IntoResponse {
    Json(serde_json::json!({
        "models": [
            {
                "model_id": "gateway_multilingual_v1",
                "name": "Gateway Multilingual v1",
                "can_be_finetuned": false,
                "can_do_text_to_speech": true,
                "can_do_voice_conversion": false,
                "languages": [{"language_id": "en", "name": "English"}],
            }
        ],
    }))
}

#[derive(Debug, Deserialize)]
struct EmbeddedSpeakBody {
    text: String,
    #[serde(default)]
    engine: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

async fn embedded_speak(
    AuthContext(key): AuthContext,
    State(state): State<AppState>,
    Json(body): Json<EmbeddedSpeakBody>,
) -> ApiResult<axum::response::Response> {
    let embedded = {
        let settings = state.get_settings();
        settings.embedded.clone()
    };

    wire::validate_text(&body.text, embedded.max_text_length)?;

    let engine = body.engine.unwrap_or(embedded.default_engine.clone());
    let voice = body.voice.unwrap_or_else(|| {
        embedded
            .default_voice
            .strip_prefix(&format!("{engine}-"))
            .map(str::to_string)
            .unwrap_or(embedded.default_voice.clone())
    });
    let requested_format = body
        .format
        .as_deref()
        .and_then(ovp_core::AudioFormat::from_str_loose)
        .unwrap_or(ovp_core::AudioFormat::Pcm16);
    let sample_rate = embedded.default_sample_rate;

    let facade_voice_id = format!("{engine}-{voice}");

    let started = Instant::now();
    let (binding, adapter) = resolve_and_get_adapter(&state, &key, &facade_voice_id, requested_format, sample_rate).await?;

    let options = SynthesizeOptions {
        voice_id: binding.native_voice_id.clone(),
        format: requested_format,
        sample_rate,
        ssml: false,
    };

    let audio = match adapter.synthesize(&body.text, &options).await {
        Ok(bytes) => bytes,
        Err(e) => {
            state
                .record_usage(
                    &key.id,
                    &binding.provider,
                    "/api/speak",
                    body.text.chars().count(),
                    started.elapsed().as_millis() as u64,
                    e.status_code(),
                )
                .await;
            return Err(ApiError(e));
        }
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let native = wire::native_format(&binding.provider);
    let pcm = match (native, requested_format) {
        (ovp_core::AudioFormat::Wav, ovp_core::AudioFormat::Pcm16) => ovp_core::wav_to_pcm16_mono(&audio),
        _ => audio,
    };

    state
        .record_usage(&key.id, &binding.provider, "/api/speak", body.text.chars().count(), elapsed_ms, 200)
        .await;

    let mut headers = axum::http::HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/l16"));
    headers.insert("x-sample-rate", HeaderValue::from_str(&sample_rate.to_string()).unwrap());
    headers.insert("x-channels", HeaderValue::from_static("1"));
    headers.insert("x-bits-per-sample", HeaderValue::from_static("16"));
    headers.insert("x-processing-time-ms", HeaderValue::from_str(&elapsed_ms.to_string()).unwrap());

    Ok((StatusCode::OK, headers, pcm).into_response())
}

#[derive(Debug, Deserialize)]
struct EngineQuery {
    engine: Option<String>,
}

async fn embedded_voices(
    AuthContext(_key): AuthContext,
    State(state): State<AppState>,
    Query(query): Query<EngineQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut voices = Vec::new();
    let providers: Vec<&str> = match &query.engine {
        Some(p) => vec![p.as_str()],
        None => ovp_providers::KNOWN_PROVIDERS.to_vec(),
    };

    for provider in providers {
        let Ok(adapter) = state.registry.get(provider, state.system_credentials(provider).as_ref()).await else {
            continue;
        };
        if let Ok(list) = adapter.list_voices().await {
            voices.extend(list.into_iter().map(|v| serde_json::json!({
                "id": format!("{provider}-{}", v.id),
                "name": v.name,
                "languages": v.languages,
            })));
        }
    }

    Ok(Json(serde_json::json!({ "voices": voices, "count": voices.len() })))
}

async fn embedded_engines(AuthContext(_key): AuthContext, State(state): State<AppState>) -> impl IntoResponse {
    let embedded_default = state.get_settings().embedded.default_engine.clone();
    let mut engines = Vec::new();
    for provider in ovp_providers::KNOWN_PROVIDERS {
        let available = state.registry.get(provider, state.system_credentials(provider).as_ref()).await.is_ok();
        engines.push(serde_json::json!({"id": provider, "name": provider, "available": available}));
    }
    Json(serde_json::json!({ "engines": engines, "default": embedded_default }))
}

// ---- Admin API ----

#[derive(Debug, Deserialize)]
struct CreateKeyRequest {
    name: String,
    #[serde(default, rename = "isAdmin")]
    is_admin: bool,
    #[serde(default, rename = "rateLimit")]
    rate_limit: Option<RateLimitPolicy>,
    #[serde(default, rename = "expiresAt")]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, rename = "allowedVoices")]
    allowed_voices: Option<Vec<String>>,
}

#[derive(Serialize)]
struct CreateKeyResponse {
    #[serde(flatten)]
    summary: ovp_core::ApiKeySummary,
    #[serde(rename = "apiKey")]
    api_key: String,
}

async fn admin_create_key(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Json(body): Json<CreateKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    let (plaintext, record) = state
        .key_repository
        .create(
            body.name,
            body.is_admin,
            true,
            body.rate_limit.unwrap_or_default(),
            body.expires_at,
            body.allowed_voices,
        )
        .await
        .map_err(ApiError)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse {
            summary: (&record).into(),
            api_key: plaintext,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListKeysQuery {
    /// Supplement to the key CRUD surface: filter the listing to keys
    /// whose suffix contains this substring, so an operator can find a
    /// key from the tail a user reports without ever storing the
    /// plaintext (SPEC_FULL.md §10.5).
    suffix: Option<String>,
}

async fn admin_list_keys(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut keys = state.key_repository.list().await.map_err(ApiError)?;
    if let Some(suffix) = query.suffix {
        keys.retain(|k| k.suffix.contains(&suffix));
    }
    Ok(Json(serde_json::json!({ "keys": keys })))
}

async fn admin_update_key(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ApiKeyPatch>,
) -> ApiResult<impl IntoResponse> {
    let record = state.key_repository.update(&id, patch).await.map_err(ApiError)?;
    Ok(Json(ovp_core::ApiKeySummary::from(&record)))
}

async fn admin_delete_key(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.key_repository.delete(&id).await.map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_get_engine_config(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let config = state.key_repository.get_engine_config(&id).await.map_err(ApiError)?;
    Ok(Json(serde_json::json!({ "config": config })))
}

#[derive(Debug, Deserialize)]
struct EngineConfigBody {
    config: HashMap<String, ProviderKeyPolicy>,
    #[serde(default, rename = "allowedVoices")]
    allowed_voices: Option<Vec<String>>,
}

async fn admin_set_engine_config(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EngineConfigBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .key_repository
        .set_engine_config(&id, body.config, body.allowed_voices)
        .await
        .map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Per-key custom provider credentials (SPEC_FULL.md §10.5): merges into
/// the key's existing engine config rather than replacing it wholesale,
/// since a key may have other providers configured already.
async fn admin_set_key_credentials(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Path((id, provider)): Path<(String, String)>,
    Json(fields): Json<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let mut config = state.key_repository.get_engine_config(&id).await.map_err(ApiError)?;
    config.insert(
        provider,
        ProviderKeyPolicy {
            enabled: true,
            use_custom_credentials: true,
            custom_credentials: Some(fields),
        },
    );
    state
        .key_repository
        .set_engine_config(&id, config, None)
        .await
        .map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_get_system_credentials(AdminContext(_admin): AdminContext, State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "providers": state.credential_store.get_masked() }))
}

async fn admin_set_system_credentials(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(fields): Json<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    state.credential_store.set(&provider, fields).await.map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct UsageQuery {
    since: Option<chrono::DateTime<chrono::Utc>>,
}

async fn admin_usage(
    AdminContext(_admin): AdminContext,
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> impl IntoResponse {
    Json(state.usage_tracker.stats(query.since))
}
