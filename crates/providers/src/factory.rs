//! Provider-specific adapter construction, called by the engine registry
//! on a cache miss (spec §4.F).

use ovp_core::{GatewayError, ProviderAdapter, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::azure::{AzureAdapter, AzureConfig};
use crate::coqui::{CoquiAdapter, CoquiConfig};
use crate::elevenlabs::{ElevenLabsAdapter, ElevenLabsConfig};
use crate::espeak::{EspeakAdapter, EspeakConfig};
use crate::google::{GoogleAdapter, GoogleConfig};
use crate::mock::MockAdapter;
use crate::playht::{PlayHtAdapter, PlayHtConfig};

/// Every provider id the factory knows how to construct. The resolver
/// consults this before touching the engine registry so an unresolvable
/// facade voice (e.g. `no-such-engine-xyz`) reports as a voice-not-found
/// miss without constructing or invoking anything (spec §4.G, §8).
pub const KNOWN_PROVIDERS: &[&str] =
    &["mock", "espeak", "coqui", "azure", "google", "playht", "elevenlabs"];

fn required<'a>(fields: &'a BTreeMap<String, String>, key: &str, provider: &str) -> Result<&'a str> {
    fields
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| GatewayError::Config(format!("{provider} requires credential field '{key}'")))
}

pub fn build_adapter(
    provider: &str,
    credentials: Option<&BTreeMap<String, String>>,
) -> Result<Arc<dyn ProviderAdapter>> {
    match provider {
        "mock" => Ok(Arc::new(MockAdapter)),

        "espeak" => Ok(Arc::new(EspeakAdapter::new(EspeakConfig::default()))),

        "coqui" => Ok(Arc::new(CoquiAdapter::new(CoquiConfig::default())?)),

        "azure" => {
            let fields = credentials
                .ok_or_else(|| GatewayError::Config("azure requires credentials".to_string()))?;
            Ok(Arc::new(AzureAdapter::new(AzureConfig {
                api_key: required(fields, "api_key", "azure")?.to_string(),
                region: required(fields, "region", "azure")?.to_string(),
            })?))
        }

        "google" => {
            let fields = credentials
                .ok_or_else(|| GatewayError::Config("google requires credentials".to_string()))?;
            Ok(Arc::new(GoogleAdapter::new(GoogleConfig {
                api_key: required(fields, "api_key", "google")?.to_string(),
            })?))
        }

        "playht" => {
            let fields = credentials
                .ok_or_else(|| GatewayError::Config("playht requires credentials".to_string()))?;
            Ok(Arc::new(PlayHtAdapter::new(PlayHtConfig {
                user_id: required(fields, "user_id", "playht")?.to_string(),
                api_key: required(fields, "api_key", "playht")?.to_string(),
            })?))
        }

        "elevenlabs" => {
            let fields = credentials
                .ok_or_else(|| GatewayError::Config("elevenlabs requires credentials".to_string()))?;
            Ok(Arc::new(ElevenLabsAdapter::new(ElevenLabsConfig {
                api_key: required(fields, "api_key", "elevenlabs")?.to_string(),
            })?))
        }

        other => Err(GatewayError::NotFound(format!("unknown provider '{other}'"))),
    }
}
