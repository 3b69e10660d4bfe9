//! Provider client pool, built once at startup
//!
//! Holds up to two credentials (primary/backup) per provider together with
//! the HTTP backend that uses them. The pool is immutable after
//! [`ClientPool::build`] and is shared by the dispatcher and the status
//! reporter.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::normalize::normalize;
use crate::providers::types::mask_secret;
use crate::providers::{
    CompletionBackend, Credential, GeminiClient, GeminiSettings, OpenAiClient, OpenAiSettings,
    Stage,
};
use crate::types::ProviderKind;

const PROBE_PROMPT: &str = "test";

/// Raw configured keys for one provider. Blank strings count as unset.
#[derive(Clone, Default)]
pub struct ProviderKeys {
    pub primary: Option<String>,
    pub backup: Option<String>,
}

impl ProviderKeys {
    pub fn new(primary: Option<String>, backup: Option<String>) -> Self {
        Self { primary, backup }
    }
}

impl std::fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("primary", &self.primary.as_deref().map(mask_secret))
            .field("backup", &self.backup.as_deref().map(mask_secret))
            .finish()
    }
}

/// Everything needed to construct the pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub openai: OpenAiSettings,
    pub gemini: GeminiSettings,
    /// Per-request timeout of the provider HTTP clients
    pub http_timeout: Duration,
    /// Deadline of the Gemini connectivity probe
    pub probe_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            openai: OpenAiSettings::default(),
            gemini: GeminiSettings::default(),
            http_timeout: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(15),
        }
    }
}

/// Credentials for one provider as resolved at startup
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    primary: Option<Credential>,
    backup: Option<Credential>,
    primary_configured: bool,
    backup_configured: bool,
    available: bool,
}

impl ProviderCredentials {
    pub fn from_parts(primary: Option<Credential>, backup: Option<Credential>, available: bool) -> Self {
        Self {
            primary_configured: primary.is_some(),
            backup_configured: backup.is_some(),
            primary,
            backup,
            available,
        }
    }

    pub fn primary(&self) -> Option<&Credential> {
        self.primary.as_ref()
    }

    pub fn backup(&self) -> Option<&Credential> {
        self.backup.as_ref()
    }

    /// A primary key was present in configuration (even if rejected)
    pub fn primary_configured(&self) -> bool {
        self.primary_configured
    }

    pub fn backup_configured(&self) -> bool {
        self.backup_configured
    }

    /// The primary credential is usable for requests
    pub fn is_available(&self) -> bool {
        self.available && self.primary.is_some()
    }
}

/// One provider's backend plus its credentials
#[derive(Clone)]
pub struct ProviderSlot {
    backend: Arc<dyn CompletionBackend>,
    credentials: ProviderCredentials,
}

impl ProviderSlot {
    pub fn backend(&self) -> &Arc<dyn CompletionBackend> {
        &self.backend
    }

    pub fn credentials(&self) -> &ProviderCredentials {
        &self.credentials
    }
}

#[derive(Clone)]
pub struct ClientPool {
    openai: ProviderSlot,
    gemini: ProviderSlot,
}

impl ClientPool {
    /// Build HTTP clients from `config` and resolve credentials.
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        let openai: Arc<dyn CompletionBackend> =
            Arc::new(OpenAiClient::new(&config.openai, config.http_timeout)?);
        let gemini: Arc<dyn CompletionBackend> =
            Arc::new(GeminiClient::new(&config.gemini, config.http_timeout)?);

        Ok(Self::build(
            openai,
            &config.openai.keys,
            gemini,
            &config.gemini.keys,
            config.probe_timeout,
        )
        .await)
    }

    /// Resolve credentials against the given backends.
    ///
    /// OpenAI is available as soon as its primary key is accepted. Gemini is
    /// only available if one probe call with the primary key succeeds within
    /// `probe_timeout`. Nothing here fails: rejected keys are logged and left
    /// unset.
    pub async fn build(
        openai_backend: Arc<dyn CompletionBackend>,
        openai_keys: &ProviderKeys,
        gemini_backend: Arc<dyn CompletionBackend>,
        gemini_keys: &ProviderKeys,
        probe_timeout: Duration,
    ) -> Self {
        let mut openai_credentials = load_credentials(ProviderKind::OpenAi, openai_keys);
        openai_credentials.available = openai_credentials.primary.is_some();
        if openai_credentials.available {
            info!("OpenAI API initialized (model: {})", openai_backend.model());
        }

        let mut gemini_credentials = load_credentials(ProviderKind::Gemini, gemini_keys);
        if let Some(primary) = gemini_credentials.primary.as_ref() {
            gemini_credentials.available =
                probe(ProviderKind::Gemini, gemini_backend.as_ref(), primary, probe_timeout).await;
        }

        info!(
            "Provider pool ready: OpenAI={}, Gemini={}",
            openai_credentials.is_available(),
            gemini_credentials.is_available()
        );

        Self {
            openai: ProviderSlot {
                backend: openai_backend,
                credentials: openai_credentials,
            },
            gemini: ProviderSlot {
                backend: gemini_backend,
                credentials: gemini_credentials,
            },
        }
    }

    pub fn slot(&self, kind: ProviderKind) -> &ProviderSlot {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    pub fn is_available(&self, kind: ProviderKind) -> bool {
        self.slot(kind).credentials.is_available()
    }
}

fn load_credentials(kind: ProviderKind, keys: &ProviderKeys) -> ProviderCredentials {
    let (primary, primary_configured) = load_one(kind, Stage::Primary, keys.primary.as_deref());
    let (backup, backup_configured) = load_one(kind, Stage::Backup, keys.backup.as_deref());

    ProviderCredentials {
        primary,
        backup,
        primary_configured,
        backup_configured,
        available: false,
    }
}

fn load_one(kind: ProviderKind, stage: Stage, raw: Option<&str>) -> (Option<Credential>, bool) {
    let Some(raw) = raw.filter(|k| !k.trim().is_empty()) else {
        if stage == Stage::Primary {
            warn!("{} {} API key not set, provider path disabled", kind, stage);
        }
        return (None, false);
    };

    match Credential::parse(raw) {
        Ok(credential) => {
            info!("{} {} API key loaded", kind, stage);
            (Some(credential), true)
        }
        Err(e) => {
            error!("Failed to initialize {} {} client: {}", kind, stage, e);
            (None, true)
        }
    }
}

async fn probe(
    kind: ProviderKind,
    backend: &dyn CompletionBackend,
    credential: &Credential,
    timeout: Duration,
) -> bool {
    let params = normalize(None, None, kind.max_tokens_ceiling());
    match tokio::time::timeout(timeout, backend.complete(credential, PROBE_PROMPT, params)).await {
        Ok(Ok(_)) => {
            info!("{} API initialized and probed (model: {})", kind, backend.model());
            true
        }
        Ok(Err(e)) => {
            error!("Failed to initialize {}: {:#}", kind, e);
            false
        }
        Err(_) => {
            error!("{} connectivity probe timed out after {:?}", kind, timeout);
            false
        }
    }
}
