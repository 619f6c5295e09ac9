use crate::env::{
    env_non_empty, LOG_SHIPPER_BASE_URL_ENV, LOG_SHIPPER_ENDPOINT_ENV, LOG_SHIPPER_SESSION_ID_ENV,
    LOG_SHIPPER_TOKEN_ENV,
};

/// Endpoint used when neither an explicit endpoint nor a base URL is set.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/v1/logs";

/// Path appended to an alternate base URL.
pub const INGEST_PATH: &str = "/api/v1/logs";

/// Prefix every session id is grouped under.
pub const SESSION_ID_PREFIX: &str = "session_";

/// Connection settings for the remote ingestion endpoint.
///
/// Build it explicitly with [`ShipperConfig::new`] or resolve it once from
/// the environment with [`ShipperConfig::from_env`], then hand it to the
/// dispatcher. Missing token or session id is not an error here: the
/// dispatcher simply stays disabled until a valid config is installed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShipperConfig {
    /// Full URL batches are POSTed to.
    pub endpoint: String,
    pub token: Option<String>,
    /// Already normalized to carry [`SESSION_ID_PREFIX`].
    pub session_id: Option<String>,
}

impl ShipperConfig {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.filter(|t| !t.trim().is_empty()),
            session_id: session_id
                .filter(|s| !s.trim().is_empty())
                .map(|s| normalize_session_id(&s)),
        }
    }

    /// Resolve the configuration from `LOG_SHIPPER_*` environment variables.
    ///
    /// Endpoint precedence: `LOG_SHIPPER_ENDPOINT`, then
    /// `LOG_SHIPPER_BASE_URL` + [`INGEST_PATH`], then [`DEFAULT_ENDPOINT`].
    pub fn from_env() -> Self {
        let endpoint = env_non_empty(LOG_SHIPPER_ENDPOINT_ENV)
            .or_else(|| env_non_empty(LOG_SHIPPER_BASE_URL_ENV).map(|base| endpoint_from_base(&base)))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Self::new(
            endpoint,
            env_non_empty(LOG_SHIPPER_TOKEN_ENV),
            env_non_empty(LOG_SHIPPER_SESSION_ID_ENV),
        )
    }

    /// `true` iff both token and session id are present.
    pub fn is_valid(&self) -> bool {
        self.token.is_some() && self.session_id.is_some()
    }

    /// Names of the absent required values, token first.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.token.is_none() {
            missing.push("token");
        }
        if self.session_id.is_none() {
            missing.push("session_id");
        }
        missing
    }

    pub fn masked_token(&self) -> Option<String> {
        self.token.as_deref().map(mask)
    }

    pub fn masked_session_id(&self) -> Option<String> {
        self.session_id.as_deref().map(mask)
    }
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
            session_id: None,
        }
    }
}

/// Prefix `id` with [`SESSION_ID_PREFIX`] unless it already carries it.
pub fn normalize_session_id(id: &str) -> String {
    let id = id.trim();
    if id.starts_with(SESSION_ID_PREFIX) {
        id.to_string()
    } else {
        format!("{}{}", SESSION_ID_PREFIX, id)
    }
}

fn endpoint_from_base(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), INGEST_PATH)
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
