//! Login configuration.

use url::Url;

const DEFAULT_STAY_SESSION_TTL_SECONDS: i64 = 60 * 86_400;
const DEFAULT_ABUSE_THRESHOLD: u64 = 10;
const DEFAULT_ABUSE_WINDOW_SECONDS: u64 = 60 * 60;
const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 5 * 60;
const DEFAULT_LOGIN_VIEW: &str = "/login";
const DEFAULT_TWO_FACTOR_VIEW: &str = "/login/two-factor";

const ENV_ABUSE_THRESHOLD: &str = "GATEHOUSE_ABUSE_THRESHOLD";
const ENV_ABUSE_WINDOW_SECONDS: &str = "GATEHOUSE_ABUSE_WINDOW_SECONDS";
const ENV_STAY_SESSION_TTL_SECONDS: &str = "GATEHOUSE_STAY_SESSION_TTL_SECONDS";
const ENV_DEFAULT_VIEW: &str = "GATEHOUSE_DEFAULT_VIEW";

#[derive(Clone, Debug)]
pub struct LoginConfig {
    base_url: String,
    login_view: String,
    two_factor_view: String,
    default_view: Option<String>,
    stay_session_ttl_seconds: i64,
    abuse_threshold: u64,
    abuse_window_seconds: u64,
    challenge_ttl_seconds: u64,
    rp_id: String,
    rp_origin: String,
}

impl LoginConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let rp_id = Url::parse(&base_url)
            .ok()
            .and_then(|u: Url| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        // Ensure origin does not have a trailing slash
        let rp_origin = base_url.trim_end_matches('/').to_string();

        Self {
            base_url,
            login_view: DEFAULT_LOGIN_VIEW.to_string(),
            two_factor_view: DEFAULT_TWO_FACTOR_VIEW.to_string(),
            default_view: None,
            stay_session_ttl_seconds: DEFAULT_STAY_SESSION_TTL_SECONDS,
            abuse_threshold: DEFAULT_ABUSE_THRESHOLD,
            abuse_window_seconds: DEFAULT_ABUSE_WINDOW_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            rp_id,
            rp_origin,
        }
    }

    /// Build from a base URL with `GATEHOUSE_*` environment overrides.
    #[must_use]
    pub fn from_env(base_url: String) -> Self {
        let mut config = Self::new(base_url);
        if let Some(threshold) = parse_u64_env(ENV_ABUSE_THRESHOLD) {
            config.abuse_threshold = threshold;
        }
        if let Some(window) = parse_u64_env(ENV_ABUSE_WINDOW_SECONDS) {
            config.abuse_window_seconds = window;
        }
        if let Some(ttl) = parse_u64_env(ENV_STAY_SESSION_TTL_SECONDS) {
            config.stay_session_ttl_seconds = i64::try_from(ttl).unwrap_or(i64::MAX);
        }
        if let Ok(view) = std::env::var(ENV_DEFAULT_VIEW) {
            let view = view.trim().to_string();
            if !view.is_empty() {
                config.default_view = Some(view);
            }
        }
        config
    }

    #[must_use]
    pub fn with_default_view(mut self, view: String) -> Self {
        self.default_view = Some(view);
        self
    }

    #[must_use]
    pub fn with_stay_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.stay_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_abuse_threshold(mut self, threshold: u64) -> Self {
        self.abuse_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_abuse_window_seconds(mut self, seconds: u64) -> Self {
        self.abuse_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: u64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rp_id(mut self, rp_id: String) -> Self {
        self.rp_id = rp_id;
        self
    }

    #[must_use]
    pub fn with_rp_origin(mut self, rp_origin: String) -> Self {
        self.rp_origin = rp_origin;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn login_view(&self) -> &str {
        &self.login_view
    }

    #[must_use]
    pub fn two_factor_view(&self) -> &str {
        &self.two_factor_view
    }

    #[must_use]
    pub fn stay_session_ttl_seconds(&self) -> i64 {
        self.stay_session_ttl_seconds
    }

    #[must_use]
    pub fn abuse_threshold(&self) -> u64 {
        self.abuse_threshold
    }

    #[must_use]
    pub fn abuse_window_seconds(&self) -> u64 {
        self.abuse_window_seconds
    }

    #[must_use]
    pub fn challenge_ttl_seconds(&self) -> u64 {
        self.challenge_ttl_seconds
    }

    #[must_use]
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    #[must_use]
    pub fn rp_origin(&self) -> &str {
        &self.rp_origin
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Resolve the post-login destination: an explicit same-site path wins,
    /// then the configured default view, then the application root. Anything
    /// that is not a plain absolute path (external URLs, protocol-relative
    /// `//host` forms) is ignored.
    #[must_use]
    pub fn resolve_redirect(&self, requested: Option<&str>) -> String {
        if let Some(path) = requested {
            if path.starts_with('/') && !path.starts_with("//") {
                return path.to_string();
            }
        }
        self.default_view.clone().unwrap_or_else(|| "/".to_string())
    }
}

fn parse_u64_env(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            trimmed.parse::<u64>().ok()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = LoginConfig::new("https://gatehouse.dev".to_string());

        assert_eq!(config.base_url(), "https://gatehouse.dev");
        assert_eq!(config.login_view(), "/login");
        assert_eq!(config.two_factor_view(), "/login/two-factor");
        assert_eq!(
            config.stay_session_ttl_seconds(),
            super::DEFAULT_STAY_SESSION_TTL_SECONDS
        );
        assert_eq!(config.abuse_threshold(), super::DEFAULT_ABUSE_THRESHOLD);
        assert_eq!(
            config.abuse_window_seconds(),
            super::DEFAULT_ABUSE_WINDOW_SECONDS
        );
        assert_eq!(config.rp_id(), "gatehouse.dev");
        assert_eq!(config.rp_origin(), "https://gatehouse.dev");
        assert!(config.session_cookie_secure());

        let config = config
            .with_default_view("/backend".to_string())
            .with_stay_session_ttl_seconds(120)
            .with_abuse_threshold(3)
            .with_abuse_window_seconds(30)
            .with_challenge_ttl_seconds(42)
            .with_rp_id("auth.test".to_string())
            .with_rp_origin("https://auth.test".to_string());

        assert_eq!(config.stay_session_ttl_seconds(), 120);
        assert_eq!(config.abuse_threshold(), 3);
        assert_eq!(config.abuse_window_seconds(), 30);
        assert_eq!(config.challenge_ttl_seconds(), 42);
        assert_eq!(config.rp_id(), "auth.test");
        assert_eq!(config.rp_origin(), "https://auth.test");
    }

    #[test]
    fn plain_http_is_not_cookie_secure() {
        let config = LoginConfig::new("http://localhost:8080".to_string());
        assert!(!config.session_cookie_secure());
        assert_eq!(config.rp_id(), "localhost");
    }

    #[test]
    fn redirect_resolution_precedence() {
        let config = LoginConfig::new("https://gatehouse.dev".to_string());

        // No explicit target, no default view: application root.
        assert_eq!(config.resolve_redirect(None), "/");

        let config = config.with_default_view("/backend".to_string());
        assert_eq!(config.resolve_redirect(None), "/backend");
        assert_eq!(
            config.resolve_redirect(Some("/reports/daily")),
            "/reports/daily"
        );

        // External and protocol-relative targets are ignored.
        assert_eq!(
            config.resolve_redirect(Some("https://evil.example")),
            "/backend"
        );
        assert_eq!(config.resolve_redirect(Some("//evil.example")), "/backend");
        assert_eq!(config.resolve_redirect(Some("relative")), "/backend");
    }

    #[test]
    fn from_env_overrides() {
        temp_env::with_vars(
            [
                (super::ENV_ABUSE_THRESHOLD, Some("5")),
                (super::ENV_ABUSE_WINDOW_SECONDS, Some("120")),
                (super::ENV_STAY_SESSION_TTL_SECONDS, Some("3600")),
                (super::ENV_DEFAULT_VIEW, Some("/backend")),
            ],
            || {
                let config = LoginConfig::from_env("https://gatehouse.dev".to_string());
                assert_eq!(config.abuse_threshold(), 5);
                assert_eq!(config.abuse_window_seconds(), 120);
                assert_eq!(config.stay_session_ttl_seconds(), 3600);
                assert_eq!(config.resolve_redirect(None), "/backend");
            },
        );
    }

    #[test]
    fn from_env_ignores_garbage() {
        temp_env::with_vars(
            [
                (super::ENV_ABUSE_THRESHOLD, Some("not-a-number")),
                (super::ENV_DEFAULT_VIEW, Some("  ")),
            ],
            || {
                let config = LoginConfig::from_env("https://gatehouse.dev".to_string());
                assert_eq!(config.abuse_threshold(), super::DEFAULT_ABUSE_THRESHOLD);
                assert_eq!(config.resolve_redirect(None), "/");
            },
        );
    }
}
