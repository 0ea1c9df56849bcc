use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use apptshare_auth::OidcConfig;
use apptshare_policy::{TokenEncoding, TokenSecret};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub token_secret: TokenSecret,
    pub token_encoding: TokenEncoding,
    pub auth_mode: AuthMode,
    pub oidc: Option<OidcConfig>,
    pub local_auth_shared_secret: Option<String>,
    pub store_path: String,
    pub metrics_require_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Local,
    Oidc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl StartupError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: "ERR_INVALID_CONFIG",
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl GatewayConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("APPTSHARE_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                merged.extend(parse_env_file(config_path)?);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let src = Source(kv);

        let bind_addr = match src.get("APPTSHARE_BIND_ADDR") {
            None => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            Some(v) => v.parse::<SocketAddr>().map_err(|_| {
                StartupError::invalid("APPTSHARE_BIND_ADDR must be a valid host:port socket address")
            })?,
        };

        let auth_mode = match src.get("APPTSHARE_AUTH_MODE").unwrap_or("local") {
            "local" => AuthMode::Local,
            "oidc" => AuthMode::Oidc,
            _ => return Err(StartupError::invalid("APPTSHARE_AUTH_MODE must be local or oidc")),
        };

        let dev_allow_nonlocal_bind = src.bool_or("APPTSHARE_DEV_ALLOW_NONLOCAL_BIND", false)?;
        if !bind_addr.ip().is_loopback()
            && auth_mode != AuthMode::Oidc
            && !(dev_allow_nonlocal_bind && bind_addr.ip().is_unspecified())
        {
            return Err(StartupError {
                code: "ERR_NONLOCAL_BIND_REQUIRES_AUTH",
                message: "non-local bind requires oidc auth mode; refuse startup".to_string(),
            });
        }

        let token_secret = TokenSecret::new(src.required("APPTSHARE_TOKEN_SECRET")?)
            .map_err(|err| StartupError {
                code: "ERR_MISSING_CONFIG",
                message: err.to_string(),
            })?;

        let token_encoding = match src.get("APPTSHARE_TOKEN_ENCODING").unwrap_or("hex") {
            "hex" => TokenEncoding::Hex,
            "base64" => TokenEncoding::Base64,
            _ => {
                return Err(StartupError::invalid(
                    "APPTSHARE_TOKEN_ENCODING must be hex or base64",
                ));
            }
        };

        let local_auth_shared_secret = src
            .get("APPTSHARE_LOCAL_AUTH_SHARED_SECRET")
            .map(|s| s.to_string());
        if local_auth_shared_secret.is_some() && auth_mode != AuthMode::Local {
            return Err(StartupError::invalid(
                "APPTSHARE_LOCAL_AUTH_SHARED_SECRET is only valid with local auth mode",
            ));
        }

        let oidc = match auth_mode {
            AuthMode::Oidc => Some(parse_oidc_config(&src)?),
            AuthMode::Local => None,
        };

        let store_path = src
            .get("APPTSHARE_STORE_PATH")
            .unwrap_or("fixtures/appointments.json")
            .to_string();

        let metrics_require_auth = src.bool_or("APPTSHARE_METRICS_REQUIRE_AUTH", false)?;

        Ok(Self {
            bind_addr,
            token_secret,
            token_encoding,
            auth_mode,
            oidc,
            local_auth_shared_secret,
            store_path,
            metrics_require_auth,
        })
    }
}

/// Trimmed view over merged key/value configuration; blank values count as
/// unset.
struct Source<'a>(&'a HashMap<String, String>);

impl<'a> Source<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<&'a str, StartupError> {
        self.get(key).ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        })
    }

    fn u64_or(&self, key: &'static str, default: u64) -> Result<u64, StartupError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| StartupError::invalid(format!("{} must be an integer", key))),
        }
    }

    fn bool_or(&self, key: &'static str, default: bool) -> Result<bool, StartupError> {
        match self.get(key) {
            None => Ok(default),
            Some("1" | "true" | "TRUE" | "yes" | "YES") => Ok(true),
            Some("0" | "false" | "FALSE" | "no" | "NO") => Ok(false),
            Some(_) => Err(StartupError::invalid(format!("{} must be a boolean", key))),
        }
    }
}

fn parse_oidc_config(src: &Source<'_>) -> Result<OidcConfig, StartupError> {
    let issuer = src.required("APPTSHARE_OIDC_ISSUER")?.to_string();

    let jwks_json = src.get("APPTSHARE_OIDC_JWKS_JSON").map(|s| s.to_string());
    let jwks_url = src.get("APPTSHARE_OIDC_JWKS_URL").map(|s| s.to_string());
    if jwks_json.is_none() && jwks_url.is_none() {
        return Err(StartupError::invalid(
            "oidc requires APPTSHARE_OIDC_JWKS_URL or APPTSHARE_OIDC_JWKS_JSON",
        ));
    }

    Ok(OidcConfig {
        issuer,
        audience: src.get("APPTSHARE_OIDC_AUDIENCE").map(|s| s.to_string()),
        jwks_url,
        jwks_json,
        jwks_timeout: Duration::from_millis(src.u64_or("APPTSHARE_OIDC_JWKS_TIMEOUT_MS", 2000)?),
        jwks_refresh_ttl: Duration::from_secs(
            src.u64_or("APPTSHARE_OIDC_JWKS_REFRESH_TTL_SECS", 300)?,
        ),
        clock_skew: Duration::from_secs(src.u64_or("APPTSHARE_OIDC_CLOCK_SKEW_SECS", 60)?),
        user_id_claim: src
            .get("APPTSHARE_OIDC_USER_ID_CLAIM")
            .unwrap_or("sub")
            .to_string(),
    })
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_error = |detail: &str| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} ({})", idx + 1, detail),
        };

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| parse_error("expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(parse_error("empty key"));
        }

        kv.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    Ok(kv)
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_ok_env() -> HashMap<String, String> {
        HashMap::from([(
            "APPTSHARE_TOKEN_SECRET".to_string(),
            "local-dev-secret".to_string(),
        )])
    }

    #[test]
    fn minimal_env_uses_defaults() {
        let config = GatewayConfig::from_kv(&minimal_ok_env()).expect("config should load");
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.token_encoding, TokenEncoding::Hex);
        assert_eq!(config.auth_mode, AuthMode::Local);
        assert_eq!(config.store_path, "fixtures/appointments.json");
        assert!(!config.metrics_require_auth);
    }

    #[test]
    fn missing_token_secret_fails_startup() {
        let err = GatewayConfig::from_kv(&HashMap::new()).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");

        let mut env = minimal_ok_env();
        env.insert("APPTSHARE_TOKEN_SECRET".to_string(), "   ".to_string());
        let err = GatewayConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");
    }

    #[test]
    fn non_local_bind_without_oidc_fails() {
        let mut env = minimal_ok_env();
        env.insert("APPTSHARE_BIND_ADDR".to_string(), "0.0.0.0:8080".to_string());
        let err = GatewayConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_NONLOCAL_BIND_REQUIRES_AUTH");

        env.insert(
            "APPTSHARE_DEV_ALLOW_NONLOCAL_BIND".to_string(),
            "true".to_string(),
        );
        GatewayConfig::from_kv(&env).expect("dev escape hatch should allow unspecified bind");
    }

    #[test]
    fn invalid_token_encoding_fails() {
        let mut env = minimal_ok_env();
        env.insert("APPTSHARE_TOKEN_ENCODING".to_string(), "base32".to_string());
        let err = GatewayConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");

        env.insert("APPTSHARE_TOKEN_ENCODING".to_string(), "base64".to_string());
        let config = GatewayConfig::from_kv(&env).expect("base64 should be accepted");
        assert_eq!(config.token_encoding, TokenEncoding::Base64);
    }

    #[test]
    fn oidc_mode_requires_issuer_and_jwks() {
        let mut env = minimal_ok_env();
        env.insert("APPTSHARE_AUTH_MODE".to_string(), "oidc".to_string());
        let err = GatewayConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");

        env.insert(
            "APPTSHARE_OIDC_ISSUER".to_string(),
            "https://issuer.example".to_string(),
        );
        let err = GatewayConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");

        env.insert(
            "APPTSHARE_OIDC_JWKS_URL".to_string(),
            "https://issuer.example/jwks".to_string(),
        );
        let config = GatewayConfig::from_kv(&env).expect("oidc config should load");
        let oidc = config.oidc.expect("oidc config should be present");
        assert_eq!(oidc.user_id_claim, "sub");
        assert_eq!(oidc.clock_skew, Duration::from_secs(60));
    }

    #[test]
    fn local_auth_secret_rejected_outside_local_mode() {
        let mut env = minimal_ok_env();
        env.insert("APPTSHARE_AUTH_MODE".to_string(), "oidc".to_string());
        env.insert(
            "APPTSHARE_OIDC_ISSUER".to_string(),
            "https://issuer.example".to_string(),
        );
        env.insert("APPTSHARE_OIDC_JWKS_JSON".to_string(), "{\"keys\":[]}".to_string());
        env.insert(
            "APPTSHARE_LOCAL_AUTH_SHARED_SECRET".to_string(),
            "shh".to_string(),
        );
        let err = GatewayConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"abc'"), "\"abc'");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn env_file_parses_key_values() {
        let path = std::env::temp_dir().join(format!(
            "apptshare_config_{}_{}.env",
            std::process::id(),
            line!()
        ));
        std::fs::write(
            &path,
            "# comment\nAPPTSHARE_TOKEN_SECRET=\"from-file\"\n\nAPPTSHARE_TOKEN_ENCODING = base64\n",
        )
        .expect("config file should be written");

        let kv = parse_env_file(path.to_str().expect("temp path should be utf-8"))
            .expect("config file should parse");
        assert_eq!(
            kv.get("APPTSHARE_TOKEN_SECRET").map(String::as_str),
            Some("from-file")
        );
        assert_eq!(
            kv.get("APPTSHARE_TOKEN_ENCODING").map(String::as_str),
            Some("base64")
        );

        std::fs::write(&path, "NOT A PAIR\n").expect("config file should be written");
        let err = parse_env_file(path.to_str().expect("temp path should be utf-8")).unwrap_err();
        assert_eq!(err.code, "ERR_CONFIG_FILE_PARSE");

        let _ = std::fs::remove_file(&path);
    }
}
