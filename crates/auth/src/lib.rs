use std::sync::Arc;
use std::time::{Duration, Instant};

use apptshare_contracts::Viewer;
use http::HeaderMap;
use http::header;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub audience: Option<String>,
    pub jwks_url: Option<String>,
    pub jwks_json: Option<String>,
    pub jwks_timeout: Duration,
    pub jwks_refresh_ttl: Duration,
    pub clock_skew: Duration,
    pub user_id_claim: String,
}

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: "ERR_AUTH_INVALID",
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

/// Resolves the [`Viewer`] behind a request from an OIDC bearer token.
///
/// A request without credentials is an anonymous viewer; a request with
/// broken credentials is rejected instead of being downgraded.
#[derive(Clone)]
pub struct OidcAuthenticator {
    config: OidcConfig,
    http: reqwest::Client,
    jwks: Arc<RwLock<JwksCache>>,
}

#[derive(Debug)]
struct JwksCache {
    jwks: Option<JwkSet>,
    fetched_at: Option<Instant>,
}

impl OidcAuthenticator {
    pub async fn new(config: OidcConfig) -> Result<Self, AuthError> {
        if config.issuer.trim().is_empty() {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "oidc issuer must be non-empty".to_string(),
            });
        }

        if config.user_id_claim.trim().is_empty() {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "oidc user_id_claim must be non-empty".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.jwks_timeout)
            .build()
            .map_err(|_| AuthError {
                code: "ERR_INTERNAL",
                message: "failed to initialize oidc http client".to_string(),
            })?;

        let mut cache = JwksCache {
            jwks: None,
            fetched_at: None,
        };
        cache.refresh(&http, &config).await?;

        Ok(Self {
            config,
            http,
            jwks: Arc::new(RwLock::new(cache)),
        })
    }

    pub async fn resolve_viewer(&self, headers: &HeaderMap) -> Result<Viewer, AuthError> {
        let Some(token) = bearer_token(headers)? else {
            return Ok(Viewer::Anonymous);
        };

        let header = decode_header(&token).map_err(|_| AuthError::invalid("invalid JWT header"))?;

        if header.alg != Algorithm::RS256 {
            return Err(AuthError::invalid("unsupported JWT alg (expected RS256)"));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid("JWT header missing kid"))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(std::slice::from_ref(&self.config.issuer));
        match self.config.audience.as_ref() {
            Some(audience) => validation.set_audience(std::slice::from_ref(audience)),
            None => validation.validate_aud = false,
        }
        validation.leeway = self.config.clock_skew.as_secs();

        let decoded = decode::<Value>(&token, &decoding_key, &validation)
            .map_err(|_| AuthError::invalid("JWT validation failed"))?;

        let user_id = claim_string(&decoded.claims, &self.config.user_id_claim)?;
        Ok(Viewer::Authenticated(user_id))
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.jwks.read().await;
            if let Some(jwk) = cache.jwk_for_kid(kid) {
                return DecodingKey::from_jwk(jwk)
                    .map_err(|_| AuthError::invalid("failed to parse JWK decoding key"));
            }
        }

        {
            let mut cache = self.jwks.write().await;
            let refresh_needed = cache
                .fetched_at
                .map(|t| t.elapsed() > self.config.jwks_refresh_ttl)
                .unwrap_or(true);
            if refresh_needed {
                cache.refresh(&self.http, &self.config).await?;
            }

            if let Some(jwk) = cache.jwk_for_kid(kid) {
                return DecodingKey::from_jwk(jwk)
                    .map_err(|_| AuthError::invalid("failed to parse JWK decoding key"));
            }
        }

        Err(AuthError::invalid("JWT kid not found in JWKS"))
    }
}

impl JwksCache {
    fn jwk_for_kid(&self, kid: &str) -> Option<&jsonwebtoken::jwk::Jwk> {
        self.jwks.as_ref()?.find(kid)
    }

    async fn refresh(
        &mut self,
        http: &reqwest::Client,
        config: &OidcConfig,
    ) -> Result<(), AuthError> {
        let jwks = if let Some(jwks_json) = config.jwks_json.as_ref() {
            serde_json::from_str::<JwkSet>(jwks_json).map_err(|_| AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "APPTSHARE_OIDC_JWKS_JSON is not valid JWKS JSON".to_string(),
            })?
        } else if let Some(url) = config.jwks_url.as_ref() {
            http.get(url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|_| AuthError {
                    code: "ERR_AUTH_UNAVAILABLE",
                    message: "failed to fetch JWKS".to_string(),
                })?
                .json::<JwkSet>()
                .await
                .map_err(|_| AuthError {
                    code: "ERR_AUTH_UNAVAILABLE",
                    message: "failed to parse JWKS JSON".to_string(),
                })?
        } else {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "oidc requires jwks_url or jwks_json".to_string(),
            });
        };

        self.jwks = Some(jwks);
        self.fetched_at = Some(Instant::now());
        Ok(())
    }
}

/// `Ok(None)` when no Authorization header is present at all.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(authz) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let authz = authz
        .to_str()
        .map(|v| v.trim())
        .map_err(|_| AuthError::invalid("Authorization header is not valid ASCII"))?;

    let token = authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .map(|t| t.trim())
        .ok_or_else(|| AuthError::invalid("Authorization must be a Bearer token"))?;

    if token.is_empty() {
        return Err(AuthError::invalid("Bearer token is empty"));
    }

    Ok(Some(token.to_string()))
}

fn claim_string(claims: &Value, claim: &str) -> Result<String, AuthError> {
    claims
        .get(claim)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AuthError::invalid(format!(
                "required claim `{}` is missing or not a string",
                claim
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_absent_means_anonymous() {
        let headers = HeaderMap::new();
        assert!(bearer_token(&headers).expect("absent header is ok").is_none());
    }

    #[test]
    fn bearer_token_rejects_other_schemes_and_empty_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap_err().code, "ERR_AUTH_INVALID");

        headers.insert(header::AUTHORIZATION, "Bearer   ".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap_err().code, "ERR_AUTH_INVALID");

        headers.insert(header::AUTHORIZATION, "bearer abc.def".parse().unwrap());
        assert_eq!(
            bearer_token(&headers).unwrap().as_deref(),
            Some("abc.def")
        );
    }

    #[test]
    fn claim_string_requires_non_empty_string() {
        let claims = serde_json::json!({"sub": " user-1 ", "empty": "", "num": 3});
        assert_eq!(claim_string(&claims, "sub").unwrap(), "user-1");
        assert!(claim_string(&claims, "empty").is_err());
        assert!(claim_string(&claims, "num").is_err());
        assert!(claim_string(&claims, "missing").is_err());
    }
}
