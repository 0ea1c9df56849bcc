use std::time::Duration;

use apptshare_auth::{OidcAuthenticator, OidcConfig};
use apptshare_contracts::Viewer;
use http::HeaderMap;
use http::header;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

fn config() -> OidcConfig {
    OidcConfig {
        issuer: "https://issuer.example".to_string(),
        audience: Some("apptshare".to_string()),
        jwks_url: None,
        jwks_json: Some(include_str!("fixtures/test_jwks.json").to_string()),
        jwks_timeout: Duration::from_millis(2000),
        jwks_refresh_ttl: Duration::from_secs(300),
        clock_skew: Duration::from_secs(0),
        user_id_claim: "sub".to_string(),
    }
}

fn sign(claims: &serde_json::Value, kid: &str) -> String {
    let private_key_pem = include_bytes!("fixtures/test_rsa_private.pem");

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());

    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(private_key_pem).expect("private key must parse"),
    )
    .expect("token encode should succeed")
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token)
            .parse()
            .expect("authorization header must parse"),
    );
    headers
}

#[tokio::test]
async fn resolve_viewer_extracts_user_from_valid_rs256_jwt() {
    let token = sign(
        &serde_json::json!({
            "iss": "https://issuer.example",
            "sub": "user-42",
            "aud": "apptshare",
            "exp": 4000000000u64,
            "iat": 1000000000u64,
        }),
        "test-kid",
    );

    let auth = OidcAuthenticator::new(config())
        .await
        .expect("auth init should succeed");

    let viewer = auth
        .resolve_viewer(&bearer(&token))
        .await
        .expect("resolve should succeed");

    assert_eq!(viewer, Viewer::Authenticated("user-42".to_string()));
}

#[tokio::test]
async fn resolve_viewer_without_credentials_is_anonymous() {
    let auth = OidcAuthenticator::new(config())
        .await
        .expect("auth init should succeed");

    let viewer = auth
        .resolve_viewer(&HeaderMap::new())
        .await
        .expect("resolve should succeed");

    assert_eq!(viewer, Viewer::Anonymous);
}

#[tokio::test]
async fn resolve_viewer_rejects_wrong_issuer_and_unknown_kid() {
    let auth = OidcAuthenticator::new(config())
        .await
        .expect("auth init should succeed");

    let wrong_issuer = sign(
        &serde_json::json!({
            "iss": "https://other.example",
            "sub": "user-42",
            "aud": "apptshare",
            "exp": 4000000000u64,
        }),
        "test-kid",
    );
    let err = auth
        .resolve_viewer(&bearer(&wrong_issuer))
        .await
        .expect_err("wrong issuer must be rejected");
    assert_eq!(err.code, "ERR_AUTH_INVALID");

    let unknown_kid = sign(
        &serde_json::json!({
            "iss": "https://issuer.example",
            "sub": "user-42",
            "aud": "apptshare",
            "exp": 4000000000u64,
        }),
        "rotated-kid",
    );
    let err = auth
        .resolve_viewer(&bearer(&unknown_kid))
        .await
        .expect_err("unknown kid must be rejected");
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}

#[tokio::test]
async fn resolve_viewer_rejects_expired_token() {
    let auth = OidcAuthenticator::new(config())
        .await
        .expect("auth init should succeed");

    let expired = sign(
        &serde_json::json!({
            "iss": "https://issuer.example",
            "sub": "user-42",
            "aud": "apptshare",
            "exp": 1000000000u64,
        }),
        "test-kid",
    );
    let err = auth
        .resolve_viewer(&bearer(&expired))
        .await
        .expect_err("expired token must be rejected");
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}
