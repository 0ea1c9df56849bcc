use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hex::ToHex;
use sha2::{Digest, Sha256};

/// Process-wide salt for capability tokens. Loaded once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);

impl TokenSecret {
    pub fn new(raw: impl Into<String>) -> Result<Self, TokenSecretError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TokenSecretError {
                message: "token secret must be non-empty".to_string(),
            });
        }
        Ok(Self(raw))
    }
}

impl std::fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSecret(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSecretError {
    message: String,
}

impl std::fmt::Display for TokenSecretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TokenSecretError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenEncoding {
    #[default]
    Hex,
    /// Standard padded alphabet, as issued by the legacy deployment.
    Base64,
}

impl TokenEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenEncoding::Hex => "hex",
            TokenEncoding::Base64 => "base64",
        }
    }
}

/// Derives capability tokens as `SHA-256(id ‖ secret)`.
///
/// Deterministic and stateless: the same id always yields the same token for
/// the lifetime of the secret, so tokens are re-derived on demand and never
/// stored. Rotating the secret invalidates every token handed out before.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    secret: TokenSecret,
    encoding: TokenEncoding,
}

impl TokenGenerator {
    pub fn new(secret: TokenSecret, encoding: TokenEncoding) -> Self {
        Self { secret, encoding }
    }

    pub fn encoding(&self) -> TokenEncoding {
        self.encoding
    }

    pub fn generate(&self, id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(self.secret.0.as_bytes());
        let digest = hasher.finalize();

        match self.encoding {
            TokenEncoding::Hex => digest.encode_hex::<String>(),
            TokenEncoding::Base64 => STANDARD.encode(digest),
        }
    }

    pub fn verify(&self, id: &str, presented: &str) -> bool {
        let presented = normalize_presented_token(presented);
        let expected = self.generate(id);
        constant_time_eq(presented.as_bytes(), expected.as_bytes())
    }
}

/// Query-string transport may decode `+` into a space; undo that before
/// comparing.
pub fn normalize_presented_token(raw: &str) -> Cow<'_, str> {
    if raw.contains(' ') {
        Cow::Owned(raw.replace(' ', "+"))
    } else {
        Cow::Borrowed(raw)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn generator(encoding: TokenEncoding) -> TokenGenerator {
        TokenGenerator::new(
            TokenSecret::new("test-secret").expect("secret should be valid"),
            encoding,
        )
    }

    #[test]
    fn generate_is_deterministic() {
        let tokens = generator(TokenEncoding::Hex);
        assert_eq!(tokens.generate("enrollment-1"), tokens.generate("enrollment-1"));

        let again = generator(TokenEncoding::Hex);
        assert_eq!(tokens.generate("enrollment-1"), again.generate("enrollment-1"));
    }

    #[test]
    fn distinct_ids_yield_distinct_tokens() {
        let tokens = generator(TokenEncoding::Hex);
        let generated = (0..2000)
            .map(|n| tokens.generate(&format!("enrollment-{n}")))
            .collect::<HashSet<_>>();
        assert_eq!(generated.len(), 2000);
    }

    #[test]
    fn hex_tokens_are_lowercase_sha256_hex() {
        let token = generator(TokenEncoding::Hex).generate("abc");
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
    }

    #[test]
    fn hex_token_matches_known_digest() {
        // Digest input is the id followed by the secret.
        let tokens = TokenGenerator::new(
            TokenSecret::new("c").expect("secret should be valid"),
            TokenEncoding::Hex,
        );
        assert_eq!(
            tokens.generate("ab"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn base64_tokens_are_padded_44_chars() {
        let token = generator(TokenEncoding::Base64).generate("abc");
        assert_eq!(token.len(), 44);
        assert!(token.ends_with('='));
    }

    #[test]
    fn rotating_secret_invalidates_tokens() {
        let old = generator(TokenEncoding::Hex);
        let rotated = TokenGenerator::new(
            TokenSecret::new("rotated-secret").expect("secret should be valid"),
            TokenEncoding::Hex,
        );

        let token = old.generate("enrollment-1");
        assert!(old.verify("enrollment-1", &token));
        assert!(!rotated.verify("enrollment-1", &token));
    }

    #[test]
    fn verify_rejects_token_for_other_id() {
        let tokens = generator(TokenEncoding::Hex);
        let token = tokens.generate("enrollment-1");
        assert!(!tokens.verify("enrollment-2", &token));
        assert!(!tokens.verify("enrollment-1", ""));
        assert!(!tokens.verify("enrollment-1", &token[..63]));
    }

    #[test]
    fn verify_accepts_space_in_place_of_plus() {
        let tokens = generator(TokenEncoding::Base64);
        let (id, token) = (0..1000)
            .map(|n| format!("enrollment-{n}"))
            .map(|id| {
                let token = tokens.generate(&id);
                (id, token)
            })
            .find(|(_, token)| token.contains('+'))
            .expect("some base64 token should contain '+'");

        let mangled = token.replace('+', " ");
        assert_ne!(mangled, token);
        assert!(tokens.verify(&id, &mangled));
    }

    #[test]
    fn secret_is_never_printed() {
        let secret = TokenSecret::new("super-secret-value").expect("secret should be valid");
        let printed = format!("{:?}", generator(TokenEncoding::Hex));
        assert!(!printed.contains("test-secret"));
        assert!(!format!("{:?}", secret).contains("super-secret-value"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenSecret::new("").is_err());
        assert!(TokenSecret::new("   ").is_err());
    }
}
