use std::collections::BTreeSet;

use url::form_urlencoded;

use crate::token::TokenGenerator;

/// Proof that the presenter holds the capability for `id`.
///
/// Only built by [`PermissionSet::parse`] after verification or by
/// [`PermissionEntry::issue`]; the stored token is always the canonical one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionEntry {
    id: String,
    token: String,
}

impl PermissionEntry {
    pub fn issue(tokens: &TokenGenerator, id: impl Into<String>) -> Self {
        let id = id.into();
        let token = tokens.generate(&id);
        Self { id, token }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermissionKey {
    Id,
    Token,
    Other,
}

impl PermissionKey {
    fn classify(key: &str) -> Self {
        if key.starts_with("id") {
            PermissionKey::Id
        } else if key.starts_with("token") {
            PermissionKey::Token
        } else {
            PermissionKey::Other
        }
    }
}

/// Validated capabilities presented with one request.
///
/// Raw keys are split into an id group and a token group, each kept in
/// first-seen order, and zipped by position. Numeric suffixes are ignored:
/// the n-th `id*` key pairs with the n-th `token*` key. An id without a
/// positional token, or a pair whose token does not verify, is dropped
/// without error so malformed input can only ever narrow access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    entries: BTreeSet<PermissionEntry>,
    pairs_presented: usize,
    pairs_accepted: usize,
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(raw: &[(String, String)], tokens: &TokenGenerator) -> Self {
        let mut ids = Vec::new();
        let mut presented_tokens = Vec::new();

        for (key, value) in raw {
            match PermissionKey::classify(key) {
                PermissionKey::Id => ids.push(value.as_str()),
                PermissionKey::Token => presented_tokens.push(value.as_str()),
                PermissionKey::Other => {}
            }
        }

        let mut set = Self {
            pairs_presented: ids.len(),
            ..Self::default()
        };

        for (id, presented) in ids.into_iter().zip(presented_tokens) {
            // Mismatches are dropped silently; callers must not learn which
            // guesses were close.
            if tokens.verify(id, presented) {
                set.pairs_accepted += 1;
                set.entries.insert(PermissionEntry::issue(tokens, id));
            }
        }

        set
    }

    /// Builds a set from already-trusted entries. Nothing was parsed, so the
    /// pair counters stay at zero.
    pub fn from_entries(entries: impl IntoIterator<Item = PermissionEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            pairs_presented: 0,
            pairs_accepted: 0,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn permitted_ids(&self) -> BTreeSet<String> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn pairs_presented(&self) -> usize {
        self.pairs_presented
    }

    pub fn pairs_accepted(&self) -> usize {
        self.pairs_accepted
    }

    pub fn pairs_rejected(&self) -> usize {
        self.pairs_presented.saturating_sub(self.pairs_accepted)
    }

    /// `id{n}`/`token{n}` pairs that [`PermissionSet::parse`] reads back.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        query_pairs(self.entries.iter())
    }

    pub fn to_query_string(&self) -> String {
        permission_query(self.entries.iter())
    }
}

fn query_pairs<'a>(entries: impl IntoIterator<Item = &'a PermissionEntry>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (n, entry) in entries.into_iter().enumerate() {
        pairs.push((format!("id{n}"), entry.id.clone()));
        pairs.push((format!("token{n}"), entry.token.clone()));
    }
    pairs
}

/// Form-urlencoded permission query for share links; `+` travels as `%2B`.
pub fn permission_query<'a>(entries: impl IntoIterator<Item = &'a PermissionEntry>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in query_pairs(entries) {
        serializer.append_pair(&key, &value);
    }
    serializer.finish()
}

/// Decodes a raw query string into an ordered association list.
pub fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
