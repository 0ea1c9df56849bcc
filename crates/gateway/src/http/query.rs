/// Presentation switches read from the same ordered query list that carries
/// permission pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct ViewFlags {
    pub(super) slim: bool,
    pub(super) creator_refs: bool,
}

impl ViewFlags {
    pub(super) fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            slim: flag(pairs, "slim"),
            creator_refs: flag(pairs, "creator_refs"),
        }
    }
}

/// Last occurrence wins; anything but an explicit true value is false.
fn flag(pairs: &[(String, String)], key: &str) -> bool {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .is_some_and(|(_, v)| matches!(v.trim(), "1" | "true" | "yes"))
}
