//! End-to-end checks against a live gateway; see `tests/`.
