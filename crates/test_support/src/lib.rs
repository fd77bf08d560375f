//! Fixtures for integration tests that need real infrastructure.
//!
//! Tests get a throwaway container network plus a Postgres container; the
//! [`runtime`] module finds (or starts) a Docker-compatible socket first so
//! suites can skip cleanly on hosts without a container runtime.

pub mod postgres;
pub mod runtime;

use uuid::Uuid;

/// A uniquely named container network for one test run.
#[derive(Debug, Clone)]
pub struct TestNetwork(String);

impl TestNetwork {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self(unique_name(prefix))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Prefix plus a random suffix, so parallel suites never collide.
pub(crate) fn unique_name(prefix: &str) -> String {
    let nonce = Uuid::new_v4().simple();
    format!("{prefix}-{nonce}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_names_are_prefixed_and_unique() {
        let first = TestNetwork::new("reklamo-it");
        let second = TestNetwork::new("reklamo-it");
        assert!(first.name().starts_with("reklamo-it-"));
        assert_ne!(first.name(), second.name());
    }
}
