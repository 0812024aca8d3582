//! Common test helpers for cloud-proxy-secrets integration tests
//!
//! Provides a recording in-memory secret store so tests can assert exactly
//! which remote fetches the cache performed.

use async_trait::async_trait;
use cloud_proxy_core::{Error, HttpStatusError, Result};
use cloud_proxy_secrets::{SecretStore, SecretValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory secret store recording every fetch
#[derive(Clone, Default)]
pub struct RecordingStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    fetches: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<Option<String>>>,
    delay: Option<Duration>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that answers every name with `value-of-<name>`
    pub fn echo(names: &[&str]) -> Self {
        let store = Self::new();
        for name in names {
            store.set(name, &format!("value-of-{name}"));
        }
        store
    }

    /// Store that sleeps before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    /// Make fetches of `name` fail until cleared
    pub fn fail(&self, name: Option<&str>) {
        *self.failing.lock().unwrap() = name.map(str::to_string);
    }

    /// Names fetched, in call order
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, name: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }
}

#[async_trait]
impl SecretStore for RecordingStore {
    async fn fetch(&self, name: &str) -> Result<SecretValue> {
        self.fetches.lock().unwrap().push(name.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().as_deref() == Some(name) {
            return Err(Error::secret_fetch(
                name,
                HttpStatusError::new(503, "throttled"),
            ));
        }

        let value = self.values.lock().unwrap().get(name).cloned();
        value
            .map(SecretValue::Text)
            .ok_or_else(|| Error::secret_fetch(name, HttpStatusError::new(404, "not found")))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
