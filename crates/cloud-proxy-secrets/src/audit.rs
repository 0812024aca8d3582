//! Audit logging for secret retrieval (never logs secret values)

use chrono::{DateTime, Utc};

/// Audit record for one secret lookup
#[derive(Debug, Clone)]
pub struct AuditLog {
    pub operation: &'static str,
    pub secret_name: String,
    pub store: &'static str,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(operation: &'static str, secret_name: &str, store: &'static str) -> Self {
        Self {
            operation,
            secret_name: secret_name.to_string(),
            store,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: &dyn std::error::Error) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }

    /// Emit the record through tracing
    pub fn log(&self) {
        if self.success {
            tracing::debug!(
                operation = self.operation,
                secret_name = %self.secret_name,
                store = self.store,
                timestamp = %self.timestamp.to_rfc3339(),
                "Secret operation successful"
            );
        } else {
            tracing::warn!(
                operation = self.operation,
                secret_name = %self.secret_name,
                store = self.store,
                error = ?self.error,
                timestamp = %self.timestamp.to_rfc3339(),
                "Secret operation failed"
            );
        }
    }
}
