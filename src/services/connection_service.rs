//! Validation of directory connection parameters entered by an operator.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::api::types::{ConnectionTestRequest, TestConnectionResponse};
use crate::directory::{BindSettings, DirectoryError, LdapDirectory};

#[async_trait]
pub trait ConnectionService: Send + Sync {
    /// Connects, binds and reads `base_dn`. Never fails; problems are
    /// reported in the response with `success = false`.
    async fn test_connection(&self, request: ConnectionTestRequest) -> TestConnectionResponse;
}

/// Operator-facing description of a failed connection test.
#[must_use]
pub fn describe_failure(err: &DirectoryError) -> String {
    match err {
        DirectoryError::Unreachable(detail) => {
            format!("Cannot connect to directory server: {detail}")
        }
        DirectoryError::AuthenticationFailed(_) => {
            "Authentication failed: invalid username or password".to_string()
        }
        DirectoryError::NotFound { .. } | DirectoryError::Invalid(_) => {
            format!("Invalid base DN: {err}")
        }
        DirectoryError::Protocol { code, message } => {
            format!("Directory error (code {code}): {message}")
        }
        DirectoryError::Conflict(_) | DirectoryError::PolicyViolation(_) => {
            format!("Directory error: {err}")
        }
    }
}

fn missing_fields(request: &ConnectionTestRequest) -> Vec<&'static str> {
    [
        ("server", request.server.as_str()),
        ("username", request.username.as_str()),
        ("password", request.password.as_str()),
        ("base_dn", request.base_dn.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect()
}

pub struct LdapConnectionService {
    timeout: Duration,
}

impl LdapConnectionService {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ConnectionService for LdapConnectionService {
    async fn test_connection(&self, request: ConnectionTestRequest) -> TestConnectionResponse {
        let respond = |success: bool, message: String| TestConnectionResponse {
            success,
            message,
            timestamp: Utc::now(),
        };

        let missing = missing_fields(&request);
        if !missing.is_empty() {
            return respond(
                false,
                format!("Missing required parameter(s): {}", missing.join(", ")),
            );
        }

        let settings = BindSettings::new(
            &request.server,
            &request.domain,
            &request.username,
            &request.password,
            &request.base_dn,
            self.timeout,
        );

        match LdapDirectory::verify_bind(&settings).await {
            Ok(()) => {
                info!(
                    event = "connection_test",
                    server = %settings.url,
                    success = true,
                );
                respond(
                    true,
                    format!("Connected to {} and read {}", settings.url, settings.base_dn),
                )
            }
            Err(err) => {
                warn!(
                    event = "connection_test",
                    server = %settings.url,
                    success = false,
                    error = %err,
                );
                respond(false, describe_failure(&err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(server: &str, password: &str) -> ConnectionTestRequest {
        ConnectionTestRequest {
            server: server.to_string(),
            domain: "example.com".to_string(),
            username: "admin".to_string(),
            password: password.to_string(),
            base_dn: "DC=example,DC=com".to_string(),
        }
    }

    #[test]
    fn test_describe_failure_classes() {
        let auth = describe_failure(&DirectoryError::AuthenticationFailed("49".into()));
        assert!(auth.starts_with("Authentication failed"));

        let dn = describe_failure(&DirectoryError::not_found("Object", "DC=nope"));
        assert!(dn.starts_with("Invalid base DN"));

        let other = describe_failure(&DirectoryError::Protocol {
            code: 53,
            message: "unwilling".into(),
        });
        assert!(other.contains("code 53"));
    }

    #[tokio::test]
    async fn test_missing_parameters_reported() {
        let service = LdapConnectionService::new(Duration::from_secs(1));
        let response = service.test_connection(request("", "")).await;
        assert!(!response.success);
        assert!(response.message.contains("server"));
        assert!(response.message.contains("password"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let service = LdapConnectionService::new(Duration::from_secs(2));
        let response = service
            .test_connection(request("ldap://127.0.0.1:1", "secret-value"))
            .await;
        assert!(!response.success);
        assert!(!response.message.is_empty());
        assert!(!response.message.contains("secret-value"));
    }
}
