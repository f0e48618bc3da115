//! pgs-config: secrets
//!
//! Single place where service credentials are read from the environment.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (`service.keys_env.username`, ...).
//! - Callers invoke [`resolve_service_credentials`] once and pass the result to
//!   the client constructor.
//! - `Debug` redacts values; errors name the env var, never its value.

use anyhow::{bail, Result};

use crate::settings::ServiceSettings;

#[derive(Clone)]
pub struct ServiceCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Returns `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the login named by `service.keys_env`. Both variables are required.
pub fn resolve_service_credentials(service: &ServiceSettings) -> Result<ServiceCredentials> {
    let user_var = service.keys_env.username.trim();
    let pwd_var = service.keys_env.password.trim();

    let Some(username) = resolve_env(user_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (service username) is not set or empty",
            user_var
        );
    };
    let Some(password) = resolve_env(pwd_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (service password) is not set or empty",
            pwd_var
        );
    };

    Ok(ServiceCredentials { username, password })
}
