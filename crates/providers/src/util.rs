//! Helpers shared by the HTTP adapters: error mapping and API key
//! lookup.

use ca_domain::config::{AuthConfig, AuthMode};
use ca_domain::error::{Error, Result};

/// Map a reqwest failure onto the domain error type, keeping deadline
/// expiries distinguishable from other HTTP trouble.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    match e.is_timeout() {
        true => Error::Timeout(e.to_string()),
        false => Error::Http(e.to_string()),
    }
}

/// Look up the API key for a provider.
///
/// Sources are tried in order of how explicit the operator was: an
/// inline `key` wins over a keychain `service`/`account` pair, which
/// wins over a named `env` var.  A keychain pair that cannot be read
/// (headless box, no secret daemon) gets one last chance through an
/// uppercased `SERVICE_ACCOUNT` environment variable before giving up.
/// With auth mode `none` an empty key is fine — the endpoint simply
/// gets no bearer header.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(key) = &auth.key {
        tracing::warn!("using inline API key from the config file; env or keychain auth keeps secrets out of it");
        return Ok(key.clone());
    }

    let keychain_pair = auth.service.as_deref().zip(auth.account.as_deref());

    if let Some((service, account)) = keychain_pair {
        match read_keychain_secret(service, account) {
            Ok(secret) => return Ok(secret),
            Err(e) => tracing::warn!(
                keychain_service = service,
                keychain_account = account,
                reason = %e,
                "keychain unavailable, trying the remaining key sources"
            ),
        }
    }

    if let Some(var) = &auth.env {
        return match std::env::var(var) {
            Ok(key) => Ok(key),
            Err(_) => Err(Error::Auth(format!(
                "llm auth points at env var '{var}', which is unset"
            ))),
        };
    }

    if let Some((service, account)) = keychain_pair {
        let var = keychain_env_fallback(service, account);
        if let Ok(key) = std::env::var(&var) {
            tracing::info!(env_var = %var, "keychain pair resolved through its fallback env var");
            return Ok(key);
        }
    }

    if auth.mode == AuthMode::None {
        return Ok(String::new());
    }

    Err(Error::Auth(
        "llm auth has no usable key source; configure 'key', 'env', or a keychain \
         'service' + 'account' pair"
            .into(),
    ))
}

fn read_keychain_secret(service: &str, account: &str) -> Result<String> {
    let entry = keyring::Entry::new(service, account)
        .map_err(|e| Error::Auth(format!("keychain entry for {service}/{account}: {e}")))?;
    entry
        .get_password()
        .map_err(|e| Error::Auth(format!("keychain read for {service}/{account}: {e}")))
}

/// Env var a keychain pair degrades to on headless systems: both
/// segments uppercased with dashes flattened, joined by an underscore.
/// `("calagent", "llm-api-key")` → `CALAGENT_LLM_API_KEY`.
fn keychain_env_fallback(service: &str, account: &str) -> String {
    let mut var = String::with_capacity(service.len() + account.len() + 1);
    for (i, segment) in [service, account].into_iter().enumerate() {
        if i > 0 {
            var.push('_');
        }
        var.extend(segment.chars().map(|c| match c {
            '-' => '_',
            other => other.to_ascii_uppercase(),
        }));
    }
    var
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_key_takes_precedence() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            env: Some("CA_TEST_SHOULD_NOT_BE_READ".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test-123");
    }

    #[test]
    fn env_var_resolution() {
        let var = "CA_TEST_RESOLVE_ENV_KEY_4321";
        std::env::set_var(var, "env-secret");
        let auth = AuthConfig {
            env: Some(var.into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "env-secret");
        std::env::remove_var(var);
    }

    #[test]
    fn missing_env_var_is_auth_error() {
        let auth = AuthConfig {
            env: Some("CA_TEST_NONEXISTENT_VAR_9999".into()),
            ..Default::default()
        };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("CA_TEST_NONEXISTENT_VAR_9999"));
    }

    #[test]
    fn no_config_is_auth_error() {
        let err = resolve_api_key(&AuthConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn mode_none_resolves_empty() {
        let auth = AuthConfig {
            mode: AuthMode::None,
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "");
    }

    #[test]
    fn keychain_env_fallback_format() {
        assert_eq!(
            keychain_env_fallback("calagent", "llm-api-key"),
            "CALAGENT_LLM_API_KEY"
        );
        assert_eq!(keychain_env_fallback("MY_SVC", "KEY"), "MY_SVC_KEY");
    }

    #[test]
    fn keychain_headless_fallback_env() {
        let fallback_var = "CALAGENT_TEST_PROVIDER";
        std::env::set_var(fallback_var, "fallback-secret");
        let auth = AuthConfig {
            service: Some("calagent".into()),
            account: Some("test-provider".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "fallback-secret");
        std::env::remove_var(fallback_var);
    }
}
