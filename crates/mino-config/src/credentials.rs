// Credential resolution: session id or email + password, looked up
// through env vars, the system keyring, and plaintext config in that
// order.

use secrecy::SecretString;

use mino_core::LoginRequest;

use crate::config::Profile;
use crate::error::ConfigError;

const KEYRING_SERVICE: &str = "mino";
const SID_ENV: &str = "MINO_SID";
const PASSWORD_ENV: &str = "MINO_PASSWORD";

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/password"),
    )?)
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

/// Remove a stored password. Missing entries are not an error.
pub fn clear_password(profile_name: &str) -> Result<(), ConfigError> {
    match keyring_entry(profile_name)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Resolve the password for a profile.
///
/// 1. The env var named by `password_env`
/// 2. `MINO_PASSWORD`
/// 3. The system keyring
/// 4. Plaintext in the profile
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(value) = std::env::var(env_name) {
            return Some(SecretString::from(value));
        }
    }

    if let Ok(value) = std::env::var(PASSWORD_ENV) {
        return Some(SecretString::from(value));
    }

    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(value) = entry.get_password() {
            return Some(SecretString::from(value));
        }
    }

    profile.password.clone().map(SecretString::from)
}

/// Build the login request for a profile. A session id wins over a
/// password.
pub fn login_request(profile: &Profile, profile_name: &str) -> Result<LoginRequest, ConfigError> {
    let sid = std::env::var(SID_ENV).ok().or_else(|| profile.sid.clone());

    let mut request = if let Some(sid) = sid {
        LoginRequest::sid(SecretString::from(sid))
    } else {
        let email = profile.email.clone().ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.to_owned(),
        })?;
        let password =
            resolve_password(profile, profile_name).ok_or_else(|| ConfigError::NoCredentials {
                profile: profile_name.to_owned(),
            })?;
        LoginRequest::password(email, password).with_cache(profile.use_cache)
    };

    if let Some(ref device_id) = profile.device_id {
        request = request.with_device_id(device_id.clone());
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn password_from_named_env_var() {
        Jail::expect_with(|jail| {
            jail.set_env("BOT_PASSWORD", "from-env");
            let profile = Profile {
                email: Some("bot@example.com".into()),
                password_env: Some("BOT_PASSWORD".into()),
                password: Some("plaintext".into()),
                ..Profile::default()
            };
            let password = resolve_password(&profile, "mino-test-env").unwrap();
            assert_eq!(password.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn sid_wins_over_password() {
        Jail::expect_with(|jail| {
            jail.set_env("MINO_SID", "sid-from-env");
            let profile = Profile {
                email: Some("bot@example.com".into()),
                password: Some("plaintext".into()),
                device_id: Some("19AB".into()),
                ..Profile::default()
            };
            let request = login_request(&profile, "mino-test-sid").unwrap();
            assert_eq!(
                request.sid.as_ref().map(|s| s.expose_secret().to_owned()),
                Some("sid-from-env".to_owned())
            );
            assert!(request.email.is_none());
            assert_eq!(request.device_id.as_deref(), Some("19AB"));
            Ok(())
        });
    }

    #[test]
    fn password_request_carries_cache_flag() {
        Jail::expect_with(|jail| {
            jail.set_env("MINO_PASSWORD", "from-env");
            let profile = Profile {
                email: Some("bot@example.com".into()),
                use_cache: false,
                ..Profile::default()
            };
            let request = login_request(&profile, "mino-test-pw").unwrap();
            assert_eq!(request.email.as_deref(), Some("bot@example.com"));
            assert!(!request.use_cache);
            Ok(())
        });
    }

    #[test]
    fn missing_email_is_no_credentials() {
        Jail::expect_with(|_| {
            let profile = Profile::default();
            assert!(matches!(
                login_request(&profile, "mino-test-none"),
                Err(ConfigError::NoCredentials { .. })
            ));
            Ok(())
        });
    }
}
