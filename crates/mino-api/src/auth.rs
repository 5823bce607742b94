// Account authentication
//
// Password login, session probing, logout, and the password-backed
// `CredentialProvider` used for silent session recovery.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::CredentialCache;
use crate::client::{AminoClient, Body, CredentialProvider, Method, Recovery};
use crate::error::Error;
use crate::models::{Account, LoginResponse, UserProfile};
use crate::session::{Session, parse_auid};

const LOGIN_PATH: &str = "/g/s/auth/login";
const ACCOUNT_PATH: &str = "/g/s/account";

impl AminoClient {
    /// Log in with email and password and install the resulting session.
    ///
    /// When `device_id` is given it replaces the client's device id first,
    /// so the login is bound to it.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
        device_id: Option<&str>,
    ) -> Result<LoginResponse, Error> {
        if let Some(device_id) = device_id {
            self.set_device_id(device_id);
        }

        debug!(email, "logging in");

        let body = json!({
            "secret": format!("0 {}", password.expose_secret()),
            "clientType": 100,
            "systemPushEnabled": 0,
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "locale": "en_US",
            "action": "normal",
            "bundleID": "com.narvii.master",
            "timezone": -480,
            "deviceID": self.device_id(),
            "email": email,
            "v": 2,
            "clientCallbackURL": "narviiapp://default",
        });

        let value = self
            .request(Method::Post, LOGIN_PATH, &Body::Json(body), Recovery::Disabled)
            .await?;
        let response: LoginResponse =
            serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
                message: format!("login response: {e}"),
                body: value.to_string(),
            })?;

        let user_id = match response.user_id() {
            Some(uid) => uid.to_owned(),
            None => parse_auid(&response.sid)?,
        };
        self.install_session(Session::new(
            SecretString::from(response.sid.clone()),
            user_id,
        ));

        info!(email, "login successful");
        Ok(response)
    }

    /// Fetch the profile and account of the logged-in user.
    pub async fn fetch_account(&self) -> Result<Account, Error> {
        self.fetch_account_with(Recovery::Allowed).await
    }

    /// Check that the installed session is still accepted, without
    /// attempting recovery.
    pub async fn probe_session(&self) -> Result<Account, Error> {
        self.fetch_account_with(Recovery::Disabled).await
    }

    async fn fetch_account_with(&self, recovery: Recovery) -> Result<Account, Error> {
        let user_id = self.user_id().ok_or(Error::NotLoggedIn)?;

        let profile_value = self
            .request(
                Method::Get,
                &format!("/g/s/user-profile/{user_id}"),
                &Body::Empty,
                recovery,
            )
            .await?;
        let profile: UserProfile = profile_value
            .get("userProfile")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| Error::Deserialization {
                message: format!("user profile: {e}"),
                body: profile_value.to_string(),
            })?
            .unwrap_or_default();

        let account_value = self
            .request(Method::Get, ACCOUNT_PATH, &Body::Empty, recovery)
            .await?;
        let account = Account {
            profile,
            account: account_value.get("account").cloned().unwrap_or(Value::Null),
        };

        self.accounts().insert(user_id, account.clone());
        Ok(account)
    }

    /// Account info cached by the last successful fetch, if still fresh.
    pub fn account(&self) -> Option<Account> {
        self.user_id().and_then(|uid| self.accounts().get(&uid))
    }

    /// Install a session from a bare sid and verify it.
    pub async fn login_with_sid(&self, sid: SecretString) -> Result<Account, Error> {
        self.install_session(Session::from_sid(sid)?);
        self.fetch_account().await
    }

    /// Drop the session and any installed credential provider.
    pub fn logout(&self) {
        if let Some(uid) = self.user_id() {
            self.accounts().invalidate(&uid);
        }
        self.clear_credential_provider();
        self.clear_session();
        debug!("logged out");
    }

    /// Round-trip time of `GET /g/s/account`, in milliseconds.
    pub async fn ping(&self) -> Result<f64, Error> {
        let start = Instant::now();
        self.request(Method::Get, ACCOUNT_PATH, &Body::Empty, Recovery::Allowed)
            .await?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        Ok((elapsed * 100.0).round() / 100.0)
    }

    /// Resolve a community link to its numeric id. Results are cached.
    pub async fn fetch_community_id(&self, link: &str) -> Result<i64, Error> {
        if let Some(id) = self.links().get(link) {
            return Ok(id);
        }

        let mut url = self.service_url("/g/s/link-resolution")?;
        url.query_pairs_mut().append_pair("q", link);

        let value = self.handler(Method::Get, url.as_str(), Body::Empty).await?;
        let id = community_id_from_link(&value).ok_or_else(|| Error::Deserialization {
            message: format!("no community id in link resolution for {link}"),
            body: value.to_string(),
        })?;

        self.links().insert(link, id);
        Ok(id)
    }
}

fn community_id_from_link(value: &Value) -> Option<i64> {
    let extensions = value.pointer("/linkInfoV2/extensions");
    [
        extensions.and_then(|e| e.pointer("/linkInfo/ndcId")),
        extensions.and_then(|e| e.pointer("/community/ndcId")),
        value.pointer("/community/ndcId"),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_i64)
}

// ── PasswordLogin ────────────────────────────────────────────────────

/// Re-runs the password login and refreshes the credential cache.
pub struct PasswordLogin {
    email: String,
    password: SecretString,
    cache: Option<Arc<CredentialCache>>,
}

impl PasswordLogin {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CredentialCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[async_trait]
impl CredentialProvider for PasswordLogin {
    async fn reauthenticate(&self, client: &AminoClient) -> Result<(), Error> {
        let response = client.authenticate(&self.email, &self.password, None).await?;
        if let Some(ref cache) = self.cache {
            cache.cache_login(
                &self.email,
                &client.device_id(),
                &SecretString::from(response.sid),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn community_id_from_link_info() {
        let value = json!({
            "linkInfoV2": { "extensions": { "linkInfo": { "ndcId": 123 } } }
        });
        assert_eq!(community_id_from_link(&value), Some(123));
    }

    #[test]
    fn community_id_from_community_block() {
        let value = json!({
            "linkInfoV2": { "extensions": { "community": { "ndcId": 456 } } }
        });
        assert_eq!(community_id_from_link(&value), Some(456));
        assert_eq!(community_id_from_link(&json!({})), None);
    }
}
