use crate::error::SentinelError;
use log::{debug, info};
use serde::Deserialize;
use std::fmt;

/// Public OpenID client registered for password grants on the Copernicus identity realm.
pub const CLIENT_ID: &str = "cdse-public";

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Bearer token. Its expiry is unknown to us; it is replaced whenever a request fails.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(***)")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub trait Authenticate {
    async fn authenticate(&self) -> Result<AccessToken, SentinelError>;
}

pub struct Authenticator {
    client: reqwest::Client,
    identity_url: String,
    credentials: Credentials,
}

impl Authenticator {
    pub fn new(client: reqwest::Client, identity_url: &str, credentials: Credentials) -> Self {
        Self {
            client,
            identity_url: identity_url.to_string(),
            credentials,
        }
    }
}

impl Authenticate for Authenticator {
    async fn authenticate(&self) -> Result<AccessToken, SentinelError> {
        debug!("Requesting access token from {}", self.identity_url);
        let params = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("client_id", CLIENT_ID),
        ];

        let resp = self.client.post(&self.identity_url).form(&params).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SentinelError::Authentication(format!("{} {}", status, body)));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(AccessToken(token.access_token))
    }
}

/// Holds the current token. Refresh is reactive: callers invoke [`Session::refresh`] after a
/// request has already failed, there is no clock-based renewal.
pub struct Session<A> {
    authenticator: A,
    token: AccessToken,
}

impl<A: Authenticate> Session<A> {
    pub async fn open(authenticator: A) -> Result<Self, SentinelError> {
        let token = authenticator.authenticate().await?;
        info!("Successfully connected to Copernicus Data Space");
        Ok(Self { authenticator, token })
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub async fn refresh(&mut self) -> Result<(), SentinelError> {
        self.token = self.authenticator.authenticate().await?;
        debug!("Access token refreshed");
        Ok(())
    }
}
