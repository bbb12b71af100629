use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Joins a download-token name and an email into the username of a
/// token-link identity.
pub const LINK_SEPARATOR: &str = "*-*";

/// The role an identity acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Can upload content, generate tokens and manage users.
    Admin,
    /// Downloads content with a token or with credentials.
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Customer => "Customer",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "Admin" => Some(Role::Admin),
            "Customer" => Some(Role::Customer),
            _ => None,
        }
    }
}

/// An identity known to the user store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Argon2 PHC string; empty for token-link identities.
    pub hash: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub role: Role,
    /// Name of the download token that meters this identity.
    pub token: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub modify_date: Option<DateTime<Utc>>,
}

impl User {
    /// Username of the identity created when `token` is redeemed for `email`.
    pub fn link_username(token: &str, email: &str) -> String {
        format!("{}{}{}", token, LINK_SEPARATOR, email)
    }

    /// Customer identity bound to a redeemed download token.
    pub fn for_token(token: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            username: Self::link_username(token, email),
            hash: String::new(),
            email: email.to_string(),
            name: String::new(),
            role: Role::Customer,
            token: Some(token.to_string()),
            last_login: Some(now),
            modify_date: Some(now),
        }
    }
}

/// What clients get to see of a [`User`]: everything but the hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub token: Option<String>,
    #[serde(rename = "lastLogin")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(rename = "modifyDate")]
    pub modify_date: Option<DateTime<Utc>>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            username: u.username.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
            token: u.token.clone(),
            last_login: u.last_login,
            modify_date: u.modify_date,
        }
    }
}

/// A finite-use download credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadToken {
    pub name: String,
    pub downloads: i64,
}

/// A downloadable artifact registered with the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub name: String,
    pub path: String,
    /// Base64 SHA-256 of the stored file.
    #[serde(default)]
    pub sha256: String,
    #[serde(rename = "gitHash", default)]
    pub git_hash: String,
    #[serde(rename = "modifyDate")]
    pub modify_date: Option<DateTime<Utc>>,
}

/// One served download in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadLogEntry {
    pub username: String,
    pub download: String,
    /// Client host the file was served to.
    pub host: String,
    pub when: DateTime<Utc>,
}

/// Login request body.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// Admin request body for creating or updating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDetails {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default)]
    pub token: Option<String>,
}

/// Admin request body for minting download tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTokens {
    pub count: u32,
    pub downloads: i64,
}

/// Redemption of a download token for an email address.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
}

/// Query string of unauthenticated download links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkParams {
    pub token: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "downloadName")]
    pub download_name: Option<String>,
}

/// Query string of cookie-authenticated downloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadParams {
    #[serde(rename = "downloadName")]
    pub download_name: Option<String>,
}
