//! Out-of-band provisioning of administrator accounts.

use chrono::Utc;

use crate::password::hash_password_blocking;
use crate::store::{Store, StoreError};
use crate::types::{Role, User};

/// Creates `username` as an Admin with `password`, or resets the password and
/// role of an existing account. Other profile fields are kept.
pub async fn provision_admin(store: &dyn Store, username: &str, password: &str) -> anyhow::Result<User> {
    if username.trim().is_empty() {
        anyhow::bail!("username must not be empty");
    }
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }

    let mut user = match store.load_user(username).await {
        Ok(existing) => existing,
        Err(StoreError::NotFound(_)) => User {
            username: username.to_string(),
            hash: String::new(),
            email: String::new(),
            name: String::new(),
            role: Role::Admin,
            token: None,
            last_login: None,
            modify_date: None,
        },
        Err(e) => return Err(e.into()),
    };
    user.hash = hash_password_blocking(password.to_string()).await?;
    user.role = Role::Admin;
    user.modify_date = Some(Utc::now());
    store.save_user(&user).await?;
    Ok(user)
}
