//! Identity collaborators: credential verification and identity removal

use async_trait::async_trait;
use redb::{ReadableDatabase, ReadableTable};

use crate::db::{Db, tables};
use crate::error::{AppError, Result};
use crate::models::User;
use crate::security::{sign_hmac, verify_hmac};

/// Maps a presented credential to a stable user id
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<String>;
}

/// Deletes the authentication identity behind a user id
#[async_trait]
pub trait IdentityRemover: Send + Sync {
    async fn delete_identity(&self, user_id: &str) -> Result<()>;
}

/// Bearer tokens of the form `{user_id}.{hex HMAC-SHA256(user_id)}`
///
/// A token is only valid while the user's identity record exists, so
/// removing the record revokes every token issued for it.
#[derive(Clone)]
pub struct SignedTokenIdentity {
    db: Db,
    secret: String,
}

impl SignedTokenIdentity {
    pub fn new(db: Db, secret: impl Into<String>) -> Self {
        Self {
            db,
            secret: secret.into(),
        }
    }

    pub fn issue_token(&self, user_id: &str) -> String {
        format!("{}.{}", user_id, sign_hmac(user_id, &self.secret))
    }
}

#[async_trait]
impl IdentityVerifier for SignedTokenIdentity {
    async fn verify(&self, credential: &str) -> Result<String> {
        let (user_id, signature) = credential
            .split_once('.')
            .ok_or(AppError::AuthenticationRequired)?;

        if !User::validate_id(user_id) || !verify_hmac(user_id, signature, &self.secret) {
            tracing::warn!("Rejected malformed or forged credential");
            return Err(AppError::AuthenticationRequired);
        }

        let db = self.db.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<String> {
            let read_txn = db.begin_read()?;
            let identities = read_txn.open_table(tables::IDENTITIES)?;
            if identities.get(user_id.as_str())?.is_none() {
                tracing::warn!("Credential for removed identity: {}", user_id);
                return Err(AppError::AuthenticationRequired);
            }
            Ok(user_id)
        })
        .await?
    }
}

#[async_trait]
impl IdentityRemover for SignedTokenIdentity {
    async fn delete_identity(&self, user_id: &str) -> Result<()> {
        let db = self.db.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut identities = write_txn.open_table(tables::IDENTITIES)?;
                identities.remove(user_id.as_str())?;
            }
            write_txn.commit()?;
            tracing::info!("Identity removed for user {}", user_id);
            Ok(())
        })
        .await?
    }
}
