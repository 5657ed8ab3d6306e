use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{AccountId, Owner};
use crate::store::GraphStore;

/// Source of the authenticated account for the current request.
pub trait IdentityProvider {
    fn current_account_id(&self) -> Option<AccountId>;
}

impl IdentityProvider for AccountId {
    fn current_account_id(&self) -> Option<AccountId> {
        Some(*self)
    }
}

impl IdentityProvider for Option<AccountId> {
    fn current_account_id(&self) -> Option<AccountId> {
        *self
    }
}

/// Resolves authenticated accounts to their owner profiles.
///
/// Lookup only: profiles are provisioned elsewhere.
pub struct OwnerDirectory<S> {
    store: Arc<S>,
}

impl<S> Clone for OwnerDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: GraphStore> OwnerDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn owner_for(&self, account_id: AccountId) -> Result<Owner> {
        self.store
            .find_owner_by_account(account_id)
            .await?
            .ok_or_else(|| {
                LibError::owner_not_found(anyhow!("no owner provisioned for account {}", account_id))
            })
    }

    pub async fn current_owner<I>(&self, identity: &I) -> Result<Owner>
    where
        I: IdentityProvider + ?Sized,
    {
        let account_id = identity
            .current_account_id()
            .ok_or_else(|| LibError::not_authenticated(anyhow!("no authenticated account")))?;
        self.owner_for(account_id).await
    }
}
