use std::{fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::credential::Credential;

/// Source of the holder's candidate credentials.
///
/// Credentials handed out by a store are expected to have had their proofs
/// checked already.
#[async_trait]
pub trait CredentialStore: Debug + Send + Sync {
    type Credential: Credential + Clone + Send + Sync;

    /// Get a credential by id. A missing credential is an error.
    async fn get(&self, id: &str) -> Result<Self::Credential>;

    /// Get every credential of the store, in insertion order.
    async fn get_all(&self) -> Result<Vec<Self::Credential>>;
}

/// A local in-memory store. Not for production use!
///
/// # Warning
/// This in-memory store should only be used for test purposes, credentials
/// are lost when the store is dropped.
#[derive(Debug, Clone)]
pub struct MemoryStore<C> {
    store: Arc<Mutex<Vec<C>>>,
}

impl<C> Default for MemoryStore<C> {
    fn default() -> Self {
        Self {
            store: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<C: Credential> MemoryStore<C> {
    pub fn new(credentials: Vec<C>) -> Self {
        Self {
            store: Arc::new(Mutex::new(credentials)),
        }
    }

    /// Add a credential, replacing any credential with the same id.
    pub async fn insert(&self, credential: C) {
        let mut store = self.store.lock().await;

        match store.iter_mut().find(|c| c.id() == credential.id()) {
            Some(existing) => *existing = credential,
            None => store.push(credential),
        }
    }

    /// Remove a credential by id.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut store = self.store.lock().await;

        match store.iter().position(|c| c.id() == id) {
            Some(index) => {
                store.remove(index);
                Ok(())
            }
            None => bail!("credential not found: {id}"),
        }
    }
}

#[async_trait]
impl<C> CredentialStore for MemoryStore<C>
where
    C: Credential + Clone + Debug + Send + Sync,
{
    type Credential = C;

    async fn get(&self, id: &str) -> Result<C> {
        if let Some(credential) = self.store.lock().await.iter().find(|c| c.id() == id) {
            return Ok(credential.clone());
        }

        bail!("credential not found: {id}")
    }

    async fn get_all(&self) -> Result<Vec<C>> {
        Ok(self.store.lock().await.clone())
    }
}
