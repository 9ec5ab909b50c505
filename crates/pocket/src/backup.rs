//! Local proof backup
//!
//! Optional encrypted persistence of proofs outside the in-memory ledger.
//! Writes are best-effort: the ledger logs a failed write and stays
//! authoritative until the next successful one.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Error;
use crate::nuts::{Proof, Proofs, Secret};

/// Backup collaborator
#[async_trait]
pub trait ProofBackup: Debug + Send + Sync {
    /// Persist proofs, updating rows that already exist by secret.
    ///
    /// `is_pending` marks proofs withheld for an in-flight payment;
    /// `is_spent` marks proofs the mint has invalidated (kept as history).
    async fn add_or_update_proofs(
        &self,
        proofs: Proofs,
        is_pending: bool,
        is_spent: bool,
    ) -> Result<(), Error>;
}

/// Backup row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// The proof
    pub proof: Proof,
    /// Withheld for an in-flight payment
    pub is_pending: bool,
    /// Invalidated by the mint
    pub is_spent: bool,
}

/// In-memory [`ProofBackup`], for tests and ephemeral wallets
#[derive(Debug, Default)]
pub struct MemoryBackup {
    entries: RwLock<HashMap<Secret, BackupEntry>>,
}

impl MemoryBackup {
    /// Create new [`MemoryBackup`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a persisted row by secret
    pub async fn get(&self, secret: &Secret) -> Option<BackupEntry> {
        self.entries.read().await.get(secret).cloned()
    }

    /// Number of persisted rows
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the backup holds no rows
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ProofBackup for MemoryBackup {
    async fn add_or_update_proofs(
        &self,
        proofs: Proofs,
        is_pending: bool,
        is_spent: bool,
    ) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        for proof in proofs {
            entries.insert(
                proof.secret.clone(),
                BackupEntry {
                    proof,
                    is_pending,
                    is_spent,
                },
            );
        }
        Ok(())
    }
}
