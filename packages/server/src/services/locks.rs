use common::storage::ContentHash;
use tokio::sync::{Mutex, MutexGuard};

const DEFAULT_STRIPES: usize = 256;

/// Striped in-process locks keyed by content hash.
///
/// Every mutation of a blob row and its bytes runs under the stripe for its
/// hash. The guard must be taken before a transaction is opened, so a waiter
/// never holds a pooled connection.
pub struct HashLocks {
    stripes: Vec<Mutex<()>>,
}

impl HashLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub async fn lock(&self, hash: &ContentHash) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(hash)].lock().await
    }

    fn stripe_of(&self, hash: &ContentHash) -> usize {
        let bytes = hash.as_bytes();
        usize::from(u16::from_be_bytes([bytes[0], bytes[1]])) % self.stripes.len()
    }
}

impl Default for HashLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
