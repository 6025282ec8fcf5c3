//! Per-request idempotency store (C4).
//!
//! Persistent across restarts in a single `idempotency.json` file,
//! grounded directly in `sa_sessions::store::SessionStore`: load the whole
//! map into memory at startup, mutate under a `parking_lot::RwLock`, flush
//! the entire map back out with an atomic temp-file-then-rename on every
//! write so a reader never sees a half-written file (§5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use reportdeck_domain::model::{DeckRef, IdempotencyEntry};
use reportdeck_domain::Error;

pub struct IdempotencyStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, IdempotencyEntry>>,
}

impl IdempotencyStore {
    /// Load (or create) the store at `state_dir/idempotency.json`.
    pub fn new(state_dir: &Path) -> Result<Self, Error> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join("idempotency.json");
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Derive the per-slide key used for slide-append operations (§4.4):
    /// `"<client_key>#s<index>"`.
    pub fn slide_key(client_key: &str, index: usize) -> String {
        format!("{client_key}#s{index}")
    }

    pub fn lookup(&self, client_key: &str) -> Option<DeckRef> {
        self.entries
            .read()
            .get(client_key)
            .map(|e| e.deck_ref.clone())
    }

    /// Record the result of a side-effecting operation under `client_key`.
    /// Per §4.4, this must only be called after the side effects commit.
    pub fn record(&self, client_key: &str, deck_ref: DeckRef) -> Result<(), Error> {
        let entry = IdempotencyEntry {
            client_key: client_key.to_string(),
            deck_ref,
            recorded_at: chrono::Utc::now().timestamp(),
        };
        {
            let mut entries = self.entries.write();
            entries.insert(client_key.to_string(), entry);
        }
        self.flush()
    }

    fn flush(&self) -> Result<(), Error> {
        let entries = self.entries.read();
        let json = serde_json::to_string_pretty(&*entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
