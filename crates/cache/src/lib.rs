//! Content-addressed result cache with TTL (C3).
//!
//! One JSON file per `(namespace, key)` under `<out_dir>/cache/<namespace>/
//! <key>.json`, written with atomic replace (temp file + rename) so
//! readers never observe a partial write — the same discipline
//! `sa_sessions::store::SessionStore` uses for its single `sessions.json`,
//! generalized here to one file per entry so concurrent namespaces/keys
//! don't contend on a single lock. Writers are serialized per key with an
//! in-process mutex (write-last-wins is fine per §4.3: the value is
//! determined entirely by the key).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use reportdeck_domain::model::CacheEntry;

/// Canonicalize `parts` (already sorted — `serde_json::Map` is a
/// `BTreeMap` without the `preserve_order` feature) plus a model/version
/// tag into a 32-hex-char content-addressed key (§4.3: "at least 16
/// hex characters").
pub fn make_key(parts: &Value, tag: &str) -> String {
    let canon = serde_json::to_string(parts).expect("Value always serializes");
    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    hasher.update(b"\u{0}");
    hasher.update(tag.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..32].to_string()
}

pub struct CacheStore {
    base_dir: PathBuf,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.base_dir.join(namespace).join(format!("{key}.json"))
    }

    fn lock_for(&self, namespace: &str, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock();
        locks
            .entry(format!("{namespace}/{key}"))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns the cached value iff present and `now - created_at <=
    /// ttl_secs`. A corrupt entry is treated as absent, never fatal
    /// (§4.3).
    pub fn get(&self, namespace: &str, key: &str, ttl_secs: i64) -> Option<Value> {
        let path = self.entry_path(namespace, key);
        let raw = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt cache entry, treating as absent");
                return None;
            }
        };
        let now = chrono::Utc::now().timestamp();
        if now - entry.created_at > ttl_secs {
            return None;
        }
        Some(entry.value)
    }

    pub fn set(&self, namespace: &str, key: &str, value: Value) {
        let lock = self.lock_for(namespace, key);
        let _guard = lock.lock();

        let dir = self.base_dir.join(namespace);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create cache namespace directory");
            return;
        }

        let entry = CacheEntry {
            key: key.to_string(),
            namespace: namespace.to_string(),
            value,
            created_at: chrono::Utc::now().timestamp(),
        };
        let json = match serde_json::to_string(&entry) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize cache entry");
                return;
            }
        };

        let final_path = self.entry_path(namespace, key);
        let tmp_path = dir.join(format!("{key}.json.tmp-{}", std::process::id()));
        if let Err(e) = std::fs::write(&tmp_path, json) {
            tracing::warn!(error = %e, "failed to write cache temp file");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
            tracing::warn!(error = %e, "failed to publish cache entry atomically");
        }
    }
}

/// Key inputs for `llm.summarize` (§4.3).
pub fn summarizer_key(
    report_text: &str,
    max_bullets: usize,
    max_script_chars: usize,
    model_id: &str,
    max_sections_hint: usize,
) -> String {
    let parts = serde_json::json!({
        "report_text": report_text,
        "max_bullets": max_bullets,
        "max_script_chars": max_script_chars,
        "max_sections_hint": max_sections_hint,
    });
    make_key(&parts, model_id)
}

/// Key inputs for `image.generate` (§4.3).
pub fn image_key(prompt: &str, aspect: &str, size: Option<&str>, model_id: &str, shared_public: bool) -> String {
    let parts = serde_json::json!({
        "prompt": prompt,
        "aspect": aspect,
        "size": size,
        "shared_public": shared_public,
    });
    make_key(&parts, model_id)
}

pub fn namespace_path(base_dir: &Path, namespace: &str) -> PathBuf {
    base_dir.join(namespace)
}
