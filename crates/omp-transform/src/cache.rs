//! Content-addressed cache of transformed sources.
//!
//! Key = hash(source text, alias, tool version). Anything that changes the
//! output changes the key, so stale entries are unreachable misses rather
//! than wrong hits. Each entry is the transformed source plus a JSON
//! sidecar describing how it was produced.

use std::hash::{BuildHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Options;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed hasher keys: the cache must hash identically across runs.
const SEED_A: (u64, u64, u64, u64) = (0x8c67_2d33, 0x1f3a_9e01, 0x55aa_cd12, 0x0bad_f00d);
const SEED_B: (u64, u64, u64, u64) = (0x7031_b7c5, 0x9e37_79b9, 0x85eb_ca6b, 0xc2b2_ae35);

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    version: String,
    alias: String,
    source_len: usize,
}

/// Stable content key for `(source, options, tool version)`.
pub fn cache_key(source: &str, options: &Options) -> String {
    let mut a = ahash::RandomState::with_seeds(SEED_A.0, SEED_A.1, SEED_A.2, SEED_A.3)
        .build_hasher();
    let mut b = ahash::RandomState::with_seeds(SEED_B.0, SEED_B.1, SEED_B.2, SEED_B.3)
        .build_hasher();
    for h in [&mut a, &mut b] {
        source.hash(h);
        options.alias.hash(h);
        VERSION.hash(h);
    }
    format!("{:016x}{:016x}", a.finish(), b.finish())
}

/// Cache root: explicit option, then `ROMPY_CACHE_DIR`, then the platform
/// cache directory.
pub fn cache_dir(options: &Options) -> PathBuf {
    if let Some(dir) = &options.cache_dir {
        return dir.clone();
    }
    if let Ok(dir) = std::env::var("ROMPY_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("rompy"))
        .unwrap_or_else(|| PathBuf::from(".rompy-cache"))
}

fn entry_paths(root: &Path, key: &str) -> (PathBuf, PathBuf) {
    (root.join(format!("{key}.py")), root.join(format!("{key}.json")))
}

/// Look up a transformed source. A hit requires both the artifact and a
/// sidecar whose recorded version matches this tool.
pub fn lookup(source: &str, options: &Options) -> Option<String> {
    let key = cache_key(source, options);
    let (artifact, sidecar) = entry_paths(&cache_dir(options), &key);
    let meta: CacheMeta = serde_json::from_str(&std::fs::read_to_string(&sidecar).ok()?).ok()?;
    if meta.version != VERSION || meta.alias != options.alias {
        debug!(target: "transform.cache", %key, "sidecar mismatch, treating as miss");
        return None;
    }
    let hit = std::fs::read_to_string(&artifact).ok()?;
    info!(target: "transform.cache", %key, "cache hit");
    Some(hit)
}

/// Store a transformed source. Failures are logged and ignored: the cache
/// is an accelerator, never a correctness dependency.
pub fn store(source: &str, options: &Options, transformed: &str) {
    let key = cache_key(source, options);
    let root = cache_dir(options);
    if let Err(err) = std::fs::create_dir_all(&root) {
        debug!(target: "transform.cache", error = %err, "cannot create cache dir");
        return;
    }
    let (artifact, sidecar) = entry_paths(&root, &key);
    let meta = CacheMeta {
        version: VERSION.to_string(),
        alias: options.alias.clone(),
        source_len: source.len(),
    };
    let meta_json = serde_json::to_string_pretty(&meta).expect("meta serializes");
    if let Err(err) = std::fs::write(&artifact, transformed)
        .and_then(|()| std::fs::write(&sidecar, meta_json))
    {
        debug!(target: "transform.cache", error = %err, "cache write failed");
        return;
    }
    info!(target: "transform.cache", %key, "cache entry written");
}
