//! Two-level compile cache: an in-memory ring buffer backed by a
//! per-entry disk file under `.wu-cache/`. A single mutex guards a
//! bounded table, keyed on `(path_hash, mtime)` rather than a content
//! hash, since this cache fronts compiled *source*, not build artifacts.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::hash::{hash_path, hex64};

const L1_CAPACITY: usize = 256;

#[derive(Clone)]
struct Slot {
    path_hash: u64,
    mtime: i128,
    body: Vec<u8>,
}

struct L1Table {
    slots: Vec<Option<Slot>>,
    next: usize,
}

impl L1Table {
    fn new() -> Self {
        Self { slots: vec![None; L1_CAPACITY], next: 0 }
    }

    fn get(&self, path_hash: u64, mtime: i128) -> Option<Vec<u8>> {
        self.slots
            .iter()
            .flatten()
            .find(|s| s.path_hash == path_hash && s.mtime == mtime)
            .map(|s| s.body.clone())
    }

    fn put(&mut self, path_hash: u64, mtime: i128, body: Vec<u8>) {
        if let Some(idx) = self.slots.iter().position(|s| s.as_ref().map(|s| s.path_hash) == Some(path_hash)) {
            self.slots[idx] = Some(Slot { path_hash, mtime, body });
            return;
        }
        let idx = self.next;
        self.slots[idx] = Some(Slot { path_hash, mtime, body });
        self.next = (self.next + 1) % L1_CAPACITY;
    }

    fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}

pub struct CompileCache {
    l1: Mutex<L1Table>,
    disk_dir: Option<PathBuf>,
}

fn mtime_as_i128(metadata: &std::fs::Metadata) -> i128 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}

impl CompileCache {
    /// `root` is the project root; the disk tier lives at
    /// `<root>/.wu-cache/`. If the directory cannot be created, the
    /// disk tier is silently disabled.
    pub fn new(root: &Path) -> Self {
        let dir = root.join(".wu-cache");
        let disk_dir = match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(_) => None,
        };
        Self { l1: Mutex::new(L1Table::new()), disk_dir }
    }

    fn disk_path(&self, path_hash: u64) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(format!("{}.dat", hex64(path_hash))))
    }

    /// Look up the cached body for `path` if its current on-disk
    /// `mtime` still matches what was cached.
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        let metadata = std::fs::metadata(path).ok()?;
        let mtime = mtime_as_i128(&metadata);
        let path_hash = hash_path(path);

        if let Some(body) = self.l1.lock().get(path_hash, mtime) {
            return Some(body);
        }

        let disk_path = self.disk_path(path_hash)?;
        let raw = std::fs::read(disk_path).ok()?;
        let newline = raw.iter().position(|&b| b == b'\n')?;
        let stored_mtime: i128 = std::str::from_utf8(&raw[..newline]).ok()?.parse().ok()?;
        if stored_mtime != mtime {
            return None;
        }
        let body = raw[newline + 1..].to_vec();
        self.l1.lock().put(path_hash, mtime, body.clone());
        Some(body)
    }

    /// Insert a freshly-computed body for `path` at its current mtime.
    pub fn put(&self, path: &Path, body: &[u8]) {
        let Ok(metadata) = std::fs::metadata(path) else { return };
        let mtime = mtime_as_i128(&metadata);
        let path_hash = hash_path(path);

        self.l1.lock().put(path_hash, mtime, body.to_vec());

        if let Some(disk_path) = self.disk_path(path_hash) {
            let mut contents = format!("{mtime}\n").into_bytes();
            contents.extend_from_slice(body);
            let _ = std::fs::write(disk_path, contents);
        }
    }

    /// Free the in-memory tier on server shutdown.
    pub fn teardown(&self) {
        self.l1.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn touch(path: &Path, content: &str) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.js");
        touch(&file, "const a = 1;");

        let cache = CompileCache::new(dir.path());
        cache.put(&file, b"compiled-a");
        assert_eq!(cache.get(&file), Some(b"compiled-a".to_vec()));
    }

    #[test]
    fn stale_mtime_misses() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.js");
        touch(&file, "const a = 1;");

        let cache = CompileCache::new(dir.path());
        cache.put(&file, b"compiled-a");

        std::thread::sleep(std::time::Duration::from_millis(10));
        touch(&file, "const a = 2;");
        assert_eq!(cache.get(&file), None);
    }

    #[test]
    fn l2_promotes_into_l1_on_hit() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.js");
        touch(&file, "const a = 1;");

        let cache = CompileCache::new(dir.path());
        cache.put(&file, b"compiled-a");
        cache.l1.lock().clear();

        assert_eq!(cache.get(&file), Some(b"compiled-a".to_vec()));
        // now present again in L1 without touching disk
        assert!(cache.l1.lock().get(hash_path(&file), mtime_as_i128(&fs::metadata(&file).unwrap())).is_some());
    }

    #[test]
    fn missing_cache_dir_disables_disk_tier_silently() {
        let dir = tempdir().unwrap();
        let ro_parent = dir.path().join("nonexistent").join("deeply").join("nested");
        // creating under an unwritable path is awkward to simulate portably;
        // instead verify `new` never panics even if create_dir_all fails by
        // pointing at a path that collides with a file.
        let blocker = dir.path().join("blocker");
        touch(&blocker, "x");
        let cache = CompileCache::new(&blocker.join("cache-root"));
        let _ = ro_parent;
        // disk tier disabled; get/put must not panic, just silently no-op on disk
        let file = dir.path().join("b.js");
        touch(&file, "b");
        cache.put(&file, b"body");
        assert_eq!(cache.get(&file), Some(b"body".to_vec())); // served from L1
    }
}
