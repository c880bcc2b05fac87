//! Non-cryptographic 64-bit path hash shared by the compile cache and
//! the file watcher. Collisions are acceptable: the cache verifies
//! `mtime` on every read and the watcher's generation scheme only
//! cares about presence/absence within one process's table, so a
//! cheap wyhash-style mix is enough, no need for blake3 or anything
//! cryptographic here.

const P0: u64 = 0xa0761d6478bd642f;
const P1: u64 = 0xe7037ed1a0b428db;
const P2: u64 = 0x8ebc6af09c88c6e3;
const P3: u64 = 0x589965cc75374cc3;

#[inline]
fn mix(a: u64, b: u64) -> u64 {
    let r = (a as u128) * (b as u128);
    ((r >> 64) as u64) ^ (r as u64)
}

/// wyhash-style 64-bit hash of an arbitrary byte string.
pub fn wyhash64(data: &[u8], seed: u64) -> u64 {
    let mut seed = seed ^ P0;
    let mut i = 0usize;
    let len = data.len();

    while i + 16 <= len {
        let a = u64::from_le_bytes(data[i..i + 8].try_into().unwrap());
        let b = u64::from_le_bytes(data[i + 8..i + 16].try_into().unwrap());
        seed = mix(seed ^ a, b ^ P1);
        i += 16;
    }

    let mut a = 0u64;
    let mut b = 0u64;
    let rem = len - i;
    if rem >= 8 {
        a = u64::from_le_bytes(data[i..i + 8].try_into().unwrap());
        if rem > 8 {
            let mut tail = [0u8; 8];
            tail[..rem - 8].copy_from_slice(&data[i + 8..len]);
            b = u64::from_le_bytes(tail);
        }
    } else if rem > 0 {
        let mut tail = [0u8; 8];
        tail[..rem].copy_from_slice(&data[i..len]);
        a = u64::from_le_bytes(tail);
    }

    mix(seed ^ a, (len as u64) ^ P2 ^ b) ^ P3
}

/// Hash a filesystem path to the key used by the watcher's `WatchEntry`
/// table and the compile cache's `path_hash`.
pub fn hash_path(path: &std::path::Path) -> u64 {
    wyhash64(path.to_string_lossy().as_bytes(), 0x243F6A8885A308D3)
}

/// 16 lowercase hex characters for a 64-bit hash, used as the level-2
/// disk cache filename: `.wu-cache/<hex64-of-hash>.dat`.
pub fn hex64(value: u64) -> String {
    format!("{:016x}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        let h1 = wyhash64(b"hello world", 1);
        let h2 = wyhash64(b"hello world", 1);
        assert_eq!(h1, h2);
    }

    #[test]
    fn differs_on_seed() {
        assert_ne!(wyhash64(b"abc", 1), wyhash64(b"abc", 2));
    }

    #[test]
    fn hex64_is_16_chars() {
        assert_eq!(hex64(0).len(), 16);
        assert_eq!(hex64(u64::MAX).len(), 16);
    }

    #[test]
    fn handles_all_tail_lengths() {
        for n in 0..40 {
            let data: Vec<u8> = (0..n).collect();
            let _ = wyhash64(&data, 7); // must not panic for any length
        }
    }
}
