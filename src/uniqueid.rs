//! Process-wide unique tag generation (`spec.md` §4.5), ported from
//! `UniqueId.C`: a fingerprint prefix seeded once from host/process/time
//! entropy, extended per call by a mutex-serialized monotonic counter.

use std::net::ToSocketAddrs;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fp::Tag;

static PREFIX: OnceLock<Tag> = OnceLock::new();
static COUNTER: Mutex<u64> = Mutex::new(0);

/// Returns a fresh tag, guaranteed distinct from every other tag produced
/// by this process and, with high probability, from every tag produced by
/// any other process on any other host (`spec.md` §8 property 20).
pub fn unique_id() -> Tag {
    let mut tag = *PREFIX.get_or_init(build_prefix);

    let counter = {
        let mut guard = COUNTER.lock().unwrap();
        let value = *guard;
        *guard += 1;
        value
    };

    // The original byte-swaps this on big-endian hosts so the
    // rapidly-changing low bits lead the extension; a fixed little-endian
    // encoding gives the same property on every host without a cfg branch.
    tag.extend(&counter.to_le_bytes());
    tag
}

fn build_prefix() -> Tag {
    let mut tag = Tag::empty();

    let hostid = unsafe { libc::gethostid() };
    tag.extend(&hostid.to_ne_bytes());

    if let Ok(name) = hostname::get() {
        if let Some(name) = name.to_str() {
            tag.extend(name.as_bytes());

            if let Ok(mut addrs) = (name, 0u16).to_socket_addrs() {
                if let Some(addr) = addrs.next() {
                    match addr.ip() {
                        std::net::IpAddr::V4(v4) => tag.extend(&v4.octets()),
                        std::net::IpAddr::V6(v6) => tag.extend(&v6.octets()),
                    }
                }
            }
        }
    }

    let pid = unsafe { libc::getpid() };
    tag.extend(&pid.to_ne_bytes());
    let ppid = unsafe { libc::getppid() };
    tag.extend(&ppid.to_ne_bytes());
    let pgid = unsafe { libc::getpgrp() };
    tag.extend(&pgid.to_ne_bytes());

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    tag.extend(&now.to_ne_bytes());

    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_calls_are_distinct() {
        let a = unique_id();
        let b = unique_id();
        assert_ne!(a, b);
    }

    #[test]
    fn many_calls_stay_distinct() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(unique_id()));
        }
    }
}
