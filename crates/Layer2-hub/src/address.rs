//! Address book - RPC addresses learned from Init handshakes
//!
//! Written by the output relay (record) and the exit path (remove); read by
//! the call dispatcher.

use distrual_foundation::ChildId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AddressBook {
    entries: Arc<RwLock<HashMap<ChildId, SocketAddr>>>,

    /// Bumped on every record so waiters can re-check
    version: Arc<watch::Sender<u64>>,
}

impl AddressBook {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            version: Arc::new(version),
        }
    }

    pub fn record(&self, id: ChildId, addr: SocketAddr) {
        self.entries.write().insert(id, addr);
        self.version.send_modify(|v| *v += 1);
    }

    pub fn get(&self, id: ChildId) -> Option<SocketAddr> {
        self.entries.read().get(&id).copied()
    }

    pub fn remove(&self, id: ChildId) -> Option<SocketAddr> {
        self.entries.write().remove(&id)
    }

    /// Wait until `id` has an address, or `timeout` elapses
    pub async fn wait_for(&self, id: ChildId, timeout: Duration) -> Option<SocketAddr> {
        let mut changes = self.version.subscribe();
        let wait = async {
            loop {
                if let Some(addr) = self.get(id) {
                    return Some(addr);
                }
                if changes.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite a wildcard bind address to loopback of the same family
pub fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_record_get_remove() {
        let book = AddressBook::new();
        assert_eq!(book.get(ChildId(2)), None);

        book.record(ChildId(2), addr("127.0.0.1:4000"));
        assert_eq!(book.get(ChildId(2)), Some(addr("127.0.0.1:4000")));

        assert_eq!(book.remove(ChildId(2)), Some(addr("127.0.0.1:4000")));
        assert_eq!(book.get(ChildId(2)), None);
    }

    #[tokio::test]
    async fn test_wait_for_sees_later_record() {
        let book = AddressBook::new();
        let writer = book.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.record(ChildId(1), "127.0.0.1:5000".parse().unwrap());
        });

        let found = book.wait_for(ChildId(1), Duration::from_secs(5)).await;
        assert_eq!(found, Some(addr("127.0.0.1:5000")));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let book = AddressBook::new();
        book.record(ChildId(0), addr("127.0.0.1:1"));

        let found = book.wait_for(ChildId(1), Duration::from_millis(50)).await;
        assert_eq!(found, None);
    }

    #[test]
    fn test_reachable_rewrites_wildcards() {
        assert_eq!(reachable(addr("0.0.0.0:80")), addr("127.0.0.1:80"));
        assert_eq!(reachable(addr("[::]:81")), addr("[::1]:81"));
        assert_eq!(reachable(addr("10.0.0.5:82")), addr("10.0.0.5:82"));
    }
}
