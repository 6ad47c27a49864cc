//! Rate Limiting Implementation
//!
//! Sliding-window admission control per client IP. Each client keeps the
//! timestamps of its admitted requests inside the trailing window; a request
//! is admitted while fewer than `max_requests` remain after purging.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::collections::{HashMap, VecDeque};
use std::hash::BuildHasher;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SHARD_COUNT: usize = 16;

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub max_requests: u32,
    pub max_tracked_clients: usize,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Peers in these networks may supply the client address via X-Forwarded-For
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
            max_tracked_clients: 100_000,
            cleanup_interval: Duration::from_secs(60),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed {
        /// Requests left in the current window after this one
        remaining: u32,
    },
    Rejected {
        /// Time until the oldest recorded request leaves the window
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Recent request history of one client
#[derive(Debug)]
struct ClientWindow {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

impl ClientWindow {
    fn new(now: Instant) -> Self {
        Self {
            hits: VecDeque::new(),
            last_seen: now,
        }
    }

    /// Drop timestamps that have aged out of the window
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

type Shard = HashMap<IpAddr, ClientWindow>;

/// Main rate limiter implementation
pub struct RateLimiter {
    config: RateLimitConfig,
    shards: Vec<Mutex<Shard>>,
    shard_capacity: usize,
    hasher: RandomState,
    total_checked: AtomicU64,
    total_rejected: AtomicU64,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        let max_clients = config.max_tracked_clients.max(1);
        let shard_count = SHARD_COUNT.min(max_clients);
        let shard_capacity = max_clients.div_ceil(shard_count);

        Self {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
            shard_capacity,
            hasher: RandomState::new(),
            total_checked: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and record a request from `ip` at the current time
    pub fn check(&self, ip: IpAddr) -> Admission {
        self.check_at(ip, Instant::now())
    }

    /// Check and record a request from `ip` as if the current time were `now`
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> Admission {
        let max = self.config.max_requests;
        if !self.config.enabled {
            return Admission::Allowed { remaining: max };
        }

        self.total_checked.fetch_add(1, Ordering::Relaxed);

        let window = self.config.window;
        let mut shard = self.lock_shard(&ip);

        if !shard.contains_key(&ip) && shard.len() >= self.shard_capacity {
            self.make_room(&mut shard, now);
        }

        let client = shard.entry(ip).or_insert_with(|| ClientWindow::new(now));
        client.purge(now, window);
        client.last_seen = now;

        let used = client.hits.len();
        if used >= max as usize {
            let retry_after = client
                .hits
                .front()
                .map_or(window, |&oldest| {
                    window.saturating_sub(now.saturating_duration_since(oldest))
                });

            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(client_ip = %ip, ?retry_after, "Rate limit exceeded");
            return Admission::Rejected { retry_after };
        }

        client.hits.push_back(now);
        let remaining = max - (used as u32 + 1);
        debug!(client_ip = %ip, remaining, "Request admitted");

        Admission::Allowed { remaining }
    }

    /// Resolve the client address for a request arriving from `peer`.
    ///
    /// `X-Forwarded-For` is consulted only when the peer is a trusted proxy.
    /// Proxies append to the header, so it is walked from the right and the
    /// first hop outside `trusted_proxies` is the client. Entries to the left
    /// of that hop are client supplied and never used. An unparseable hop
    /// stops the walk at the last trusted address seen.
    pub fn client_ip(&self, peer: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
        if !self.is_trusted_proxy(&peer) {
            return peer;
        }

        let Some(value) = forwarded_for else {
            return peer;
        };

        let mut client = peer;
        for hop in value.rsplit(',') {
            let Ok(addr) = hop.trim().parse::<IpAddr>() else {
                break;
            };
            client = addr;
            if !self.is_trusted_proxy(&addr) {
                break;
            }
        }
        client
    }

    fn is_trusted_proxy(&self, addr: &IpAddr) -> bool {
        self.config.trusted_proxies.iter().any(|net| net.contains(addr))
    }

    /// Remove clients whose whole history has aged out. Returns the number
    /// of clients removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut removed = 0;

        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            let before = shard.len();
            shard.retain(|_, client| {
                client.purge(now, window);
                !client.hits.is_empty()
            });
            removed += before - shard.len();
        }

        if removed > 0 {
            debug!(removed, "Cleaned up idle rate limit entries");
        }
        removed
    }

    /// Spawn the periodic sweep. Stops when `shutdown` fires.
    pub fn start_cleanup_task(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let period = self.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.cleanup();
                    }
                    _ = shutdown.recv() => {
                        info!("Rate limiter cleanup task stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Get rate limiter statistics
    pub fn stats(&self) -> RateLimiterStats {
        let tracked_clients = self
            .shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum();

        RateLimiterStats {
            total_checked: self.total_checked.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            tracked_clients,
        }
    }

    fn lock_shard(&self, ip: &IpAddr) -> MutexGuard<'_, Shard> {
        let index = (self.hasher.hash_one(ip) as usize) % self.shards.len();
        self.shards[index].lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Free a slot in a full shard: sweep stale clients, then evict the
    /// least recently seen one if that was not enough
    fn make_room(&self, shard: &mut Shard, now: Instant) {
        let window = self.config.window;
        shard.retain(|_, client| {
            client.purge(now, window);
            !client.hits.is_empty()
        });

        if shard.len() < self.shard_capacity {
            return;
        }

        let oldest = shard
            .iter()
            .min_by_key(|(_, client)| client.last_seen)
            .map(|(ip, _)| *ip);

        if let Some(ip) = oldest {
            shard.remove(&ip);
            debug!(client_ip = %ip, "Evicted least recently seen client from rate limit table");
        }
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub total_checked: u64,
    pub total_rejected: u64,
    pub tracked_clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window,
            max_requests,
            ..Default::default()
        })
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_admits_up_to_max_then_rejects() {
        let limiter = limiter(100, Duration::from_secs(900));
        let client = ip("10.0.0.1");
        let now = Instant::now();

        for i in 0..100 {
            let admission = limiter.check_at(client, now);
            assert_eq!(admission, Admission::Allowed { remaining: 99 - i });
        }

        assert!(!limiter.check_at(client, now).is_allowed());
        // Another client is unaffected
        assert!(limiter.check_at(ip("10.0.0.2"), now).is_allowed());
    }

    #[test]
    fn test_sliding_recovery() {
        let window = Duration::from_secs(900);
        let limiter = limiter(3, window);
        let client = ip("10.0.0.1");
        let start = Instant::now();

        assert!(limiter.check_at(client, start).is_allowed());
        assert!(limiter.check_at(client, start + Duration::from_secs(100)).is_allowed());
        assert!(limiter.check_at(client, start + Duration::from_secs(200)).is_allowed());

        let rejected = limiter.check_at(client, start + Duration::from_secs(300));
        assert_eq!(
            rejected,
            Admission::Rejected {
                retry_after: Duration::from_secs(600)
            }
        );

        // Only the first request has aged out
        assert!(limiter.check_at(client, start + window).is_allowed());
        assert!(!limiter.check_at(client, start + window).is_allowed());

        // The second ages out 100s later
        assert!(limiter
            .check_at(client, start + window + Duration::from_secs(100))
            .is_allowed());
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let window = Duration::from_secs(60);
        let limiter = limiter(1, window);
        let client = ip("192.168.1.10");
        let start = Instant::now();

        assert!(limiter.check_at(client, start).is_allowed());
        for s in 1..60 {
            assert!(!limiter.check_at(client, start + Duration::from_secs(s)).is_allowed());
        }
        // Rejected attempts did not extend the window
        assert!(limiter.check_at(client, start + window).is_allowed());
    }

    #[test]
    fn test_rate_limiter_disabled() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            max_requests: 1,
            ..Default::default()
        });
        let client = ip("127.0.0.1");

        for _ in 0..100 {
            assert!(limiter.check(client).is_allowed());
        }
        assert_eq!(limiter.stats().tracked_clients, 0);
    }

    #[test]
    fn test_cleanup_removes_idle_clients() {
        let window = Duration::from_secs(60);
        let limiter = limiter(10, window);
        let start = Instant::now();

        limiter.check_at(ip("10.0.0.1"), start);
        limiter.check_at(ip("10.0.0.2"), start + Duration::from_secs(30));
        assert_eq!(limiter.stats().tracked_clients, 2);

        assert_eq!(limiter.cleanup_at(start + window), 1);
        assert_eq!(limiter.stats().tracked_clients, 1);

        assert_eq!(limiter.cleanup_at(start + window + Duration::from_secs(30)), 1);
        assert_eq!(limiter.stats().tracked_clients, 0);
    }

    #[test]
    fn test_table_is_bounded() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 2,
            max_tracked_clients: 1,
            ..Default::default()
        });
        let start = Instant::now();
        let first = ip("10.0.0.1");

        assert!(limiter.check_at(first, start).is_allowed());
        assert!(limiter.check_at(first, start).is_allowed());
        assert!(!limiter.check_at(first, start).is_allowed());

        // A new client evicts the least recently seen one
        let later = start + Duration::from_secs(1);
        assert!(limiter.check_at(ip("10.0.0.2"), later).is_allowed());
        assert_eq!(limiter.stats().tracked_clients, 1);

        // The evicted client starts over
        assert!(limiter.check_at(first, later).is_allowed());
    }

    #[test]
    fn test_stats() {
        let limiter = limiter(1, Duration::from_secs(60));
        let now = Instant::now();

        limiter.check_at(ip("10.0.0.1"), now);
        limiter.check_at(ip("10.0.0.1"), now);
        limiter.check_at(ip("10.0.0.2"), now);

        assert_eq!(
            limiter.stats(),
            RateLimiterStats {
                total_checked: 3,
                total_rejected: 1,
                tracked_clients: 2,
            }
        );
    }

    #[test]
    fn test_client_ip_resolution() {
        let limiter = RateLimiter::new(RateLimitConfig {
            trusted_proxies: vec!["10.0.0.0/8".parse().unwrap()],
            ..Default::default()
        });

        // Untrusted peers cannot spoof their address
        assert_eq!(
            limiter.client_ip(ip("203.0.113.5"), Some("1.2.3.4")),
            ip("203.0.113.5")
        );
        assert_eq!(
            limiter.client_ip(ip("10.1.2.3"), Some("198.51.100.7")),
            ip("198.51.100.7")
        );
        // Trusted hops on the right are skipped
        assert_eq!(
            limiter.client_ip(ip("10.1.2.3"), Some("198.51.100.7, 10.4.5.6")),
            ip("198.51.100.7")
        );
        assert_eq!(limiter.client_ip(ip("10.1.2.3"), None), ip("10.1.2.3"));
        assert_eq!(
            limiter.client_ip(ip("10.1.2.3"), Some("garbage")),
            ip("10.1.2.3")
        );
        assert_eq!(
            limiter.client_ip(ip("10.1.2.3"), Some("198.51.100.7, garbage, 10.4.5.6")),
            ip("10.4.5.6")
        );
    }

    #[test]
    fn test_forged_forwarded_prefix_is_ignored() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            trusted_proxies: vec!["172.16.0.0/12".parse().unwrap()],
            ..Default::default()
        });
        let proxy = ip("172.16.0.5");
        let now = Instant::now();

        let admitted = (0..5)
            .filter(|i| {
                let header = format!("9.9.9.{}, 198.51.100.1", i);
                let client = limiter.client_ip(proxy, Some(header.as_str()));
                assert_eq!(client, ip("198.51.100.1"));
                limiter.check_at(client, now).is_allowed()
            })
            .count();

        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_max() {
        let limiter = Arc::new(limiter(50, Duration::from_secs(900)));
        let client = ip("10.0.0.1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.check(client).is_allowed()).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            cleanup_interval: Duration::from_millis(10),
            ..Default::default()
        }));
        let (tx, rx) = broadcast::channel(1);

        let handle = limiter.clone().start_cleanup_task(rx);
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
