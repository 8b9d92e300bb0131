//! Anti-replay and anti-flood ledger.
//!
//! Tracks recently seen nonces, client fingerprints and per-signature
//! request counters in a time-bounded, in-process store. The defense is
//! heuristic and window-based: slow replays pass, in exchange for not
//! requiring every caller to coordinate nonce issuance. State is volatile
//! by design; a restart resets every in-flight replay/flood window.
//!
//! Storage sits behind [`LedgerBackend`] so the in-memory maps can be
//! swapped for a distributed cache without touching the policy logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Nonce validity window.
pub const DEFAULT_NONCE_TTL_MS: u64 = 5000;

/// Fingerprints older than this are considered stale and regenerated.
pub const FINGERPRINT_TTL_MS: u64 = 30_000;

/// Two identical requests closer than this count toward flooding.
const FLOOD_WINDOW_MS: u64 = 100;

/// A signature counter resets after this much idle time.
const FLOOD_RESET_MS: u64 = 10_000;

/// Flood counters idle longer than this are swept.
const FLOOD_SWEEP_MS: u64 = 60_000;

/// A single-use proof that a specific request occurred.
#[derive(Debug, Clone)]
pub struct NonceRecord {
    pub created_ms: u64,
    pub ip: Option<String>,
    pub fingerprint: Option<String>,
}

/// Last sighting of a derived client identity.
#[derive(Debug, Clone)]
pub struct FingerprintRecord {
    pub seen_ms: u64,
    pub ip: String,
}

/// Rolling counter for one (client IP, request signature) pair.
#[derive(Debug, Clone)]
pub struct FloodCounter {
    pub last_ms: u64,
    pub count: u64,
}

/// Read-only introspection snapshot for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_nonces: usize,
    pub active_nonces: usize,
    pub total_fingerprints: usize,
    pub blocked_requests: usize,
}

/// Storage interface for the three ledger maps.
///
/// The in-memory implementation below is the default; a distributed cache
/// is an alternative implementation, not a change to the pipeline.
pub trait LedgerBackend: Send + Sync {
    fn nonce_get(&self, nonce: &str) -> Option<NonceRecord>;
    fn nonce_put(&self, nonce: &str, record: NonceRecord);
    fn nonce_delete(&self, nonce: &str);

    fn fingerprint_get(&self, fingerprint: &str) -> Option<FingerprintRecord>;
    fn fingerprint_put(&self, fingerprint: &str, record: FingerprintRecord);

    fn flood_get(&self, key: &str) -> Option<FloodCounter>;
    fn flood_put(&self, key: &str, counter: FloodCounter);

    /// Remove expired nonces, stale fingerprints and idle flood counters.
    /// Returns the number of nonces removed.
    fn sweep(&self, now_ms: u64, nonce_ttl_ms: u64) -> usize;

    /// Snapshot counters for the admin surface.
    fn stats(&self, now_ms: u64, nonce_ttl_ms: u64, flood_threshold: u64) -> LedgerStats;

    /// Emergency flush of all three maps.
    fn clear_all(&self);
}

/// Process-local ledger storage: three mutex-guarded maps.
///
/// Correctness only needs single-process consistency; each operation
/// holds one lock for the duration of a map access, so sweeps never
/// block request-path operations for more than a bounded moment.
#[derive(Default)]
pub struct InMemoryLedger {
    nonces: Mutex<HashMap<String, NonceRecord>>,
    fingerprints: Mutex<HashMap<String, FingerprintRecord>>,
    floods: Mutex<HashMap<String, FloodCounter>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerBackend for InMemoryLedger {
    fn nonce_get(&self, nonce: &str) -> Option<NonceRecord> {
        self.nonces.lock().expect("nonce map poisoned").get(nonce).cloned()
    }

    fn nonce_put(&self, nonce: &str, record: NonceRecord) {
        self.nonces
            .lock()
            .expect("nonce map poisoned")
            .insert(nonce.to_string(), record);
    }

    fn nonce_delete(&self, nonce: &str) {
        self.nonces.lock().expect("nonce map poisoned").remove(nonce);
    }

    fn fingerprint_get(&self, fingerprint: &str) -> Option<FingerprintRecord> {
        self.fingerprints
            .lock()
            .expect("fingerprint map poisoned")
            .get(fingerprint)
            .cloned()
    }

    fn fingerprint_put(&self, fingerprint: &str, record: FingerprintRecord) {
        self.fingerprints
            .lock()
            .expect("fingerprint map poisoned")
            .insert(fingerprint.to_string(), record);
    }

    fn flood_get(&self, key: &str) -> Option<FloodCounter> {
        self.floods.lock().expect("flood map poisoned").get(key).cloned()
    }

    fn flood_put(&self, key: &str, counter: FloodCounter) {
        self.floods
            .lock()
            .expect("flood map poisoned")
            .insert(key.to_string(), counter);
    }

    fn sweep(&self, now_ms: u64, nonce_ttl_ms: u64) -> usize {
        let mut cleared = 0;
        {
            let mut nonces = self.nonces.lock().expect("nonce map poisoned");
            nonces.retain(|_, rec| {
                let expired = now_ms.saturating_sub(rec.created_ms) > nonce_ttl_ms;
                if expired {
                    cleared += 1;
                }
                !expired
            });
        }
        self.fingerprints
            .lock()
            .expect("fingerprint map poisoned")
            .retain(|_, rec| now_ms.saturating_sub(rec.seen_ms) <= FINGERPRINT_TTL_MS);
        self.floods
            .lock()
            .expect("flood map poisoned")
            .retain(|_, c| now_ms.saturating_sub(c.last_ms) <= FLOOD_SWEEP_MS);
        cleared
    }

    fn stats(&self, now_ms: u64, nonce_ttl_ms: u64, flood_threshold: u64) -> LedgerStats {
        let (total_nonces, active_nonces) = {
            let nonces = self.nonces.lock().expect("nonce map poisoned");
            let active = nonces
                .values()
                .filter(|rec| now_ms.saturating_sub(rec.created_ms) <= nonce_ttl_ms)
                .count();
            (nonces.len(), active)
        };

        let total_fingerprints = self
            .fingerprints
            .lock()
            .expect("fingerprint map poisoned")
            .len();

        // Estimate of requests blocked by flood detection: counters that
        // crossed the threshold and were active within the last minute.
        let blocked_requests = self
            .floods
            .lock()
            .expect("flood map poisoned")
            .values()
            .filter(|c| {
                c.count > flood_threshold && now_ms.saturating_sub(c.last_ms) < FLOOD_SWEEP_MS
            })
            .count();

        LedgerStats {
            total_nonces,
            active_nonces,
            total_fingerprints,
            blocked_requests,
        }
    }

    fn clear_all(&self) {
        self.nonces.lock().expect("nonce map poisoned").clear();
        self.fingerprints
            .lock()
            .expect("fingerprint map poisoned")
            .clear();
        self.floods.lock().expect("flood map poisoned").clear();
    }
}

/// Outcome of a replay check, with the reason taxonomy callers log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayCheck {
    pub is_replay: bool,
    pub reason: &'static str,
}

/// Outcome of a flood check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodCheck {
    pub is_flooding: bool,
    pub count: u64,
}

/// Replay/flood policy over a [`LedgerBackend`].
pub struct SecurityLedger {
    backend: Arc<dyn LedgerBackend>,
    nonce_ttl_ms: u64,
    flood_threshold: u64,
}

impl SecurityLedger {
    pub fn new(backend: Arc<dyn LedgerBackend>, nonce_ttl_ms: u64, flood_threshold: u64) -> Self {
        Self {
            backend,
            nonce_ttl_ms,
            flood_threshold,
        }
    }

    /// Issue a cryptographically random hex nonce of the given length.
    pub fn issue_nonce(length: usize) -> String {
        let mut bytes = vec![0u8; length.div_ceil(2)];
        rand::fill(&mut bytes[..]);
        let mut hex = hex::encode(bytes);
        hex.truncate(length);
        hex
    }

    /// Deterministic low-collision client correlator.
    ///
    /// Combines IP, user agent and accept headers into one fast rolling
    /// hash. This is a correlation key, not a security boundary, so
    /// cryptographic strength is not required.
    pub fn fingerprint(
        ip: Option<&str>,
        user_agent: Option<&str>,
        accept: Option<&str>,
        accept_encoding: Option<&str>,
        accept_language: Option<&str>,
    ) -> String {
        let data = [
            ip.unwrap_or("unknown"),
            user_agent.unwrap_or("unknown"),
            accept.unwrap_or("unknown"),
            accept_encoding.unwrap_or("unknown"),
            accept_language.unwrap_or("unknown"),
        ]
        .join("|");

        format!("{:x}", rolling_hash(&data))
    }

    /// Deterministic signature of a request shape, used as the flood
    /// counter key together with the client IP.
    pub fn request_signature(method: &str, path: &str, ip: &str, fingerprint: &str) -> String {
        let data = format!("{method}:{path}:{ip}:{fingerprint}");
        format!("{:x}", rolling_hash(&data))
    }

    /// Check whether presenting `nonce` now constitutes a replay.
    pub fn check_replay(&self, nonce: &str, ip: &str, fingerprint: &str) -> ReplayCheck {
        self.check_replay_at(nonce, ip, fingerprint, now_ms())
    }

    /// Time-explicit replay check.
    ///
    /// First sight records the nonce. An expired record is refreshed and
    /// reusable. An unexpired record presented from a different IP is
    /// treated as an unrelated client reusing a value, and dropped. The
    /// same fingerprint reusing an unexpired nonce is a replay, graded by
    /// how fast the reuse happened.
    pub fn check_replay_at(
        &self,
        nonce: &str,
        ip: &str,
        fingerprint: &str,
        now_ms: u64,
    ) -> ReplayCheck {
        let fresh = NonceRecord {
            created_ms: now_ms,
            ip: Some(ip.to_string()),
            fingerprint: Some(fingerprint.to_string()),
        };

        let Some(entry) = self.backend.nonce_get(nonce) else {
            self.backend.nonce_put(nonce, fresh);
            return ReplayCheck {
                is_replay: false,
                reason: "new",
            };
        };

        let age = now_ms.saturating_sub(entry.created_ms);

        if age > self.nonce_ttl_ms {
            self.backend.nonce_put(nonce, fresh);
            return ReplayCheck {
                is_replay: false,
                reason: "expired-reusable",
            };
        }

        if let Some(recorded_ip) = &entry.ip {
            if recorded_ip != ip {
                // A different legitimate client reusing an unrelated value.
                self.backend.nonce_delete(nonce);
                return ReplayCheck {
                    is_replay: false,
                    reason: "different-client",
                };
            }
        }

        if entry.fingerprint.as_deref() == Some(fingerprint) {
            if age < 1000 {
                return ReplayCheck {
                    is_replay: true,
                    reason: "too-fast",
                };
            }
            if age < 5000 {
                return ReplayCheck {
                    is_replay: true,
                    reason: "suspicious-fast-reuse",
                };
            }
        }

        ReplayCheck {
            is_replay: false,
            reason: "ok",
        }
    }

    /// Check whether this (ip, signature) pair is flooding.
    pub fn check_flood(&self, signature: &str, ip: &str) -> FloodCheck {
        self.check_flood_at(signature, ip, now_ms())
    }

    /// Time-explicit flood check.
    ///
    /// The counter increments on every call, resets after 10s of idle
    /// time, and flags flooding when the previous call was under 100ms
    /// ago and the count exceeds the threshold.
    pub fn check_flood_at(&self, signature: &str, ip: &str, now_ms: u64) -> FloodCheck {
        let key = format!("{ip}:{signature}");
        let previous = self.backend.flood_get(&key);

        let (last_ms, count) = match previous {
            Some(c) if now_ms.saturating_sub(c.last_ms) > FLOOD_RESET_MS => (c.last_ms, 1),
            Some(c) => (c.last_ms, c.count + 1),
            None => (0, 1),
        };

        self.backend.flood_put(
            &key,
            FloodCounter {
                last_ms: now_ms,
                count,
            },
        );

        let is_flooding =
            now_ms.saturating_sub(last_ms) < FLOOD_WINDOW_MS && count > self.flood_threshold;

        FloodCheck { is_flooding, count }
    }

    /// Record a fingerprint sighting; returns true when the client is new
    /// (first sight, or the previous record had gone stale).
    pub fn observe_fingerprint(&self, fingerprint: &str, ip: &str) -> bool {
        self.observe_fingerprint_at(fingerprint, ip, now_ms())
    }

    pub fn observe_fingerprint_at(&self, fingerprint: &str, ip: &str, now_ms: u64) -> bool {
        let is_new = match self.backend.fingerprint_get(fingerprint) {
            None => true,
            Some(rec) => now_ms.saturating_sub(rec.seen_ms) > FINGERPRINT_TTL_MS,
        };

        if is_new {
            self.backend.fingerprint_put(
                fingerprint,
                FingerprintRecord {
                    seen_ms: now_ms,
                    ip: ip.to_string(),
                },
            );
        }

        is_new
    }

    /// Sweep expired records from all three maps. Invoked by the
    /// maintenance task; this component never self-schedules.
    pub fn sweep_expired(&self) -> usize {
        self.backend.sweep(now_ms(), self.nonce_ttl_ms)
    }

    pub fn stats(&self) -> LedgerStats {
        self.backend
            .stats(now_ms(), self.nonce_ttl_ms, self.flood_threshold)
    }

    /// Emergency flush for operator-triggered incident response.
    pub fn clear_all(&self) {
        self.backend.clear_all();
    }
}

/// Fast non-cryptographic rolling hash (31-style multiply-shift).
fn rolling_hash(data: &str) -> u32 {
    let mut hash: i32 = 0;
    for c in data.chars() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(c as i32);
    }
    hash as u32
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> SecurityLedger {
        SecurityLedger::new(Arc::new(InMemoryLedger::new()), DEFAULT_NONCE_TTL_MS, 10)
    }

    #[test]
    fn issued_nonces_have_requested_length_and_vary() {
        let a = SecurityLedger::issue_nonce(32);
        let b = SecurityLedger::issue_nonce(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = SecurityLedger::fingerprint(Some("1.2.3.4"), Some("ua"), None, None, None);
        let b = SecurityLedger::fingerprint(Some("1.2.3.4"), Some("ua"), None, None, None);
        let c = SecurityLedger::fingerprint(Some("5.6.7.8"), Some("ua"), None, None, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn immediate_reuse_by_same_client_is_too_fast() {
        let l = ledger();
        let first = l.check_replay_at("n1", "1.2.3.4", "fp", 1_000_000);
        assert!(!first.is_replay);
        assert_eq!(first.reason, "new");

        let second = l.check_replay_at("n1", "1.2.3.4", "fp", 1_000_500);
        assert!(second.is_replay);
        assert_eq!(second.reason, "too-fast");
    }

    #[test]
    fn reuse_between_one_and_five_seconds_is_suspicious() {
        let l = ledger();
        l.check_replay_at("n1", "1.2.3.4", "fp", 1_000_000);
        let check = l.check_replay_at("n1", "1.2.3.4", "fp", 1_002_000);
        assert!(check.is_replay);
        assert_eq!(check.reason, "suspicious-fast-reuse");
    }

    #[test]
    fn reuse_after_ttl_is_allowed() {
        let l = ledger();
        l.check_replay_at("n1", "1.2.3.4", "fp", 1_000_000);
        let check = l.check_replay_at("n1", "1.2.3.4", "fp", 1_006_000);
        assert!(!check.is_replay);
        assert_eq!(check.reason, "expired-reusable");
    }

    #[test]
    fn different_ip_drops_the_stale_record() {
        let l = ledger();
        l.check_replay_at("n1", "1.2.3.4", "fp", 1_000_000);
        let check = l.check_replay_at("n1", "9.9.9.9", "fp", 1_000_100);
        assert!(!check.is_replay);
        assert_eq!(check.reason, "different-client");

        // Record was dropped, so the nonce reads as new again.
        let again = l.check_replay_at("n1", "9.9.9.9", "fp", 1_000_200);
        assert_eq!(again.reason, "new");
    }

    #[test]
    fn flood_triggers_past_threshold_under_100ms_spacing() {
        let l = ledger();
        let mut now = 1_000_000;
        let mut last = FloodCheck {
            is_flooding: false,
            count: 0,
        };
        for _ in 0..11 {
            last = l.check_flood_at("sig", "1.2.3.4", now);
            now += 50;
        }
        assert_eq!(last.count, 11);
        assert!(last.is_flooding);
    }

    #[test]
    fn flood_counter_resets_after_ten_seconds_idle() {
        let l = ledger();
        let mut now = 1_000_000;
        for _ in 0..11 {
            l.check_flood_at("sig", "1.2.3.4", now);
            now += 50;
        }
        let after_idle = l.check_flood_at("sig", "1.2.3.4", now + 11_000);
        assert!(!after_idle.is_flooding);
        assert_eq!(after_idle.count, 1);
    }

    #[test]
    fn slow_spacing_never_floods() {
        let l = ledger();
        let mut now = 1_000_000;
        let mut last = FloodCheck {
            is_flooding: false,
            count: 0,
        };
        for _ in 0..20 {
            last = l.check_flood_at("sig", "1.2.3.4", now);
            now += 500;
        }
        assert!(!last.is_flooding);
    }

    #[test]
    fn sweep_removes_expired_nonces_only() {
        let l = ledger();
        l.check_replay_at("old", "1.2.3.4", "fp", 1_000_000);
        l.check_replay_at("fresh", "1.2.3.4", "fp", 1_004_000);
        let cleared = l.backend.sweep(1_006_000, DEFAULT_NONCE_TTL_MS);
        assert_eq!(cleared, 1);
    }

    #[test]
    fn stats_count_active_nonces() {
        let l = ledger();
        l.check_replay_at("a", "1.2.3.4", "fp", 1_000_000);
        l.check_replay_at("b", "1.2.3.4", "fp", 1_000_100);
        let stats = l.backend.stats(1_000_200, DEFAULT_NONCE_TTL_MS, 10);
        assert_eq!(stats.total_nonces, 2);
        assert_eq!(stats.active_nonces, 2);
    }

    #[test]
    fn observe_fingerprint_regenerates_after_ttl() {
        let l = ledger();
        assert!(l.observe_fingerprint_at("fp", "1.2.3.4", 1_000_000));
        assert!(!l.observe_fingerprint_at("fp", "1.2.3.4", 1_010_000));
        assert!(l.observe_fingerprint_at("fp", "1.2.3.4", 1_040_000));
    }

    #[test]
    fn clear_all_flushes_everything() {
        let l = ledger();
        l.check_replay_at("a", "1.2.3.4", "fp", 1_000_000);
        l.check_flood_at("sig", "1.2.3.4", 1_000_000);
        l.clear_all();
        let stats = l.backend.stats(1_000_100, DEFAULT_NONCE_TTL_MS, 10);
        assert_eq!(stats.total_nonces, 0);
        assert_eq!(stats.blocked_requests, 0);
    }
}
