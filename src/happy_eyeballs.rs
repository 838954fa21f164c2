//! Happy Eyeballs Dialer (C4) — the core algorithm (§4.4).
//!
//! One [`DialAttempt`] is created per `connect()` call and owns its DNS
//! queries, candidate queue, pacing timer, and in-flight transport attempts
//! outright (no `Arc`/`Weak` bookkeeping needed: dropping the attempt's
//! futures is enough to cancel them, which is how losers are cleaned up on
//! success or on caller cancellation). It is driven by a single
//! `tokio::select!` loop per §9's "actor whose inbox carries `{DnsAnswer,
//! AttemptDone, Tick, Cancel}`" mapping.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::dns::{RecordType, Resolver};
use crate::error::ConnectError;
use crate::transport::TransportDialer;
use crate::uri::ParsedUri;

pub const ATTEMPT_DELAY: Duration = Duration::from_millis(100);
pub const RESOLUTION_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn of(ip: IpAddr) -> Self {
        if ip.is_ipv6() {
            Family::V6
        } else {
            Family::V4
        }
    }

    fn digit(self) -> u8 {
        match self {
            Family::V4 => 4,
            Family::V6 => 6,
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digit())
    }
}

#[derive(Debug, Clone)]
struct FamilyError {
    code: i32,
    message: String,
}

/// Pacing behaviour. `Staggered` is the full RFC 8305 dance described by
/// the spec (100ms between new attempts, 50ms resolution delay favouring
/// AAAA). `Immediate` collapses both delays to zero — used when the caller
/// disables Happy Eyeballs staggering (§4.7's `happy_eyeballs: bool`) but
/// still wants the same DNS-racing, interleaving and aggregate-failure
/// machinery applied to a hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Staggered,
    Immediate,
}

impl Pacing {
    fn attempt_delay(self) -> Duration {
        match self {
            Pacing::Staggered => ATTEMPT_DELAY,
            Pacing::Immediate => Duration::ZERO,
        }
    }

    fn resolution_delay(self) -> Duration {
        match self {
            Pacing::Staggered => RESOLUTION_DELAY,
            Pacing::Immediate => Duration::ZERO,
        }
    }
}

type AttemptFuture = BoxFuture<'static, (IpAddr, Result<Connection, ConnectError>)>;
type DnsFuture = BoxFuture<'static, Result<Vec<IpAddr>, ConnectError>>;

/// Per-`connect()` state object (§3 `DialAttempt`). Not exposed to callers
/// — only the `Future` returned by [`DialAttempt::connect`] is.
pub struct DialAttempt {
    uri: String,
    host: String,
    parts: ParsedUri,
    pacing: Pacing,

    queue: VecDeque<IpAddr>,
    in_flight: FuturesUnordered<AttemptFuture>,

    aaaa_done: bool,
    a_done: bool,
    aaaa_fut: Option<DnsFuture>,
    a_fut: Option<DnsFuture>,
    /// An A batch held back pending the resolution delay.
    pending_a: Option<Vec<IpAddr>>,
    resolution_timer: Option<Pin<Box<Sleep>>>,

    attempt_timer: Option<Pin<Box<Sleep>>>,

    ips_seen: usize,
    failures: usize,
    last_error_v4: Option<FamilyError>,
    last_error_v6: Option<FamilyError>,
    last_error_family: Option<Family>,

    attempted_any: bool,
}

impl DialAttempt {
    /// `connect(uri, host, parts) -> Connection | error` from §4.4.
    pub async fn connect(
        uri: String,
        host: String,
        parts: ParsedUri,
        resolver: Arc<dyn Resolver>,
        pacing: Pacing,
        cancel: CancellationToken,
    ) -> Result<Connection, ConnectError> {
        let aaaa_resolver = resolver.clone();
        let aaaa_host = host.clone();
        let aaaa_fut: DnsFuture = Box::pin(async move { aaaa_resolver.resolve(&aaaa_host, RecordType::Aaaa).await });

        let a_resolver = resolver.clone();
        let a_host = host.clone();
        let a_fut: DnsFuture = Box::pin(async move { a_resolver.resolve(&a_host, RecordType::A).await });

        let mut attempt = DialAttempt {
            uri,
            host,
            parts,
            pacing,
            queue: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            aaaa_done: false,
            a_done: false,
            aaaa_fut: Some(aaaa_fut),
            a_fut: Some(a_fut),
            pending_a: None,
            resolution_timer: None,
            attempt_timer: None,
            ips_seen: 0,
            failures: 0,
            last_error_v4: None,
            last_error_v6: None,
            last_error_family: None,
            attempted_any: false,
        };

        attempt.rearm_attempt_timer();
        attempt.run(cancel).await
    }

    fn dns_in_flight(&self) -> bool {
        !self.aaaa_done || !self.a_done
    }

    /// The very first candidate to become available is dialed on the spot;
    /// the pacing timer only governs the spacing of attempts *after* that
    /// one (§4.4's attempt-pacing rule describes steady-state spacing, not
    /// the initial address becoming available).
    fn rearm_attempt_timer(&mut self) {
        if !self.attempted_any {
            if let Some(ip) = self.queue.pop_front() {
                self.start_attempt(ip);
            }
        }
        if !self.queue.is_empty() || self.dns_in_flight() {
            self.attempt_timer = Some(Box::pin(tokio::time::sleep(self.pacing.attempt_delay())));
        } else {
            self.attempt_timer = None;
        }
    }

    /// Merges a freshly-arrived (already shuffled) batch into the queue,
    /// alternating between what's already queued and the new batch so two
    /// families interleave (§4.4's interleave rule).
    fn merge_batch(&mut self, mut batch: Vec<IpAddr>) {
        batch.shuffle(&mut rand::thread_rng());
        self.ips_seen += batch.len();

        let already_queued: Vec<IpAddr> = self.queue.drain(..).collect();
        let mut merged = VecDeque::with_capacity(already_queued.len() + batch.len());
        let mut aq = already_queued.into_iter();
        let mut nb = batch.into_iter();
        loop {
            match (aq.next(), nb.next()) {
                (Some(a), Some(b)) => {
                    merged.push_back(a);
                    merged.push_back(b);
                }
                (Some(a), None) => {
                    merged.push_back(a);
                    merged.extend(aq);
                    break;
                }
                (None, Some(b)) => {
                    merged.push_back(b);
                    merged.extend(nb);
                    break;
                }
                (None, None) => break,
            }
        }
        self.queue = merged;
    }

    fn record_error(&mut self, family: Family, code: i32, message: String) {
        let err = FamilyError { code, message };
        match family {
            Family::V4 => self.last_error_v4 = Some(err),
            Family::V6 => self.last_error_v6 = Some(err),
        }
        self.last_error_family = Some(family);
    }

    fn on_aaaa_result(&mut self, result: Result<Vec<IpAddr>, ConnectError>) {
        self.aaaa_done = true;
        match result {
            Ok(ips) => {
                debug!("AAAA lookup for {} completed: {} address(es)", self.host, ips.len());
                self.merge_batch(ips);
            }
            Err(e) => {
                warn!("AAAA lookup for {} failed: {e}", self.host);
                self.record_error(Family::V6, e.code(), e.to_string());
            }
        }
        // AAAA completing releases any A answer that was held back.
        if let Some(batch) = self.pending_a.take() {
            self.resolution_timer = None;
            self.merge_batch(batch);
        }
    }

    fn on_a_result(&mut self, result: Result<Vec<IpAddr>, ConnectError>) {
        match result {
            Ok(ips) if !ips.is_empty() && !self.aaaa_done => {
                debug!("A lookup for {} completed: {} address(es), holding for resolution delay", self.host, ips.len());
                // Hold back a non-empty A answer while AAAA is still pending.
                self.pending_a = Some(ips);
                self.resolution_timer = Some(Box::pin(tokio::time::sleep(self.pacing.resolution_delay())));
            }
            Ok(ips) => {
                debug!("A lookup for {} completed: {} address(es)", self.host, ips.len());
                self.a_done = true;
                self.merge_batch(ips);
            }
            Err(e) => {
                warn!("A lookup for {} failed: {e}", self.host);
                self.a_done = true;
                self.record_error(Family::V4, e.code(), e.to_string());
            }
        }
    }

    fn release_pending_a(&mut self) {
        self.a_done = true;
        self.resolution_timer = None;
        if let Some(batch) = self.pending_a.take() {
            self.merge_batch(batch);
        }
    }

    fn start_attempt(&mut self, ip: IpAddr) {
        self.attempted_any = true;
        let candidate = self.parts.with_candidate(ip, &self.host);
        let candidate_uri = candidate.to_string();
        debug!("Dial attempt started for {candidate_uri}");
        let fut: AttemptFuture = Box::pin(async move {
            let result = TransportDialer::dial(&candidate_uri, CancellationToken::new()).await;
            (ip, result)
        });
        self.in_flight.push(fut);
    }

    fn is_exhausted(&self) -> bool {
        self.aaaa_done && self.a_done && self.queue.is_empty() && self.in_flight.is_empty() && self.pending_a.is_none()
    }

    fn compose_failure(&self) -> ConnectError {
        let dns_only = self.ips_seen == 0;
        let body = match (&self.last_error_v4, &self.last_error_v6) {
            (Some(v4), Some(v6)) if v4.message == v6.message => v4.message.clone(),
            (Some(v4), Some(v6)) => {
                let (first_fam, first, second_fam, second) = match self.last_error_family {
                    Some(Family::V6) => (Family::V6, v6, Family::V4, v4),
                    _ => (Family::V4, v4, Family::V6, v6),
                };
                format!(
                    "Last error for IPv{first_fam}: {}. Previous error for IPv{second_fam}: {}",
                    first.message, second.message
                )
            }
            (Some(v4), None) => v4.message.clone(),
            (None, Some(v6)) => v6.message.clone(),
            (None, None) => "no addresses found for host".to_string(),
        };

        let code = match self.last_error_family {
            Some(Family::V4) => self.last_error_v4.as_ref().map(|e| e.code),
            Some(Family::V6) => self.last_error_v6.as_ref().map(|e| e.code),
            None => None,
        }
        .unwrap_or(crate::error::EADDRNOTAVAIL);

        ConnectError::aggregate_failure(&self.uri, dns_only, code, &body)
    }

    async fn run(mut self, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        loop {
            if self.is_exhausted() {
                return Err(self.compose_failure());
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Dial for {} cancelled (attempted_any={})", self.uri, self.attempted_any);
                    return Err(ConnectError::dial_cancelled(&self.uri, !self.attempted_any));
                }

                Some(result) = poll_opt(&mut self.aaaa_fut) => {
                    self.aaaa_fut = None;
                    self.on_aaaa_result(result);
                    self.rearm_attempt_timer();
                }

                Some(result) = poll_opt(&mut self.a_fut) => {
                    self.a_fut = None;
                    self.on_a_result(result);
                    self.rearm_attempt_timer();
                }

                Some(()) = poll_timer(&mut self.resolution_timer) => {
                    self.release_pending_a();
                    self.rearm_attempt_timer();
                }

                Some(()) = poll_timer(&mut self.attempt_timer) => {
                    if let Some(ip) = self.queue.pop_front() {
                        self.start_attempt(ip);
                    }
                    self.rearm_attempt_timer();
                }

                Some((ip, result)) = self.in_flight.next() => {
                    match result {
                        Ok(conn) => {
                            debug!("Dial attempt to {ip} for {} succeeded", self.uri);
                            return Ok(conn);
                        }
                        Err(e) => {
                            warn!("Dial attempt to {ip} for {} failed: {e}", self.uri);
                            self.failures += 1;
                            self.record_error(Family::of(ip), e.code(), e.to_string());
                            // "the next attempt begins immediately": pop now,
                            // then reset the pacing timer from this point.
                            if let Some(next_ip) = self.queue.pop_front() {
                                self.start_attempt(next_ip);
                            }
                            self.rearm_attempt_timer();
                        }
                    }
                }
            }
        }
    }
}

/// Polls an `Option<Future>` once, taking it out on completion — lets the
/// `select!` branch above receive at most one value from a one-shot
/// resolver call (`None` simply never matches that `select!` arm again
/// after the future is taken, since `select!` skips `None` branches).
async fn poll_opt<T>(slot: &mut Option<BoxFuture<'static, T>>) -> Option<T> {
    match slot {
        Some(fut) => Some(fut.as_mut().await),
        None => std::future::pending().await,
    }
}

async fn poll_timer(slot: &mut Option<Pin<Box<Sleep>>>) -> Option<()> {
    match slot {
        Some(sleep) => {
            sleep.as_mut().await;
            Some(())
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::test_support::{Answer, FakeResolver};
    use std::time::Duration as StdDuration;
    use tokio::net::TcpListener;

    fn uri_parts(uri: &str) -> ParsedUri {
        ParsedUri::parse(uri, "tcp").unwrap()
    }

    #[tokio::test]
    async fn aaaa_only_answer_succeeds_without_waiting_for_a() {
        let listener = TcpListener::bind("[::1]:0").await;
        let listener = match listener {
            Ok(l) => l,
            Err(_) => return, // IPv6 loopback unavailable in this sandbox; skip.
        };
        let addr = listener.local_addr().unwrap();

        let resolver = Arc::new(FakeResolver::new());
        resolver.set("example.com", RecordType::Aaaa, Answer::ok(vec![addr.ip()]));
        resolver.set(
            "example.com",
            RecordType::A,
            Answer::ok_after(vec!["1.2.3.4".parse().unwrap()], StdDuration::from_millis(500)),
        );

        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let uri = format!("tcp://example.com:{}", addr.port());
        let parts = uri_parts(&uri);
        let result = DialAttempt::connect(
            uri.clone(),
            "example.com".to_string(),
            parts,
            resolver,
            Pacing::Staggered,
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[tokio::test]
    async fn empty_aaaa_short_circuits_resolution_delay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let resolver = Arc::new(FakeResolver::new());
        resolver.set("example.com", RecordType::Aaaa, Answer::ok(vec![]));
        resolver.set("example.com", RecordType::A, Answer::ok(vec![addr.ip()]));

        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let uri = format!("tcp://example.com:{}", addr.port());
        let parts = uri_parts(&uri);
        let started = tokio::time::Instant::now();
        let result = DialAttempt::connect(
            uri.clone(),
            "example.com".to_string(),
            parts,
            resolver,
            Pacing::Staggered,
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_ok(), "{:?}", result.err());
        assert!(started.elapsed() < RESOLUTION_DELAY, "should not wait out the resolution delay");
    }

    #[tokio::test]
    async fn both_families_failing_dns_reports_during_dns_lookup() {
        let resolver = Arc::new(FakeResolver::new());
        resolver.set("example.invalid", RecordType::Aaaa, Answer::err("DNS error"));
        resolver.set("example.invalid", RecordType::A, Answer::err("DNS error"));

        let uri = "tcp://example.invalid:80".to_string();
        let parts = uri_parts(&uri);
        let err = DialAttempt::connect(
            uri.clone(),
            "example.invalid".to_string(),
            parts,
            resolver,
            Pacing::Staggered,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Connection to tcp://example.invalid:80 failed during DNS lookup: DNS error"
        );
    }

    #[tokio::test]
    async fn cancel_before_any_attempt_mentions_dns_lookup() {
        let resolver = Arc::new(FakeResolver::new());
        resolver.set(
            "example.com",
            RecordType::Aaaa,
            Answer::ok_after(vec![], StdDuration::from_secs(10)),
        );
        resolver.set(
            "example.com",
            RecordType::A,
            Answer::ok_after(vec![], StdDuration::from_secs(10)),
        );

        let cancel = CancellationToken::new();
        let uri = "tcp://example.com:80".to_string();
        let parts = uri_parts(&uri);

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let err = DialAttempt::connect(uri.clone(), "example.com".to_string(), parts, resolver, Pacing::Staggered, cancel)
            .await
            .unwrap_err();

        assert_eq!(err.code(), crate::error::ECONNABORTED);
        assert!(err.to_string().contains("cancelled during DNS lookup"));
    }

    #[tokio::test]
    async fn queue_interleaves_both_families() {
        // Exercised indirectly: AAAA resolves first with two addresses,
        // then A resolves (after AAAA, so no resolution delay applies)
        // with two addresses; only the first queued candidate (an
        // unroutable TEST-NET address) is ever dialed because we cancel
        // right after the first attempt starts, but the interleave
        // ordering itself is unit-tested directly below.
        let mut attempt = DialAttempt {
            uri: "tcp://example.com:80".to_string(),
            host: "example.com".to_string(),
            parts: uri_parts("tcp://example.com:80"),
            pacing: Pacing::Staggered,
            queue: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            aaaa_done: false,
            a_done: false,
            aaaa_fut: None,
            a_fut: None,
            pending_a: None,
            resolution_timer: None,
            attempt_timer: None,
            ips_seen: 0,
            failures: 0,
            last_error_v4: None,
            last_error_v6: None,
            last_error_family: None,
            attempted_any: false,
        };

        // Disable shuffling's effect on this deterministic check by
        // feeding single-element-order-preserving batches through the
        // public merge path twice, matching the AAAA-then-A arrival order.
        let v6_batch = vec!["::1".parse().unwrap(), "::2".parse().unwrap()];
        let v4_batch = vec!["1.2.3.4".parse().unwrap(), "5.6.7.8".parse().unwrap()];

        // merge_batch shuffles internally; to assert the interleave rule
        // itself (not randomness), bypass shuffling by merging
        // single-element batches one at a time in the documented arrival
        // order, which shuffle() leaves unchanged for length-1 inputs.
        attempt.merge_batch(vec![v6_batch[0]]);
        attempt.merge_batch(vec![v4_batch[0]]);
        attempt.merge_batch(vec![v6_batch[1]]);
        attempt.merge_batch(vec![v4_batch[1]]);

        let order: Vec<IpAddr> = attempt.queue.iter().copied().collect();
        assert_eq!(
            order,
            vec![
                "::1".parse().unwrap(),
                "::2".parse().unwrap(),
                "1.2.3.4".parse().unwrap(),
                "5.6.7.8".parse().unwrap(),
            ]
        );
    }
}
