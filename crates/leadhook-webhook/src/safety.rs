//! Outbound URL safety (SSRF guard).
//!
//! [`check_url`] is the static check run at registration and before every
//! attempt. [`UrlGuard::check_resolved`] adds a DNS lookup so that a public
//! hostname resolving to a private address is rejected at send time.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::{fmt, io};

use ipnet::{Ipv4Net, Ipv6Net};
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};
use url::{Host, Url};

use crate::TRACING_TARGET_SAFETY;

/// IPv4 ranges that webhooks may never target.
const PRIVATE_V4: [Ipv4Net; 6] = [
    Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(172, 16, 0, 0), 12),
    Ipv4Net::new_assert(Ipv4Addr::new(127, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(0, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(169, 254, 0, 0), 16),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 0, 0), 16),
];

/// IPv6 ranges that webhooks may never target.
const PRIVATE_V6: [Ipv6Net; 2] = [
    // unique local
    Ipv6Net::new_assert(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
    // link local
    Ipv6Net::new_assert(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
];

/// Returns whether the address is private, loopback or otherwise reserved.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => PRIVATE_V4.iter().any(|net| net.contains(&v4)),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || PRIVATE_V6.iter().any(|net| net.contains(&v6))
        }
    }
}

/// Returns whether the hostname names the local machine.
fn is_localhost(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == "localhost" || domain.ends_with(".localhost")
}

/// Result of a URL safety check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct UrlVerdict {
    /// Whether the URL may be called.
    pub valid: bool,
    /// Why the URL was rejected.
    pub reason: Option<String>,
}

impl UrlVerdict {
    /// An accepting verdict.
    pub fn allow() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    /// A rejecting verdict with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    /// Returns the rejection reason, or a generic one.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("URL rejected")
    }
}

/// What to do when resolving the endpoint host fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsFailurePolicy {
    /// Allow the attempt; the HTTP client reports the DNS error itself.
    #[default]
    FailOpen,
    /// Reject the attempt as unsafe.
    FailClosed,
}

/// Controls which targets the guard accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPolicy {
    /// Permits `http` and private hosts. Development and tests only.
    pub allow_insecure_targets: bool,
    /// Behaviour on DNS lookup failure.
    pub dns_failure: DnsFailurePolicy,
}

impl UrlPolicy {
    /// The production policy.
    pub fn strict() -> Self {
        Self::default()
    }

    /// A policy that accepts local plain-HTTP receivers.
    pub fn insecure() -> Self {
        Self {
            allow_insecure_targets: true,
            ..Self::default()
        }
    }

    /// Sets the DNS failure policy.
    pub fn with_dns_failure(mut self, dns_failure: DnsFailurePolicy) -> Self {
        self.dns_failure = dns_failure;
        self
    }
}

/// Statically checks a webhook URL: `https` only, no private hosts.
pub fn check_url(url: &str) -> UrlVerdict {
    match Url::parse(url) {
        Ok(parsed) => check_parsed(&parsed, UrlPolicy::strict()),
        Err(_) => UrlVerdict::reject("invalid URL"),
    }
}

fn check_parsed(url: &Url, policy: UrlPolicy) -> UrlVerdict {
    let scheme = url.scheme();
    let scheme_ok = scheme == "https" || (policy.allow_insecure_targets && scheme == "http");
    if !scheme_ok {
        return UrlVerdict::reject("only https URLs are allowed");
    }

    let Some(host) = url.host() else {
        return UrlVerdict::reject("URL must have a host");
    };
    if policy.allow_insecure_targets {
        return UrlVerdict::allow();
    }

    let private = match host {
        Host::Domain(domain) => is_localhost(domain),
        Host::Ipv4(v4) => is_private_ip(IpAddr::V4(v4)),
        Host::Ipv6(v6) => is_private_ip(IpAddr::V6(v6)),
    };

    if private {
        UrlVerdict::reject("private or reserved address")
    } else {
        UrlVerdict::allow()
    }
}

/// Resolves hostnames to addresses.
#[async_trait::async_trait]
pub trait DnsResolver: Send + Sync {
    /// Returns every address `host` resolves to.
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system via [`tokio::net::lookup_host`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait::async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// URL guard combining the static check with a DNS re-check.
#[derive(Clone)]
pub struct UrlGuard {
    policy: UrlPolicy,
    resolver: Arc<dyn DnsResolver>,
}

impl fmt::Debug for UrlGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlGuard")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for UrlGuard {
    fn default() -> Self {
        Self::new(UrlPolicy::default())
    }
}

impl UrlGuard {
    /// Creates a guard using the system resolver.
    pub fn new(policy: UrlPolicy) -> Self {
        Self::with_resolver(policy, Arc::new(SystemResolver))
    }

    /// Creates a guard with a custom resolver.
    pub fn with_resolver(policy: UrlPolicy, resolver: Arc<dyn DnsResolver>) -> Self {
        if policy.allow_insecure_targets {
            tracing::warn!(
                target: TRACING_TARGET_SAFETY,
                "Insecure webhook targets are allowed, do not use this in production"
            );
        }
        Self { policy, resolver }
    }

    /// Returns the active policy.
    pub fn policy(&self) -> UrlPolicy {
        self.policy
    }

    /// Runs the static check under this guard's policy.
    pub fn check(&self, url: &str) -> UrlVerdict {
        match Url::parse(url) {
            Ok(parsed) => check_parsed(&parsed, self.policy),
            Err(_) => UrlVerdict::reject("invalid URL"),
        }
    }

    /// Runs the static check and then verifies every resolved address.
    pub async fn check_resolved(&self, url: &str) -> UrlVerdict {
        self.resolve_and_check(url, None).await
    }

    /// Like [`check_resolved`](Self::check_resolved), but a lookup still
    /// running at `deadline` counts as a DNS failure.
    pub async fn check_resolved_until(&self, url: &str, deadline: Instant) -> UrlVerdict {
        self.resolve_and_check(url, Some(deadline)).await
    }

    async fn resolve_and_check(&self, url: &str, deadline: Option<Instant>) -> UrlVerdict {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return UrlVerdict::reject("invalid URL"),
        };

        let verdict = check_parsed(&parsed, self.policy);
        if !verdict.valid || self.policy.allow_insecure_targets {
            return verdict;
        }

        // IP literals were fully checked above.
        let Some(Host::Domain(domain)) = parsed.host() else {
            return verdict;
        };
        let port = parsed.port_or_known_default().unwrap_or(443);

        let lookup = self.resolver.resolve(domain, port);
        let resolved = match deadline {
            Some(deadline) => timeout_at(deadline, lookup).await.unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::TimedOut, "lookup timed out"))
            }),
            None => lookup.await,
        };

        match resolved {
            Ok(addrs) => {
                if let Some(ip) = addrs.into_iter().find(|ip| is_private_ip(*ip)) {
                    tracing::warn!(
                        target: TRACING_TARGET_SAFETY,
                        host = %domain,
                        resolved = %ip,
                        "Webhook host resolves to a private address"
                    );
                    return UrlVerdict::reject("host resolves to a private address");
                }
                verdict
            }
            Err(err) => {
                tracing::debug!(
                    target: TRACING_TARGET_SAFETY,
                    host = %domain,
                    error = %err,
                    policy = ?self.policy.dns_failure,
                    "Webhook host lookup failed"
                );
                match self.policy.dns_failure {
                    DnsFailurePolicy::FailOpen => verdict,
                    DnsFailurePolicy::FailClosed => {
                        UrlVerdict::reject(format!("DNS lookup failed: {err}"))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::test_support::HangingResolver;

    #[test]
    fn static_check_table() {
        let cases = [
            ("https://hooks.example.com/lead", true),
            ("https://93.184.216.34/hook", true),
            ("https://[2606:2800:220:1::1]/", true),
            ("http://hooks.example.com/lead", false),
            ("ftp://hooks.example.com/", false),
            ("not a url", false),
            ("https://localhost/hook", false),
            ("https://LOCALHOST:8443/", false),
            ("https://api.localhost/", false),
            ("https://10.1.2.3/", false),
            ("https://172.15.0.1/x", true),
            ("https://172.16.0.1/x", false),
            ("https://172.31.255.255/x", false),
            ("https://172.32.0.1/", true),
            ("https://8.8.8.8/x", true),
            ("https://127.0.0.1/", false),
            ("https://0.0.0.0/", false),
            ("https://169.254.169.254/latest/meta-data", false),
            ("https://192.168.1.1/", false),
            ("https://[::1]/", false),
            ("https://[::]/", false),
            ("https://[fc00::1]/", false),
            ("https://[fd12:3456::1]/", false),
            ("https://[fe80::1]/", false),
            ("https://[::ffff:127.0.0.1]/", false),
            ("https://[::ffff:10.0.0.1]/", false),
        ];

        for (url, valid) in cases {
            let verdict = check_url(url);
            assert_eq!(verdict.valid, valid, "{url}: {:?}", verdict.reason);
            assert_eq!(verdict.reason.is_none(), valid, "{url}");
        }
    }

    #[test]
    fn scheme_reason_is_reported() {
        let verdict = check_url("http://hooks.example.com/");
        assert_eq!(verdict.reason(), "only https URLs are allowed");
    }

    #[test]
    fn insecure_policy_allows_local_http() {
        let guard = UrlGuard::new(UrlPolicy::insecure());
        assert!(guard.check("http://127.0.0.1:8080/hook").valid);
        assert!(!guard.check("ftp://127.0.0.1/").valid);
    }

    struct FakeResolver(HashMap<&'static str, Vec<IpAddr>>);

    #[async_trait::async_trait]
    impl DnsResolver for FakeResolver {
        async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
            self.0.get(host).cloned().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such host")
            })
        }
    }

    fn guard(policy: UrlPolicy) -> UrlGuard {
        let mut table = HashMap::new();
        table.insert("public.example.com", vec!["93.184.216.34".parse().unwrap()]);
        table.insert(
            "rebind.example.com",
            vec![
                "93.184.216.34".parse().unwrap(),
                "10.0.0.5".parse().unwrap(),
            ],
        );
        UrlGuard::with_resolver(policy, Arc::new(FakeResolver(table)))
    }

    #[tokio::test]
    async fn resolved_private_address_is_rejected() {
        let guard = guard(UrlPolicy::strict());
        assert!(guard.check_resolved("https://public.example.com/").await.valid);

        let verdict = guard.check_resolved("https://rebind.example.com/").await;
        assert!(!verdict.valid);
        assert_eq!(verdict.reason(), "host resolves to a private address");
    }

    #[tokio::test]
    async fn dns_failure_follows_policy() {
        let open = guard(UrlPolicy::strict());
        assert!(open.check_resolved("https://missing.example.com/").await.valid);

        let closed = guard(UrlPolicy::strict().with_dns_failure(DnsFailurePolicy::FailClosed));
        let verdict = closed.check_resolved("https://missing.example.com/").await;
        assert!(!verdict.valid);
        assert!(verdict.reason().starts_with("DNS lookup failed"));
    }

    #[tokio::test]
    async fn slow_lookup_is_cut_at_deadline() {
        let deadline = || Instant::now() + std::time::Duration::from_millis(50);

        let open = UrlGuard::with_resolver(UrlPolicy::strict(), Arc::new(HangingResolver));
        let verdict = open
            .check_resolved_until("https://slow.example.com/", deadline())
            .await;
        assert!(verdict.valid);

        let closed = UrlGuard::with_resolver(
            UrlPolicy::strict().with_dns_failure(DnsFailurePolicy::FailClosed),
            Arc::new(HangingResolver),
        );
        let verdict = closed
            .check_resolved_until("https://slow.example.com/", deadline())
            .await;
        assert!(!verdict.valid);
        assert_eq!(verdict.reason(), "DNS lookup failed: lookup timed out");
    }

    #[tokio::test]
    async fn static_rejection_skips_lookup() {
        let guard = guard(UrlPolicy::strict());
        let verdict = guard.check_resolved("https://localhost/").await;
        assert!(!verdict.valid);
    }
}
