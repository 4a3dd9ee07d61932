//! Destination classification: decides whether a requested host should be dialed directly or
//! tunneled through the relay.
//!
//! The active snapshot is replaced atomically so in-flight connections keep whichever verdict
//! they captured at accept time; nothing retroactively reclassifies a connection already
//! underway.

use arc_swap::ArcSwap;
use glob::Pattern;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Direct,
    Tunnel,
}

pub struct ClassifierSnapshot {
    tunnel_all: bool,
    restricted_domains: HashSet<String>,
    globs: Vec<Pattern>,
}

impl ClassifierSnapshot {
    pub fn new(tunnel_all: bool, restricted_domains: HashSet<String>, globs: Vec<Pattern>) -> Self {
        Self {
            tunnel_all,
            restricted_domains,
            globs,
        }
    }

    pub fn tunnel_all(&self) -> bool {
        self.tunnel_all
    }

    pub fn restricted_domains(&self) -> &HashSet<String> {
        &self.restricted_domains
    }

    pub fn globs(&self) -> &[Pattern] {
        &self.globs
    }

    /// Classifies a destination host.
    ///
    /// 1. `tunnel-all` short-circuits everything.
    /// 2. Every dot-suffix of `host` is checked against the restricted-domains set.
    /// 3. Every user-supplied glob is checked against the full host.
    /// 4. Otherwise the destination is direct.
    pub fn classify(&self, host: &str) -> Verdict {
        if self.tunnel_all {
            return Verdict::Tunnel;
        }

        let labels: Vec<&str> = host.split('.').collect();
        for start in 0..labels.len() {
            let suffix = labels[start..].join(".");
            if self.restricted_domains.contains(&suffix) {
                return Verdict::Tunnel;
            }
        }

        if self.globs.iter().any(|pattern| pattern.matches(host)) {
            return Verdict::Tunnel;
        }

        Verdict::Direct
    }
}

/// Hot-swappable handle around a [`ClassifierSnapshot`].
#[derive(Clone)]
pub struct Classifier {
    inner: Arc<ArcSwap<ClassifierSnapshot>>,
}

impl Classifier {
    pub fn new(snapshot: ClassifierSnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    /// Captures the snapshot currently in effect. Callers should capture once per accepted
    /// connection and classify against that capture, not re-fetch mid-connection.
    pub fn snapshot(&self) -> Arc<ClassifierSnapshot> {
        self.inner.load_full()
    }

    pub fn replace(&self, snapshot: ClassifierSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}

/// Parses the restricted-domain file: one domain per line, `#` comments, blank lines ignored.
pub fn parse_restricted_domains(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tunnel_all: bool, domains: &[&str], globs: &[&str]) -> ClassifierSnapshot {
        ClassifierSnapshot::new(
            tunnel_all,
            domains.iter().map(|s| (*s).to_owned()).collect(),
            globs.iter().map(|g| Pattern::new(g).unwrap()).collect(),
        )
    }

    #[test]
    fn matches_exact_and_subdomain_by_suffix() {
        let snap = snapshot(false, &["example.com"], &[]);
        assert_eq!(snap.classify("example.com"), Verdict::Tunnel);
        assert_eq!(snap.classify("www.example.com"), Verdict::Tunnel);
        assert_eq!(snap.classify("deep.sub.example.com"), Verdict::Tunnel);
        assert_eq!(snap.classify("notexample.com"), Verdict::Direct);
    }

    #[test]
    fn tunnel_all_overrides_everything() {
        let snap = snapshot(true, &[], &[]);
        assert_eq!(snap.classify("anything.test"), Verdict::Tunnel);
    }

    #[test]
    fn glob_matches_full_host() {
        let snap = snapshot(false, &[], &["*.blocked.net"]);
        assert_eq!(snap.classify("cdn.blocked.net"), Verdict::Tunnel);
        assert_eq!(snap.classify("blocked.net"), Verdict::Direct);
    }

    #[test]
    fn replace_does_not_affect_already_captured_snapshot() {
        let classifier = Classifier::new(snapshot(false, &["example.com"], &[]));
        let captured = classifier.snapshot();

        classifier.replace(snapshot(true, &[], &[]));

        assert_eq!(captured.classify("unrelated.test"), Verdict::Direct);
        assert_eq!(classifier.snapshot().classify("unrelated.test"), Verdict::Tunnel);
    }

    #[test]
    fn parses_restricted_domain_file() {
        let text = "# comment\nexample.com\n\nblocked.net\n";
        let domains = parse_restricted_domains(text);
        assert_eq!(domains.len(), 2);
        assert!(domains.contains("example.com"));
    }
}
