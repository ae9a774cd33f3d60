//! Activation patterns
//!
//! Userscript `@match` semantics:
//! - `<scheme>://<host><path>`
//! - scheme `*` matches http and https
//! - host `*` matches any host, `*.example.com` matches the domain and its
//!   subdomains
//! - path is a glob where `*` matches any run of characters; it is tested
//!   against the URL's path plus query

use url::Url;

use crate::error::{Result, SweeperError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Any,
    Exact(String),
    /// `*.example.com`
    Subdomains(String),
}

/// One parsed match pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern {
    raw: String,
    scheme: Option<String>,
    host: HostPattern,
    path: String,
}

impl MatchPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| SweeperError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = pattern
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme separator"))?;

        let scheme = match scheme {
            "*" => None,
            "http" | "https" => Some(scheme.to_string()),
            _ => return Err(invalid("scheme must be http, https or *")),
        };

        let (host, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => return Err(invalid("missing path")),
        };

        let host = match host {
            "" => return Err(invalid("missing host")),
            "*" => HostPattern::Any,
            h if h.starts_with("*.") => HostPattern::Subdomains(h[2..].to_ascii_lowercase()),
            h if h.contains('*') => return Err(invalid("wildcard only allowed as leading '*.'")),
            h => HostPattern::Exact(h.to_ascii_lowercase()),
        };

        Ok(Self {
            raw: pattern.to_string(),
            scheme,
            host,
            path: path.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, url: &Url) -> bool {
        let scheme_ok = match &self.scheme {
            Some(scheme) => url.scheme() == scheme,
            None => matches!(url.scheme(), "http" | "https"),
        };
        if !scheme_ok {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        let host_ok = match &self.host {
            HostPattern::Any => true,
            HostPattern::Exact(expected) => host == expected,
            HostPattern::Subdomains(domain) => {
                host == domain || host.ends_with(&format!(".{}", domain))
            }
        };
        if !host_ok {
            return false;
        }

        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        glob_match(&self.path, &target)
    }
}

/// `*`-only glob, iterative with single-star backtracking
fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}

/// The set of pages the sweeper runs on
#[derive(Debug, Clone, Default)]
pub struct ActivationPatterns {
    patterns: Vec<MatchPattern>,
}

impl ActivationPatterns {
    pub fn parse<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| MatchPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Unparseable URLs never match
    pub fn matches(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.patterns.iter().any(|p| p.matches(&parsed)),
            Err(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
