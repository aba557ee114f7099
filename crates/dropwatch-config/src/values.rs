// SPDX-FileCopyrightText: 2026 Dropwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small string-encoded config values: delay ranges and proxy descriptors.

use std::fmt;

use dropwatch_core::BrowserProxy;
use rand::Rng;

/// A pre-open delay: fixed, or an inclusive random range in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelaySpec {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelaySpec {
    /// Parses `N` or `A-B`; reversed bounds are swapped, empty means zero.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let s = raw.trim();
        if s.is_empty() {
            return Ok(Self { min_ms: 0, max_ms: 0 });
        }
        let parse_ms = |part: &str| {
            let part = part.trim();
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            part.parse::<u64>().ok()
        };
        if let Some(n) = parse_ms(s) {
            return Ok(Self { min_ms: n, max_ms: n });
        }
        if let Some((a, b)) = s.split_once('-')
            && let (Some(a), Some(b)) = (parse_ms(a), parse_ms(b))
        {
            return Ok(Self {
                min_ms: a.min(b),
                max_ms: a.max(b),
            });
        }
        Err(format!(
            "delay `{s}` must be milliseconds like 5000 or a range like 3000-8000"
        ))
    }

    /// Picks a delay in `[min_ms, max_ms]`.
    pub fn choose(&self) -> u64 {
        self.choose_with(&mut rand::thread_rng())
    }

    pub fn choose_with<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.min_ms == self.max_ms {
            self.min_ms
        } else {
            rng.gen_range(self.min_ms..=self.max_ms)
        }
    }
}

impl fmt::Display for DelaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min_ms == self.max_ms {
            write!(f, "{}", self.min_ms)
        } else {
            write!(f, "{}-{}", self.min_ms, self.max_ms)
        }
    }
}

/// An HTTP proxy in `host:port[:user:pass]` form.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxySpec {
    /// Parses a proxy string. Blank values and `-`/`none`/`null` mean no proxy.
    ///
    /// The password keeps any further `:` characters.
    pub fn parse(raw: &str) -> Result<Option<Self>, String> {
        let s = raw.trim();
        if s.is_empty() || matches!(s.to_ascii_lowercase().as_str(), "-" | "none" | "null") {
            return Ok(None);
        }
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 2 {
            return Err(format!("proxy `{}` must be host:port[:user:pass]", mask(s)));
        }
        let host = parts[0].trim();
        let port = parts[1]
            .trim()
            .parse::<u16>()
            .map_err(|_| format!("proxy `{}` has an invalid port", mask(s)))?;
        if host.is_empty() {
            return Err(format!("proxy `{}` has an empty host", mask(s)));
        }
        let (username, password) = if parts.len() >= 4 {
            let user = parts[2].trim();
            let pass = parts[3..].join(":");
            let pass = pass.trim();
            (
                (!user.is_empty()).then(|| user.to_string()),
                (!pass.is_empty()).then(|| pass.to_string()),
            )
        } else {
            (None, None)
        };
        Ok(Some(Self {
            host: host.to_string(),
            port,
            username,
            password,
        }))
    }

    /// `http://host:port`
    pub fn server(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Masked form for status rows: `host:port` plus `:user:***` when authenticated.
    pub fn display_masked(&self) -> String {
        match &self.username {
            Some(user) => format!("{}:{}:{}:***", self.host, self.port, user),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn to_browser_proxy(&self) -> BrowserProxy {
        BrowserProxy {
            server: self.server(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for ProxySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

fn mask(raw: &str) -> String {
    let parts: Vec<&str> = raw.splitn(4, ':').collect();
    if parts.len() == 4 {
        format!("{}:{}:{}:***", parts[0], parts[1], parts[2])
    } else {
        raw.to_string()
    }
}
