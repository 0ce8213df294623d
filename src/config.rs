// Runtime Configuration
// Defaults plus environment overrides, read once at startup.

use std::collections::HashMap;
use std::time::Duration;

use log::warn;
use serde::Serialize;

use crate::ipc::WireFormat;

/// Configuration for one client session
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path of the server's Unix domain socket
    pub socket_path: String,
    /// Page id stamped on every outbound envelope
    pub page_id: String,
    /// Ping interval is half of this
    pub keepalive: Duration,
    /// Production pages hide transport failures and clear on disconnect
    pub production: bool,
    pub format: WireFormat,
    pub visibility_poll: Duration,
    /// Per event type coalescing window
    pub throttle: HashMap<String, Duration>,
    /// z-index of the first overlay mask
    pub overlay_base_z: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            page_id: format!("page-{}", std::process::id()),
            keepalive: Duration::from_secs(30),
            production: false,
            format: WireFormat::Json,
            visibility_poll: Duration::from_secs(1),
            throttle: HashMap::new(),
            overlay_base_z: 1000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup; malformed values keep the default.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = var("UIMIRROR_SOCKET") {
            config.socket_path = path;
        }
        if let Some(pid) = var("UIMIRROR_PAGE_ID") {
            config.page_id = pid;
        }
        if let Some(ms) = var("UIMIRROR_KEEPALIVE_MS").and_then(|v| parse_millis("UIMIRROR_KEEPALIVE_MS", &v)) {
            config.keepalive = ms;
        }
        if let Some(flag) = var("UIMIRROR_PRODUCTION") {
            config.production = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(name) = var("UIMIRROR_FORMAT") {
            match WireFormat::parse(&name) {
                Some(format) => config.format = format,
                None => warn!("[Config] unknown wire format '{name}', using {:?}", config.format),
            }
        }
        if let Some(ms) = var("UIMIRROR_VISIBILITY_POLL_MS")
            .and_then(|v| parse_millis("UIMIRROR_VISIBILITY_POLL_MS", &v))
        {
            config.visibility_poll = ms;
        }
        if let Some(spec) = var("UIMIRROR_THROTTLE") {
            config.throttle = parse_throttle(&spec);
        }
        config
    }
}

pub fn default_socket_path() -> String {
    #[cfg(windows)]
    {
        let mut path = std::env::temp_dir();
        path.push("uimirror.sock");
        path.to_string_lossy().to_string()
    }
    #[cfg(not(windows))]
    {
        "/tmp/uimirror.sock".to_string()
    }
}

fn parse_millis(name: &str, value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!("[Config] ignoring {name}={value}");
            None
        }
    }
}

/// `"statechange=200,input=50"`
fn parse_throttle(spec: &str) -> HashMap<String, Duration> {
    spec.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let (kind, ms) = entry.split_once('=')?;
            let window = parse_millis("UIMIRROR_THROTTLE", ms)?;
            Some((kind.trim().to_string(), window))
        })
        .collect()
}

/// Client facts reported in the `init` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientEnvironment {
    pub viewport: Viewport,
    pub timezone: String,
    pub user_agent: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl ClientEnvironment {
    pub fn detect() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let dimension = |name: &str, default: u32| {
            var(name)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(default)
        };
        let language = var("LANG")
            .and_then(|lang| lang.split(['.', '@']).next().map(|l| l.replace('_', "-")))
            .filter(|lang| !lang.is_empty() && lang != "C" && lang != "POSIX")
            .unwrap_or_else(|| "en".to_string());

        Self {
            viewport: Viewport {
                width: dimension("COLUMNS", 1280),
                height: dimension("LINES", 800),
            },
            timezone: var("TZ").unwrap_or_else(|| "UTC".to_string()),
            user_agent: format!("uimirror/{}", env!("CARGO_PKG_VERSION")),
            language,
        }
    }
}
