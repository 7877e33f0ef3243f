//! Transport and browse settings.
//!
//! Settings arrive loosely typed from a config file (a bool where a mode was
//! expected, a number as a string, ...). [`TransportSettings::resolve`] turns
//! them into a [`TransportConfig`], replacing anything unrecognized with the
//! default and logging a warning instead of failing.

use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_CONNECT_TIMEOUT: u32 = 7;
const DEFAULT_PERSIST: &str = "5m";

/// Control socket path. `%C` is a hash of the connection details, which both
/// escapes special characters and keeps host names out of the file name.
pub const DEFAULT_CONTROL_PATH: &str = "~/.ssh/psh_cm-%C";

/// A setting value as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// `[transport]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// The ssh program to run.
    #[serde(default = "default_program")]
    pub program: String,

    /// Whether to add batch mode, host key, timeout and multiplexing options at all.
    #[serde(default = "default_true")]
    pub use_config_defaults: bool,

    /// `yes`, `no`, `accept-new`, or a bool.
    #[serde(default)]
    pub host_key_checking: Option<RawValue>,

    /// Seconds, or `false` to leave the system TCP timeout in place.
    #[serde(default)]
    pub connect_timeout: Option<RawValue>,

    /// ControlPersist duration (`5m`, `30s`, `300`), or `false` to disable reuse.
    #[serde(default)]
    pub multiplexing: Option<RawValue>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            use_config_defaults: true,
            host_key_checking: None,
            connect_timeout: None,
            multiplexing: None,
        }
    }
}

/// `[browse]` section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseSettings {
    /// Verify a remote file exists before opening it.
    #[serde(default)]
    pub check_path_exists: bool,

    /// Include dotfiles in listings.
    #[serde(default)]
    pub show_hidden: bool,
}

fn default_program() -> String {
    "ssh".to_string()
}

fn default_true() -> bool {
    true
}

/// `StrictHostKeyChecking` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyChecking {
    Yes,
    No,
    AcceptNew,
}

impl HostKeyChecking {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostKeyChecking::Yes => "yes",
            HostKeyChecking::No => "no",
            HostKeyChecking::AcceptNew => "accept-new",
        }
    }
}

/// Whether to reuse an authenticated connection through a control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionReuse {
    Disabled,
    /// Keep the master alive for this ControlPersist duration.
    Persist(String),
}

/// Fully resolved transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub program: String,
    pub use_config_defaults: bool,
    /// `None` leaves ssh's own default in place.
    pub host_key_checking: Option<HostKeyChecking>,
    /// `None` leaves the system TCP timeout in place.
    pub connect_timeout: Option<u32>,
    pub reuse: ConnectionReuse,
    pub control_path: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportSettings::default().resolve()
    }
}

impl TransportConfig {
    /// Whether connection-reuse arguments will actually be passed to ssh.
    pub fn reuse_enabled(&self) -> bool {
        self.use_config_defaults && matches!(self.reuse, ConnectionReuse::Persist(_))
    }
}

impl TransportSettings {
    /// Resolve loosely typed settings, falling back to defaults with a warning.
    pub fn resolve(&self) -> TransportConfig {
        TransportConfig {
            program: self.program.clone(),
            use_config_defaults: self.use_config_defaults,
            host_key_checking: resolve_host_key_checking(self.host_key_checking.as_ref()),
            connect_timeout: resolve_connect_timeout(self.connect_timeout.as_ref()),
            reuse: resolve_reuse(self.multiplexing.as_ref(), cfg!(windows)),
            control_path: DEFAULT_CONTROL_PATH.to_string(),
        }
    }
}

fn resolve_host_key_checking(value: Option<&RawValue>) -> Option<HostKeyChecking> {
    match value? {
        RawValue::Bool(true) => Some(HostKeyChecking::Yes),
        RawValue::Bool(false) => Some(HostKeyChecking::No),
        RawValue::Text(s) if s == "yes" => Some(HostKeyChecking::Yes),
        RawValue::Text(s) if s == "no" => Some(HostKeyChecking::No),
        RawValue::Text(s) if s == "accept-new" => Some(HostKeyChecking::AcceptNew),
        other => {
            warn!(value = ?other, "unrecognized host_key_checking setting, falling back to default");
            None
        }
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn resolve_connect_timeout(value: Option<&RawValue>) -> Option<u32> {
    let Some(value) = value else {
        return Some(DEFAULT_CONNECT_TIMEOUT);
    };
    let parsed = match value {
        RawValue::Bool(false) => return None,
        RawValue::Int(n) => u32::try_from(*n).ok(),
        RawValue::Text(s) if is_decimal(s) => s.parse().ok(),
        _ => None,
    };
    parsed.or_else(|| {
        warn!(value = ?value, "unrecognized connect_timeout setting, falling back to default");
        Some(DEFAULT_CONNECT_TIMEOUT)
    })
}

fn is_duration(s: &str) -> bool {
    if is_decimal(s) {
        return true;
    }
    match s.strip_suffix('m').or_else(|| s.strip_suffix('s')) {
        Some(n) => is_decimal(n),
        None => false,
    }
}

fn resolve_reuse(value: Option<&RawValue>, windows: bool) -> ConnectionReuse {
    let persist = |d: &str| ConnectionReuse::Persist(d.to_string());
    let Some(value) = value else {
        // OpenSSH for Windows has no control socket support.
        return if windows {
            ConnectionReuse::Disabled
        } else {
            persist(DEFAULT_PERSIST)
        };
    };
    match value {
        RawValue::Bool(false) | RawValue::Int(0) => ConnectionReuse::Disabled,
        RawValue::Text(s) if s == "0" => ConnectionReuse::Disabled,
        RawValue::Bool(true) => persist(DEFAULT_PERSIST),
        RawValue::Int(n) if *n > 0 => persist(&n.to_string()),
        RawValue::Text(s) if is_duration(s) => persist(s),
        other => {
            warn!(value = ?other, "unrecognized multiplexing setting, falling back to default");
            persist(DEFAULT_PERSIST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct File {
        #[serde(default)]
        transport: TransportSettings,
        #[serde(default)]
        browse: BrowseSettings,
    }

    #[test]
    fn defaults() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.program, "ssh");
        assert!(cfg.use_config_defaults);
        assert_eq!(cfg.host_key_checking, None);
        assert_eq!(cfg.connect_timeout, Some(7));
        assert_eq!(cfg.control_path, DEFAULT_CONTROL_PATH);
        if cfg!(windows) {
            assert_eq!(cfg.reuse, ConnectionReuse::Disabled);
        } else {
            assert_eq!(cfg.reuse, ConnectionReuse::Persist("5m".into()));
            assert!(cfg.reuse_enabled());
        }
    }

    #[test]
    fn parse_toml_settings() {
        let file: File = toml::from_str(
            r#"
[transport]
program = "/usr/bin/ssh"
host_key_checking = "accept-new"
connect_timeout = "12"
multiplexing = "30s"

[browse]
show_hidden = true
"#,
        )
        .unwrap();
        let cfg = file.transport.resolve();
        assert_eq!(cfg.program, "/usr/bin/ssh");
        assert_eq!(cfg.host_key_checking, Some(HostKeyChecking::AcceptNew));
        assert_eq!(cfg.connect_timeout, Some(12));
        assert_eq!(cfg.reuse, ConnectionReuse::Persist("30s".into()));
        assert!(file.browse.show_hidden);
        assert!(!file.browse.check_path_exists);
    }

    #[test]
    fn bools_are_accepted() {
        let file: File = toml::from_str(
            r#"
[transport]
host_key_checking = false
connect_timeout = false
multiplexing = true
"#,
        )
        .unwrap();
        let cfg = file.transport.resolve();
        assert_eq!(cfg.host_key_checking, Some(HostKeyChecking::No));
        assert_eq!(cfg.connect_timeout, None);
        assert_eq!(cfg.reuse, ConnectionReuse::Persist("5m".into()));
    }

    #[test]
    fn invalid_values_fall_back() {
        let file: File = serde_json::from_str(
            r#"{"transport": {"host_key_checking": "maybe", "connect_timeout": "soon", "multiplexing": "forever"}}"#,
        )
        .unwrap();
        let cfg = file.transport.resolve();
        assert_eq!(cfg.host_key_checking, None);
        assert_eq!(cfg.connect_timeout, Some(7));
        assert_eq!(cfg.reuse, ConnectionReuse::Persist("5m".into()));
    }

    #[test]
    fn reuse_disabled_forms() {
        for raw in [RawValue::Bool(false), RawValue::Int(0), RawValue::Text("0".into())] {
            assert_eq!(resolve_reuse(Some(&raw), false), ConnectionReuse::Disabled);
        }
        assert_eq!(resolve_reuse(None, true), ConnectionReuse::Disabled);
        assert_eq!(
            resolve_reuse(Some(&RawValue::Int(300)), false),
            ConnectionReuse::Persist("300".into())
        );
        assert_eq!(
            resolve_reuse(Some(&RawValue::Int(-1)), false),
            ConnectionReuse::Persist("5m".into())
        );
    }

    #[test]
    fn reuse_needs_config_defaults() {
        let settings = TransportSettings {
            use_config_defaults: false,
            multiplexing: Some(RawValue::Text("10m".into())),
            ..Default::default()
        };
        assert!(!settings.resolve().reuse_enabled());
    }

    #[test]
    fn duration_syntax() {
        assert!(is_duration("5m"));
        assert!(is_duration("45s"));
        assert!(is_duration("60"));
        assert!(!is_duration("m"));
        assert!(!is_duration("5h"));
        assert!(!is_duration(""));
    }
}
