//! Process-wide configuration (§6 Configuration table). Loaded by
//! `fabric-cli` from an optional TOML file, overridable by `FABRIC_`-prefixed
//! environment variables; the defaults here are authoritative regardless of
//! how a caller constructs a `FabricConfig`.

use std::path::PathBuf;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FabricConfig {
    pub telemetry_interval_ms: u64,
    pub history_depth: usize,
    pub csp_timeout_ms: u64,
    pub max_hop_latency_ms: f64,
    pub thermal_safe_margin_c: f32,
    pub thermal_resume_margin_c: f32,
    pub audit_buffer_size: usize,
    pub audit_sink: AuditSinkConfig,
    pub registry_path: Option<PathBuf>,
    pub node_label: String,
    pub bind_addr: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditSinkConfig {
    File(PathBuf),
    Console,
    None,
}

impl Default for AuditSinkConfig {
    fn default() -> Self {
        AuditSinkConfig::Console
    }
}

impl AuditSinkConfig {
    /// Parse the `audit_sink` config key's three string forms:
    /// `file:<path>` | `console` | `none` (§6).
    pub fn parse(s: &str) -> Result<Self, String> {
        if s == "console" {
            Ok(AuditSinkConfig::Console)
        } else if s == "none" {
            Ok(AuditSinkConfig::None)
        } else if let Some(path) = s.strip_prefix("file:") {
            Ok(AuditSinkConfig::File(PathBuf::from(path)))
        } else {
            Err(format!("invalid audit_sink value: {s:?}"))
        }
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        FabricConfig {
            telemetry_interval_ms: 500,
            history_depth: 100,
            csp_timeout_ms: 5_000,
            max_hop_latency_ms: 200.0,
            thermal_safe_margin_c: 5.0,
            thermal_resume_margin_c: 10.0,
            audit_buffer_size: 100,
            audit_sink: AuditSinkConfig::Console,
            registry_path: None,
            node_label: String::from("node"),
            bind_addr: String::from("127.0.0.1:0"),
        }
    }
}

impl FabricConfig {
    /// Apply `FABRIC_`-prefixed environment overrides on top of `self`.
    /// Unknown keys are ignored; malformed values are reported by name so
    /// the caller can turn them into a `Configuration` error (§7).
    pub fn apply_env_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        macro_rules! override_num {
            ($field:ident, $key:literal) => {
                if let Some(v) = get($key) {
                    self.$field = v
                        .parse()
                        .map_err(|_| format!("invalid {}: {v:?}", $key))?;
                }
            };
        }
        override_num!(telemetry_interval_ms, "FABRIC_TELEMETRY_INTERVAL_MS");
        override_num!(history_depth, "FABRIC_HISTORY_DEPTH");
        override_num!(csp_timeout_ms, "FABRIC_CSP_TIMEOUT_MS");
        override_num!(max_hop_latency_ms, "FABRIC_MAX_HOP_LATENCY_MS");
        override_num!(thermal_safe_margin_c, "FABRIC_THERMAL_SAFE_MARGIN_C");
        override_num!(thermal_resume_margin_c, "FABRIC_THERMAL_RESUME_MARGIN_C");
        override_num!(audit_buffer_size, "FABRIC_AUDIT_BUFFER_SIZE");
        if let Some(v) = get("FABRIC_AUDIT_SINK") {
            self.audit_sink = AuditSinkConfig::parse(&v)?;
        }
        if let Some(v) = get("FABRIC_NODE_LABEL") {
            self.node_label = v;
        }
        if let Some(v) = get("FABRIC_BIND_ADDR") {
            self.bind_addr = v;
        }
        Ok(self)
    }

    /// Validate cross-field constraints not expressible as plain defaults.
    pub fn validate(&self) -> Result<(), String> {
        if self.history_depth == 0 {
            return Err("history_depth must be > 0".into());
        }
        if self.telemetry_interval_ms == 0 {
            return Err("telemetry_interval_ms must be > 0".into());
        }
        if self.thermal_resume_margin_c <= self.thermal_safe_margin_c {
            return Err("thermal_resume_margin_c must exceed thermal_safe_margin_c".into());
        }
        Ok(())
    }
}
