//! Configuration for the IFSEI gateway bridge.
//!
//! TOML file + `IFSEI_` environment layering, validation of the gateway
//! address and device declarations, and translation to the runtime types
//! in `ifsei_core` and `ifsei_api`.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use ifsei_api::{ChannelAddress, DEFAULT_PORT, Endpoint, SceneId, TransportConfig};
use ifsei_core::{
    BridgeConfig, BridgeOptions, CoverScenes, DeviceConfig, DeviceKind, LightKind, ReconnectPolicy,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── Ranges the options accept ───────────────────────────────────────

pub const SEND_DELAY_MS_RANGE: (u64, u64) = (100, 500);
pub const RECONNECT_DELAY_SECS_RANGE: (u64, u64) = (5, 60);

const DEFAULT_HOST: &str = "192.168.15.22";

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: Gateway,

    #[serde(default)]
    pub options: Options,

    #[serde(default)]
    pub zones: Vec<Zone>,

    #[serde(default)]
    pub lights: Vec<LightEntry>,

    #[serde(default)]
    pub shades: Vec<ShadeEntry>,
}

/// Where the gateway listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Gateway {
    /// IPv4 address of the gateway.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// A session silent for longer than this is treated as dead.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    300
}

/// Runtime-tunable bridge options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Options {
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,

    /// Retry when the very first connection attempt fails.
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Unset means retry forever.
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay(),
            reconnect: default_reconnect(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_attempts: None,
        }
    }
}

fn default_send_delay() -> u64 {
    200
}
fn default_reconnect() -> bool {
    true
}
fn default_reconnect_delay() -> u64 {
    30
}

impl Options {
    /// Pull both delays into their accepted ranges.
    pub fn clamped(self) -> Self {
        let send_delay_ms = clamp("send_delay_ms", self.send_delay_ms, SEND_DELAY_MS_RANGE);
        let reconnect_delay_secs = clamp(
            "reconnect_delay_secs",
            self.reconnect_delay_secs,
            RECONNECT_DELAY_SECS_RANGE,
        );
        Self {
            send_delay_ms,
            reconnect_delay_secs,
            ..self
        }
    }

    pub fn to_bridge_options(self) -> BridgeOptions {
        let opts = self.clamped();
        BridgeOptions {
            send_delay: Duration::from_millis(opts.send_delay_ms),
            reconnect: ReconnectPolicy {
                enabled: opts.reconnect,
                delay: Duration::from_secs(opts.reconnect_delay_secs),
                max_attempts: opts.max_reconnect_attempts,
            },
        }
    }
}

fn clamp(field: &str, value: u64, (min, max): (u64, u64)) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(field, value, clamped, "option out of range, clamping");
    }
    clamped
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// Light output type, as named by the gateway installer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightType {
    /// Plain relay.
    #[default]
    Common,
    Dimmable,
    /// Four channels: red, green, blue, white.
    Rgb,
}

/// A light declaration.
///
/// `channels` lists the module's outputs: one for common and dimmable
/// lights, four (red, green, blue, white) for RGB lights.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LightEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: LightType,
    pub module: u8,
    pub channels: Vec<u8>,
}

/// A shade declaration: the scenes that move it, and optionally the
/// `[module, channel]` that reports its position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShadeEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub zone: Option<String>,
    pub up: u16,
    pub down: u16,
    pub stop: u16,
    #[serde(default)]
    pub position: Option<[u8; 2]>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "scenario", "ifsei-bridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ifsei-bridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the default path and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path`, then overlay `IFSEI_` environment
/// variables (`IFSEI_GATEWAY__HOST`, `IFSEI_OPTIONS__SEND_DELAY_MS`, ...).
///
/// A missing file yields the defaults. The result is validated.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("IFSEI_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    /// Check the gateway address and every device declaration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.host.parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::validation(
                "gateway.host",
                format!("'{}' is not an IPv4 address", self.gateway.host),
            ));
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::validation("gateway.port", "must not be 0"));
        }

        let mut zones = HashSet::new();
        for zone in &self.zones {
            if !zones.insert(zone.id.as_str()) {
                return Err(ConfigError::validation(
                    "zones",
                    format!("duplicate zone '{}'", zone.id),
                ));
            }
        }

        let mut ids = HashSet::new();
        let declared = self
            .lights
            .iter()
            .map(|l| (l.id.as_str(), l.zone.as_deref()))
            .chain(self.shades.iter().map(|s| (s.id.as_str(), s.zone.as_deref())));
        for (id, zone) in declared {
            if !ids.insert(id) {
                return Err(ConfigError::validation(
                    "devices",
                    format!("duplicate device id '{id}'"),
                ));
            }
            if let Some(zone) = zone {
                if !zones.contains(zone) {
                    return Err(ConfigError::validation(
                        format!("{id}.zone"),
                        format!("unknown zone '{zone}'"),
                    ));
                }
            }
        }

        self.to_device_configs().map(drop)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.gateway.host.clone(), self.gateway.port)
    }

    /// Build the runtime bridge config. Options are clamped.
    pub fn to_bridge_config(&self) -> BridgeConfig {
        BridgeConfig::new(self.endpoint()).with_options(self.options.to_bridge_options())
    }

    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.gateway.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.gateway.read_timeout_secs),
            ..TransportConfig::default()
        }
    }

    /// Translate light and shade declarations, lights first.
    pub fn to_device_configs(&self) -> Result<Vec<DeviceConfig>, ConfigError> {
        let lights = self.lights.iter().map(|light| {
            Ok(DeviceConfig {
                id: light.id.clone().into(),
                name: light.name.clone(),
                zone: light.zone.clone(),
                kind: DeviceKind::Light(light_kind(light)?),
            })
        });
        let shades = self.shades.iter().map(|shade| {
            Ok(DeviceConfig {
                id: shade.id.clone().into(),
                name: shade.name.clone(),
                zone: shade.zone.clone(),
                kind: DeviceKind::Cover(CoverScenes {
                    up: SceneId(shade.up),
                    down: SceneId(shade.down),
                    stop: SceneId(shade.stop),
                    position: shade.position.map(|[m, c]| ChannelAddress::new(m, c)),
                }),
            })
        });
        lights.chain(shades).collect()
    }
}

fn light_kind(light: &LightEntry) -> Result<LightKind, ConfigError> {
    let at = |channel: u8| ChannelAddress::new(light.module, channel);
    match (light.kind, light.channels.as_slice()) {
        (LightType::Common, &[channel]) => Ok(LightKind::OnOff {
            channel: at(channel),
        }),
        (LightType::Dimmable, &[channel]) => Ok(LightKind::Dimmable {
            channel: at(channel),
        }),
        (LightType::Rgb, &[red, green, blue, white]) => Ok(LightKind::Rgb {
            red: at(red),
            green: at(green),
            blue: at(blue),
            white: at(white),
        }),
        (kind, channels) => {
            let expected = if kind == LightType::Rgb { 4 } else { 1 };
            Err(ConfigError::validation(
                format!("{}.channels", light.id),
                format!("expected {expected} channel(s), got {}", channels.len()),
            ))
        }
    }
}
