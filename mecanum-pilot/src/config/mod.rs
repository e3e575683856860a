//! Pilot configuration loading and management.
//!
//! The expected YAML structure is:
//! ```yaml
//! peer:
//!   address: "F4:12:FA:6E:CF:59"
//!   name: "Arduino"
//! endpoint:
//!   service_uuid: "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
//!   characteristic_uuid: "6e400002-b5a3-f393-e0a9-e50e24dcca9e"
//! timing:
//!   burst_rate_hz: 4
//!   settle_ms: 100
//!   pacing_ms: 200
//! require_ack: true
//! ```
//!
//! Every section is optional. Missing values fall back to the reference
//! deployment: an Arduino exposing the Nordic UART Service.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::transport::{PeerIdentity, WriteEndpoint};

/// Nordic UART Service UUID.
pub const NUS_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Nordic UART RX characteristic (central → peripheral writes).
pub const NUS_RX_CHAR_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Upper bound for `timing.burst_rate_hz`.
pub const MAX_BURST_RATE_HZ: u32 = 50;

/// Address of the reference robot.
pub const DEFAULT_PEER_ADDRESS: &str = "F4:12:FA:6E:CF:59";

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PilotConfigFile {
    peer: PeerEntry,
    endpoint: EndpointEntry,
    timing: TimingConfig,
    require_ack: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PeerEntry {
    address: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointEntry {
    service_uuid: Option<String>,
    characteristic_uuid: Option<String>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Pacing parameters for the timeline builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Re-send rate for a movement with a duration.
    pub burst_rate_hz: u32,
    /// Pause after a single command, and before the stop that ends a burst.
    pub settle_ms: u64,
    /// Extra pause between two request elements.
    pub pacing_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            burst_rate_hz: 4,
            settle_ms: 100,
            pacing_ms: 200,
        }
    }
}

impl TimingConfig {
    /// Gap between two sends of the same burst: `1 / burst_rate_hz`.
    pub fn send_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.burst_rate_hz.max(1)))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Number of sends for a burst of `duration_sec`:
    /// `floor(duration_sec × rate)`, never less than 1.
    pub fn send_count(&self, duration_sec: f64) -> usize {
        let raw = (duration_sec * f64::from(self.burst_rate_hz)).floor();
        // `as` saturates for huge values and maps negatives to 0
        (raw as usize).max(1)
    }
}

/// Effective configuration for one robot.
#[derive(Debug, Clone, PartialEq)]
pub struct PilotConfig {
    pub peer: PeerIdentity,
    pub endpoint: WriteEndpoint,
    pub timing: TimingConfig,
    /// Use write-with-response for every command.
    pub require_ack: bool,
}

impl Default for PilotConfig {
    /// The reference deployment.
    fn default() -> Self {
        Self {
            peer: PeerIdentity::new(DEFAULT_PEER_ADDRESS, Some("Arduino".to_string())),
            endpoint: WriteEndpoint::new(NUS_SERVICE_UUID, NUS_RX_CHAR_UUID),
            timing: TimingConfig::default(),
            require_ack: true,
        }
    }
}

impl PilotConfig {
    fn from_file(file: PilotConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let address = file
            .peer
            .address
            .unwrap_or_else(|| defaults.peer.address.clone());
        let name = file.peer.name.or(defaults.peer.name);
        // UUIDs are compared case-insensitively by BLE stacks
        let service = file
            .endpoint
            .service_uuid
            .unwrap_or(defaults.endpoint.service_uuid)
            .to_lowercase();
        let characteristic = file
            .endpoint
            .characteristic_uuid
            .unwrap_or(defaults.endpoint.characteristic_uuid)
            .to_lowercase();

        let cfg = Self {
            peer: PeerIdentity::new(address, name),
            endpoint: WriteEndpoint::new(service, characteristic),
            timing: file.timing,
            require_ack: file.require_ack.unwrap_or(defaults.require_ack),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the dispatcher cannot work with.
    ///
    /// # Errors
    /// Empty peer address, empty endpoint UUIDs, or a burst rate outside
    /// `1..=MAX_BURST_RATE_HZ`.
    pub fn validate(&self) -> Result<()> {
        if self.peer.address.trim().is_empty() {
            bail!("peer.address must not be empty");
        }
        if self.endpoint.service_uuid.trim().is_empty() {
            bail!("endpoint.service_uuid must not be empty");
        }
        if self.endpoint.characteristic_uuid.trim().is_empty() {
            bail!("endpoint.characteristic_uuid must not be empty");
        }
        if self.timing.burst_rate_hz == 0 {
            bail!("timing.burst_rate_hz must be greater than 0");
        }
        if self.timing.burst_rate_hz > MAX_BURST_RATE_HZ {
            bail!(
                "timing.burst_rate_hz must be at most {}, got {}",
                MAX_BURST_RATE_HZ,
                self.timing.burst_rate_hz
            );
        }
        Ok(())
    }
}

// ── ConfigManager ─────────────────────────────────────────────────────────────

/// Loads and holds the pilot configuration from a YAML file.
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: PilotConfig,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl ConfigManager {
    /// Creates a manager holding the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces the current configuration.
    ///
    /// On error the previous configuration is reset to defaults and
    /// [`is_loaded`](Self::is_loaded) returns `false`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or a value fails validation.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading pilot configuration from: {}", path.display());

        self.config = PilotConfig::default();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: PilotConfigFile = if content.trim().is_empty() {
            PilotConfigFile::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?
        };
        debug!(?file, "parsed configuration file");

        self.config = PilotConfig::from_file(file)
            .with_context(|| format!("Invalid configuration in: {}", path.display()))?;
        self.loaded = true;

        info!(
            peer = %self.config.peer,
            service = %self.config.endpoint.service_uuid,
            characteristic = %self.config.endpoint.characteristic_uuid,
            burst_rate_hz = self.config.timing.burst_rate_hz,
            settle_ms = self.config.timing.settle_ms,
            pacing_ms = self.config.timing.pacing_ms,
            "Successfully loaded pilot configuration"
        );

        Ok(())
    }

    /// The effective configuration (defaults until a file is loaded).
    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
