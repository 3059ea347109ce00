//! Network status model
//!
//! `NetworkStatus` is the single answer to "can we reach the server right
//! now". It is recomputed by the monitor and handed out as cloned snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BackoffConfig;

/// Physical link kind, when the platform reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Bluetooth,
    Wimax,
    Other,
    None,
    #[default]
    Unknown,
}

/// Effective link class, as reported by network-information APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl EffectiveType {
    pub fn is_slow(self) -> bool {
        matches!(self, EffectiveType::Slow2g | EffectiveType::TwoG)
    }
}

/// Link-quality metadata; every field is best-effort
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkInfo {
    pub connection_type: ConnectionType,
    pub effective_type: EffectiveType,
    /// Estimated bandwidth in Mbps (0 when unknown)
    pub downlink: f64,
    /// Estimated round-trip time in ms (0 when unknown)
    pub rtt: f64,
    pub save_data: bool,
}

/// Coarse quality bucket for display and throttling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Fair => "fair",
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// Downlink at or above which a 4g link is rated excellent
const EXCELLENT_DOWNLINK_MBPS: f64 = 10.0;
/// Downlink below which an otherwise unclassified link is rated fair
const FAIR_DOWNLINK_MBPS: f64 = 1.5;
/// More consecutive failures than this and dependents should hold back
const LIMIT_DATA_FAILURES: u32 = 2;

/// Reachability snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// Interface up AND most recent probe succeeded
    pub is_online: bool,
    pub is_slow_connection: bool,
    pub connection_type: ConnectionType,
    pub effective_type: EffectiveType,
    pub downlink: f64,
    pub rtt: f64,
    pub save_data: bool,
    /// Failed reachability checks since the last success
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::initial(false)
    }
}

impl NetworkStatus {
    /// Status before any probe has run, seeded from the interface flag
    pub fn initial(interface_up: bool) -> Self {
        Self {
            is_online: interface_up,
            is_slow_connection: false,
            connection_type: ConnectionType::Unknown,
            effective_type: EffectiveType::Unknown,
            downlink: 0.0,
            rtt: 0.0,
            save_data: false,
            consecutive_failures: 0,
            last_checked: None,
        }
    }

    /// Build a status from an evaluation's inputs
    pub fn evaluated(
        is_online: bool,
        link: Option<LinkInfo>,
        slow_downlink_mbps: f64,
        consecutive_failures: u32,
    ) -> Self {
        let link = link.unwrap_or_default();
        let slow_downlink = link.downlink > 0.0 && link.downlink < slow_downlink_mbps;
        Self {
            is_online,
            is_slow_connection: link.effective_type.is_slow() || slow_downlink,
            connection_type: link.connection_type,
            effective_type: link.effective_type,
            downlink: link.downlink,
            rtt: link.rtt,
            save_data: link.save_data,
            consecutive_failures,
            last_checked: Some(Utc::now()),
        }
    }

    /// True when the fields dependents react to differ
    pub fn differs_from(&self, other: &NetworkStatus) -> bool {
        self.is_online != other.is_online || self.is_slow_connection != other.is_slow_connection
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        if !self.is_online {
            return ConnectionQuality::Offline;
        }
        if self.is_slow_connection {
            return ConnectionQuality::Poor;
        }
        match self.effective_type {
            EffectiveType::Slow2g | EffectiveType::TwoG => ConnectionQuality::Poor,
            EffectiveType::ThreeG => ConnectionQuality::Fair,
            EffectiveType::FourG if self.downlink >= EXCELLENT_DOWNLINK_MBPS => {
                ConnectionQuality::Excellent
            }
            EffectiveType::FourG => ConnectionQuality::Good,
            EffectiveType::Unknown if self.downlink > 0.0 && self.downlink < FAIR_DOWNLINK_MBPS => {
                ConnectionQuality::Fair
            }
            EffectiveType::Unknown => ConnectionQuality::Good,
        }
    }

    /// Whether dependents should skip optional background calls
    pub fn should_limit_data(&self) -> bool {
        self.save_data
            || self.is_slow_connection
            || self.consecutive_failures > LIMIT_DATA_FAILURES
    }

    /// Backoff before the next retry: `base * 2^min(failures, cap)`, doubled on slow links
    pub fn retry_delay(&self, backoff: &BackoffConfig) -> Duration {
        backoff.delay_for(self.consecutive_failures, self.is_slow_connection)
    }
}
