//! Platform configuration

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::text::InterfaceName;

/// Environment variable that shifts the simulation port range
pub const PORT_OFFSET_ENV: &str = "PORT_OFFSET";

/// Largest simulated network, used to space out port ranges
pub const MAX_NETWORK_SIZE: u16 = 33;

/// Default simulation base port
pub const DEFAULT_PORT_BASE: u16 = 9000;

/// Configuration for a platform instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Protocol network interface name
    pub interface_name: InterfaceName,
    /// Backbone (infrastructure) interface name, if any
    pub backbone_interface_name: Option<InterfaceName>,
    /// Radio co-processor URL
    pub radio_url: Option<RadioUrl>,
    /// Real-time speed-up factor (1 = wall-clock speed)
    pub speed_up_factor: u32,
    /// Real or virtual time
    pub time_mode: TimeMode,
    /// Host UDP sockets to bind
    pub udp_bind: Vec<SocketAddr>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            interface_name: InterfaceName::default(),
            backbone_interface_name: None,
            radio_url: None,
            speed_up_factor: 1,
            time_mode: TimeMode::Real,
            udp_bind: Vec::new(),
        }
    }
}

impl PlatformConfig {
    /// Create a configuration for a virtual-time simulation node
    pub fn simulation(node_id: u16) -> Self {
        Self::default().with_time_mode(TimeMode::Virtual(VirtualTimeConfig::new(node_id)))
    }

    /// Set the interface name
    pub fn with_interface_name(mut self, name: InterfaceName) -> Self {
        self.interface_name = name;
        self
    }

    /// Set the backbone interface name
    pub fn with_backbone_interface_name(mut self, name: InterfaceName) -> Self {
        self.backbone_interface_name = Some(name);
        self
    }

    /// Set the radio URL
    pub fn with_radio_url(mut self, url: RadioUrl) -> Self {
        self.radio_url = Some(url);
        self
    }

    /// Set the speed-up factor
    pub fn with_speed_up_factor(mut self, factor: u32) -> Self {
        self.speed_up_factor = factor;
        self
    }

    /// Set the time mode
    pub fn with_time_mode(mut self, mode: TimeMode) -> Self {
        self.time_mode = mode;
        self
    }

    /// Add a UDP socket to bind
    pub fn with_udp_bind(mut self, addr: SocketAddr) -> Self {
        self.udp_bind.push(addr);
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.speed_up_factor == 0 {
            return Err(ConfigError::InvalidSpeedUpFactor);
        }
        if let TimeMode::Virtual(sim) = &self.time_mode {
            sim.node_port()?;
        }
        Ok(())
    }

    /// Whether time is driven by simulation events
    pub fn is_virtual(&self) -> bool {
        matches!(self.time_mode, TimeMode::Virtual(_))
    }
}

/// How time advances
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    /// Monotonic wall clock
    #[default]
    Real,
    /// Counter advanced by a simulation coordinator
    Virtual(VirtualTimeConfig),
}

/// Virtual-time node settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualTimeConfig {
    /// Node identifier within the simulation, starting at 1
    pub node_id: u16,
    /// Base UDP port
    pub port_base: u16,
    /// Offset separating concurrent simulations
    pub port_offset: u16,
}

impl VirtualTimeConfig {
    /// Create settings for `node_id` with no port offset
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id,
            port_base: DEFAULT_PORT_BASE,
            port_offset: 0,
        }
    }

    /// Create settings for `node_id`, reading the port offset from
    /// `PORT_OFFSET`
    pub fn from_env(node_id: u16) -> Result<Self, ConfigError> {
        let raw = std::env::var(PORT_OFFSET_ENV).ok();
        Self::from_offset_var(node_id, raw.as_deref())
    }

    /// Create settings from a raw `PORT_OFFSET` value.
    ///
    /// The offset counts whole simulations, each spanning
    /// `MAX_NETWORK_SIZE + 1` ports.
    pub fn from_offset_var(node_id: u16, raw: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Self::new(node_id);
        if let Some(raw) = raw {
            let invalid = || ConfigError::InvalidEnv {
                var: PORT_OFFSET_ENV,
                value: raw.to_string(),
            };
            let index: u16 = raw.trim().parse().map_err(|_| invalid())?;
            config.port_offset = index
                .checked_mul(MAX_NETWORK_SIZE + 1)
                .ok_or_else(invalid)?;
        }
        Ok(config)
    }

    /// Set the base port
    pub fn with_port_base(mut self, port_base: u16) -> Self {
        self.port_base = port_base;
        self
    }

    /// Port the coordinator listens on
    pub fn coordinator_port(&self) -> Result<u16, ConfigError> {
        self.port_base
            .checked_add(self.port_offset)
            .ok_or(ConfigError::PortOutOfRange {
                node_id: self.node_id,
            })
    }

    /// Port this node binds
    pub fn node_port(&self) -> Result<u16, ConfigError> {
        self.coordinator_port()?
            .checked_add(self.node_id)
            .ok_or(ConfigError::PortOutOfRange {
                node_id: self.node_id,
            })
    }
}

/// Radio co-processor URL, e.g.
/// `spinel+hdlc+uart:///dev/ttyUSB0?uart-baudrate=115200`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RadioUrl(Url);

impl RadioUrl {
    /// Parse a radio URL. A path naming the device or socket is required.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|e| ConfigError::RadioUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if url.path().is_empty() || url.path() == "/" {
            return Err(ConfigError::RadioUrl {
                url: raw.to_string(),
                reason: "missing device path".to_string(),
            });
        }
        Ok(Self(url))
    }

    /// Scheme, e.g. `spinel+hdlc+uart`
    pub fn protocol(&self) -> &str {
        self.0.scheme()
    }

    /// Device or socket path
    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Value of query parameter `name`. A bare flag yields an empty string.
    pub fn param(&self, name: &str) -> Option<String> {
        self.0
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Whether the scheme names `transport` as one of its `+` parts
    pub fn uses(&self, transport: &str) -> bool {
        self.protocol().split('+').any(|part| part == transport)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for RadioUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RadioUrl({})", self.0)
    }
}

impl fmt::Display for RadioUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for RadioUrl {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RadioUrl> for String {
    fn from(url: RadioUrl) -> Self {
        url.0.into()
    }
}
