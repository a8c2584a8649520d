//! Network scan for instruments answering `*IDN?`.
//!
//! Every host address of an IPv4 network is probed concurrently: connect to
//! the instrument port, send `*IDN?`, read one line, close. Hosts that do not
//! accept the connection or stay silent within the probe timeout are skipped.
//!
//! ```no_run
//! use instrument_control::discovery::{DeviceDiscovery, Ipv4Network};
//!
//! # async fn demo() -> instrument_control::error::InstrumentResult<()> {
//! let network: Ipv4Network = "192.168.1.0/24".parse()?;
//! for found in DeviceDiscovery::new(network).discover().await {
//!     println!("{} {}", found.address, found.identity);
//! }
//! # Ok(())
//! # }
//! ```

use crate::devices::DeviceModel;
use crate::error::{InstrumentError, InstrumentResult};
use crate::transport::{TcpTransport, Transport, DEFAULT_PORT};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

/// Default time a single host gets to connect and answer.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of hosts probed at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

/// Identity replies containing this are error messages, not instruments.
const IDENTITY_ERROR_MARKER: &str = "Error";

/// An IPv4 network given by an address and a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Network {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Network {
    /// Network containing `address` with `prefix` leading one bits.
    pub fn new(address: Ipv4Addr, prefix: u8) -> InstrumentResult<Self> {
        if prefix > 32 {
            return Err(InstrumentError::InvalidArguments(format!(
                "prefix length {prefix} exceeds 32"
            )));
        }
        Ok(Self { address, prefix })
    }

    /// Network from an address and a dotted netmask such as `255.255.255.0`.
    pub fn with_netmask(address: Ipv4Addr, netmask: Ipv4Addr) -> InstrumentResult<Self> {
        let mask = u32::from(netmask);
        let prefix = mask.leading_ones();
        // ones must be contiguous
        if mask.checked_shl(prefix).unwrap_or(0) != 0 {
            return Err(InstrumentError::InvalidArguments(format!(
                "netmask {netmask} is not contiguous"
            )));
        }
        Self::new(address, prefix as u8)
    }

    /// Address the network was created from.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Netmask for the prefix.
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask())
    }

    /// Network address (host bits cleared).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & self.mask())
    }

    /// Broadcast address (host bits set).
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) | !self.mask())
    }

    /// Usable host addresses. /31 and /32 networks have no network or
    /// broadcast address to exclude.
    pub fn address_range(&self) -> IpRange {
        let network = u32::from(self.network());
        let broadcast = u32::from(self.broadcast());
        if self.prefix >= 31 {
            return IpRange { start: network.into(), end: broadcast.into() };
        }
        IpRange {
            start: (network + 1).into(),
            end: (broadcast - 1).into(),
        }
    }

    fn mask(&self) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0)
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

impl FromStr for Ipv4Network {
    type Err = InstrumentError;

    /// Accepts `a.b.c.d/prefix`, `a.b.c.d/netmask` or a bare address (/32).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InstrumentError::InvalidArguments(format!("invalid network '{s}'"));
        let (address, suffix) = match s.trim().split_once('/') {
            Some((address, suffix)) => (address, Some(suffix)),
            None => (s.trim(), None),
        };
        let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
        match suffix {
            None => Self::new(address, 32),
            Some(suffix) if suffix.contains('.') => {
                let netmask: Ipv4Addr = suffix.parse().map_err(|_| invalid())?;
                Self::with_netmask(address, netmask)
            }
            Some(suffix) => Self::new(address, suffix.parse().map_err(|_| invalid())?),
        }
    }
}

/// Inclusive range of IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    /// First address
    pub start: Ipv4Addr,
    /// Last address
    pub end: Ipv4Addr,
}

impl IpRange {
    /// Number of addresses in the range.
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end)).saturating_sub(u64::from(u32::from(self.start))) + 1
    }

    /// Always false, a range holds at least its start address.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        (u32::from(self.start)..=u32::from(self.end)).map(Ipv4Addr::from)
    }
}

/// A host that answered the identification query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Host address
    pub address: Ipv4Addr,
    /// Port the instrument answered on
    pub port: u16,
    /// Trimmed `*IDN?` response
    pub identity: String,
    /// Driver model, if recognised
    pub model: Option<DeviceModel>,
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.model {
            Some(model) => write!(f, "{}:{} [{}] {}", self.address, self.port, model.id(), self.identity),
            None => write!(f, "{}:{} {}", self.address, self.port, self.identity),
        }
    }
}

/// Concurrent `*IDN?` scan over a network.
#[derive(Debug, Clone)]
pub struct DeviceDiscovery {
    network: Ipv4Network,
    port: u16,
    probe_timeout: Duration,
    max_concurrency: usize,
}

impl DeviceDiscovery {
    /// Scan `network` on the default instrument port.
    #[must_use]
    pub fn new(network: Ipv4Network) -> Self {
        Self {
            network,
            port: DEFAULT_PORT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Port to probe.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Time each host gets to connect and answer.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Number of hosts probed at once (at least 1).
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Network being scanned.
    pub fn network(&self) -> Ipv4Network {
        self.network
    }

    /// Probe every host address and return the ones that identified
    /// themselves, sorted by address.
    pub async fn discover(&self) -> Vec<DiscoveredDevice> {
        let range = self.network.address_range();
        tracing::info!(
            network = %self.network,
            start = %range.start,
            end = %range.end,
            hosts = range.len(),
            port = self.port,
            "Starting device discovery"
        );

        let mut found: Vec<DiscoveredDevice> = stream::iter(range.iter())
            .map(|address| self.probe(address))
            .buffer_unordered(self.max_concurrency)
            .filter_map(|found| async move { found })
            .collect()
            .await;
        found.sort_by_key(|device| device.address);

        tracing::info!(network = %self.network, found = found.len(), "Device discovery finished");
        found
    }

    async fn probe(&self, address: Ipv4Addr) -> Option<DiscoveredDevice> {
        let host = address.to_string();
        let mut transport = TcpTransport::connect(&host, self.port, self.probe_timeout)
            .await
            .ok()?;
        let identity = async {
            transport.write_line("*IDN?").await?;
            transport.read_line().await
        }
        .await;
        let _ = transport.close().await;

        match identity {
            Ok(identity) if identity.contains(IDENTITY_ERROR_MARKER) => {
                tracing::debug!(%address, %identity, "Host answered with an error");
                None
            }
            Ok(identity) if !identity.trim().is_empty() => {
                let identity = identity.trim().to_string();
                let model = DeviceModel::from_identity(&identity);
                tracing::info!(%address, ?model, %identity, "Found device");
                Some(DiscoveredDevice { address, port: self.port, identity, model })
            }
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(%address, error = %err, "Host did not identify");
                None
            }
        }
    }
}
