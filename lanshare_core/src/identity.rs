use std::collections::HashSet;
use std::net::IpAddr;

const FALLBACK_NAME: &str = "Unknown-PC";

/// Who this node is on the network
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    /// Name put in presence broadcasts
    pub name: String,
    /// Addresses whose broadcasts are our own echoes
    pub local_ips: HashSet<IpAddr>,
}

impl NodeIdentity {
    pub fn new(name: impl Into<String>, local_ips: HashSet<IpAddr>) -> Self {
        Self {
            name: name.into(),
            local_ips,
        }
    }

    /// Use `display_name` or the hostname, and collect the interface addresses
    pub fn detect(display_name: Option<&str>) -> Self {
        let name = display_name
            .map(str::to_string)
            .unwrap_or_else(local_hostname);
        Self::new(name, local_addresses())
    }
}

pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Every address bound to a local interface
pub fn local_addresses() -> HashSet<IpAddr> {
    match local_ip_address::list_afinet_netifas() {
        Ok(ifaces) => ifaces.into_iter().map(|(_name, ip)| ip).collect(),
        Err(e) => {
            tracing::warn!("Could not list network interfaces: {}", e);
            HashSet::new()
        }
    }
}
