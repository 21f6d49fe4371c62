use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no network interface address found")]
    NoInterface,
    #[error("interface {0:?} has no address")]
    UnknownInterface(String),
    #[error("listing network interfaces: {0}")]
    Io(#[from] std::io::Error),
}

/// An address paired with a human-readable place name. Used for logging only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkLocation {
    pub ip: IpAddr,
    pub name: String,
}

impl fmt::Display for NetworkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.ip, self.name)
    }
}

#[async_trait]
pub trait LocationLookup: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> NetworkLocation;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AddressClassLookup;

#[async_trait]
impl LocationLookup for AddressClassLookup {
    async fn locate(&self, ip: IpAddr) -> NetworkLocation {
        NetworkLocation {
            ip,
            name: address_class(ip).to_string(),
        }
    }
}

/// Queries a geo-IP JSON endpoint such as `http://ip-api.com/json/{ip}`.
/// `{ip}` in the template is replaced with the address; without it the address is appended.
pub struct HttpLocationLookup {
    client: reqwest::Client,
    url_template: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoIpResponse {
    country: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
}

impl HttpLocationLookup {
    pub fn new(client: reqwest::Client, url_template: String) -> Self {
        Self {
            client,
            url_template,
        }
    }

    fn url_for(&self, ip: IpAddr) -> String {
        if self.url_template.contains("{ip}") {
            self.url_template.replace("{ip}", &ip.to_string())
        } else {
            format!("{}/{}", self.url_template.trim_end_matches('/'), ip)
        }
    }

    async fn fetch(&self, ip: IpAddr) -> Result<String, reqwest::Error> {
        let response: GeoIpResponse = self
            .client
            .get(self.url_for(ip))
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let parts = [response.country, response.region_name, response.city]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>();

        Ok(parts.join(" "))
    }
}

#[async_trait]
impl LocationLookup for HttpLocationLookup {
    async fn locate(&self, ip: IpAddr) -> NetworkLocation {
        if address_class(ip) != "public" {
            return AddressClassLookup.locate(ip).await;
        }

        match self.fetch(ip).await {
            Ok(name) if !name.is_empty() => NetworkLocation { ip, name },
            Ok(_) => AddressClassLookup.locate(ip).await,
            Err(error) => {
                debug!(%ip, %error, "geo-ip lookup failed");
                AddressClassLookup.locate(ip).await
            }
        }
    }
}

pub fn address_class(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(v4) if v4.is_loopback() => "loopback",
        IpAddr::V4(v4) if v4.is_private() => "private network",
        IpAddr::V4(v4) if v4.is_link_local() => "link-local",
        IpAddr::V4(v4) if v4.is_unspecified() => "unspecified",
        IpAddr::V6(v6) if v6.is_loopback() => "loopback",
        IpAddr::V6(v6) if v6.is_unspecified() => "unspecified",
        IpAddr::V6(v6) if (v6.segments()[0] & 0xfe00) == 0xfc00 => "private network",
        IpAddr::V6(v6) if (v6.segments()[0] & 0xffc0) == 0xfe80 => "link-local",
        _ => "public",
    }
}

/// Picks the named interface if one is configured, otherwise the first non-loopback
/// address, otherwise the first address of any kind.
pub fn select_address(
    interfaces: &[(String, IpAddr)],
    preferred: Option<&str>,
) -> Result<IpAddr, IdentityError> {
    if let Some(name) = preferred {
        return interfaces
            .iter()
            .find(|(interface, _)| interface == name)
            .map(|(_, ip)| *ip)
            .ok_or_else(|| IdentityError::UnknownInterface(name.to_string()));
    }

    interfaces
        .iter()
        .map(|(_, ip)| *ip)
        .find(|ip| !ip.is_loopback())
        .or_else(|| interfaces.first().map(|(_, ip)| *ip))
        .ok_or(IdentityError::NoInterface)
}

pub async fn resolve_local_identity(
    preferred: Option<&str>,
    lookup: &dyn LocationLookup,
) -> Result<NetworkLocation, IdentityError> {
    let interfaces = if_addrs::get_if_addrs()?
        .into_iter()
        .map(|interface| {
            let ip = interface.ip();
            (interface.name, ip)
        })
        .collect::<Vec<_>>();

    let ip = select_address(&interfaces, preferred)?;
    Ok(lookup.locate(ip).await)
}

/// Logs the host identity. Failure only costs the log line.
pub async fn log_local_identity(preferred: Option<&str>, lookup: &dyn LocationLookup) {
    match resolve_local_identity(preferred, lookup).await {
        Ok(location) => info!(ip = %location.ip, location = %location.name, "host identity"),
        Err(error) => warn!(%error, "could not resolve host identity"),
    }
}
