//! Visitor geolocation
//!
//! Edge proxies that already resolved the visitor send it in a header; the
//! MaxMind GeoLite2 database is the fallback for direct traffic.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use maxminddb::{geoip2, Reader};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Country code recorded when nothing could be resolved
pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

/// Resolved visitor location
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoLocation {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EdgeCountry {
    code: Option<String>,
    name: Option<String>,
}

/// Shape of the base64 JSON `x-nf-geo` header
#[derive(Debug, Deserialize)]
struct EdgeGeo {
    city: Option<String>,
    country: Option<EdgeCountry>,
    timezone: Option<String>,
}

/// Decode an edge geo header (base64 JSON, or plain JSON)
pub fn from_edge_header(value: &str) -> Option<GeoLocation> {
    let value = value.trim();
    let json = match BASE64_STANDARD.decode(value) {
        Ok(bytes) => String::from_utf8(bytes).ok()?,
        Err(_) => value.to_string(),
    };
    let geo: EdgeGeo = serde_json::from_str(&json).ok()?;
    let (country_code, country_name) = match geo.country {
        Some(c) => (c.code, c.name),
        None => (None, None),
    };
    Some(GeoLocation {
        country_code,
        country_name,
        city: geo.city,
        timezone: geo.timezone,
    })
}

/// English entry of a MaxMind localized name map
fn english_name(names: Option<&BTreeMap<&str, &str>>) -> Option<String> {
    names?.get("en").map(|name| name.to_string())
}

/// GeoIP reader wrapper
pub struct GeoIp {
    reader: Option<Reader<Vec<u8>>>,
}

impl GeoIp {
    /// Create a new GeoIP instance, loading the database if available
    pub fn new(database_path: &str) -> Self {
        let path = Path::new(database_path);

        if !path.exists() {
            warn!("GeoIP database not found at: {}", database_path);
            return Self { reader: None };
        }

        match Reader::open_readfile(path) {
            Ok(reader) => {
                info!("GeoIP database loaded: {}", database_path);
                Self { reader: Some(reader) }
            }
            Err(e) => {
                warn!("Failed to load GeoIP database: {}", e);
                Self { reader: None }
            }
        }
    }

    /// Instance with no database; every lookup misses
    pub fn disabled() -> Self {
        Self { reader: None }
    }

    /// Look up an IP address and return location info
    pub fn lookup(&self, ip: &str) -> Option<GeoLocation> {
        let reader = self.reader.as_ref()?;

        let ip_addr: IpAddr = ip.parse().ok()?;

        // Skip private/local IPs
        if is_private_ip(&ip_addr) {
            return None;
        }

        let city: geoip2::City = reader.lookup(ip_addr).ok()?;

        let country_code = city
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(str::to_string);
        let country_name = english_name(city.country.as_ref().and_then(|c| c.names.as_ref()));
        let city_name = english_name(city.city.as_ref().and_then(|c| c.names.as_ref()));
        let timezone = city
            .location
            .as_ref()
            .and_then(|l| l.time_zone)
            .map(str::to_string);

        Some(GeoLocation {
            country_code,
            country_name,
            city: city_name,
            timezone,
        })
    }

    /// Check if the GeoIP database is loaded
    pub fn is_available(&self) -> bool {
        self.reader.is_some()
    }
}

/// Check if an IP address is private/local
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
            || ipv4.is_loopback()
            || ipv4.is_link_local()
            || ipv4.is_broadcast()
            || ipv4.is_documentation()
            || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
            || ipv6.is_unspecified()
        }
    }
}

/// Thread-safe GeoIP wrapper
pub type SharedGeoIp = Arc<GeoIp>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_edge_header() {
        let raw = r#"{"city":"Miami","country":{"code":"US","name":"United States"},"timezone":"America/New_York"}"#;
        let header = BASE64_STANDARD.encode(raw);
        let geo = from_edge_header(&header).unwrap();
        assert_eq!(geo.country_code.as_deref(), Some("US"));
        assert_eq!(geo.country_name.as_deref(), Some("United States"));
        assert_eq!(geo.city.as_deref(), Some("Miami"));
        assert_eq!(geo.timezone.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn accepts_plain_json_and_rejects_garbage() {
        let geo = from_edge_header(r#"{"country":{"code":"BR"}}"#).unwrap();
        assert_eq!(geo.country_code.as_deref(), Some("BR"));
        assert!(from_edge_header("not geo").is_none());
    }

    #[test]
    fn english_names_are_picked() {
        let names = BTreeMap::from([("de", "Vereinigte Staaten"), ("en", "United States")]);
        assert_eq!(english_name(Some(&names)).as_deref(), Some("United States"));

        let no_english = BTreeMap::from([("pt-BR", "Estados Unidos")]);
        assert_eq!(english_name(Some(&no_english)), None);
        assert_eq!(english_name(None), None);
    }

    #[test]
    fn disabled_lookup_misses() {
        let geo = GeoIp::disabled();
        assert!(!geo.is_available());
        assert!(geo.lookup("8.8.8.8").is_none());
    }

    #[test]
    fn private_ranges_are_skipped() {
        assert!(is_private_ip(&"10.1.2.3".parse().unwrap()));
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
    }
}
