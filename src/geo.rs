//! Geo-database fallback.
//!
//! The resolver never resolves host names over the network: only address
//! literals carried in the domain part (`1.2.3.4`, `[1.2.3.4]`,
//! `[IPv6:2001:db8::1]`) are keyed into the database. Every failure mode of
//! the underlying reader collapses into "no match".

use std::net::IpAddr;
use std::path::Path;
use std::time::Instant;

use maxminddb::{geoip2, MaxMindDBError, Reader};
use thiserror::Error;
use tracing::{debug, info};

use crate::classifier::CountryLookup;
use crate::domain::CountryCode;
use crate::error::{Result, SorterError};

/// Failures a geo database may report for a single key.
#[derive(Error, Debug)]
pub enum GeoLookupError {
    #[error("key {0:?} is not an address the database can answer for")]
    InvalidKey(String),

    #[error("geo database error: {0}")]
    Database(String),
}

/// Read-only country database keyed by host or address text.
pub trait GeoDatabase: Send + Sync {
    fn country_code(&self, key: &str) -> std::result::Result<Option<String>, GeoLookupError>;
}

/// MaxMind `.mmdb` country database loaded into memory.
pub struct MmdbDatabase {
    reader: Reader<Vec<u8>>,
}

impl MmdbDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let start_time = Instant::now();
        let reader =
            Reader::open_readfile(path).map_err(|e| SorterError::asset_missing(path, e))?;
        info!(
            action = "open",
            component = "geo_database",
            file_path = ?path,
            database_type = %reader.metadata.database_type,
            duration_ms = start_time.elapsed().as_millis(),
            "Opened geo database"
        );
        Ok(MmdbDatabase { reader })
    }
}

impl GeoDatabase for MmdbDatabase {
    fn country_code(&self, key: &str) -> std::result::Result<Option<String>, GeoLookupError> {
        let ip = parse_address_literal(key).ok_or_else(|| GeoLookupError::InvalidKey(key.to_string()))?;
        match self.reader.lookup::<geoip2::Country>(ip) {
            Ok(record) => Ok(record
                .country
                .and_then(|country| country.iso_code)
                .map(str::to_string)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(GeoLookupError::Database(e.to_string())),
        }
    }
}

/// Parse the address forms an e-mail domain can carry.
pub fn parse_address_literal(key: &str) -> Option<IpAddr> {
    let inner = key
        .strip_prefix('[')
        .and_then(|k| k.strip_suffix(']'))
        .unwrap_or(key);
    let inner = match inner.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("ipv6:") => &inner[5..],
        _ => inner,
    };
    inner.parse().ok()
}

/// Fallback lookup over a geo database; misses and errors become `None`.
pub struct GeoResolver {
    db: Box<dyn GeoDatabase>,
}

impl GeoResolver {
    pub fn new(db: impl GeoDatabase + 'static) -> Self {
        GeoResolver { db: Box::new(db) }
    }

    /// Open a MaxMind country database; failing to open it is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(GeoResolver::new(MmdbDatabase::open(path)?))
    }

    pub fn lookup(&self, domain: &str) -> Option<CountryCode> {
        match self.db.country_code(domain) {
            Ok(Some(code)) if !code.trim().is_empty() => Some(CountryCode::new(code.trim())),
            Ok(_) => None,
            Err(e) => {
                debug!(action = "lookup", component = "geo_resolver", domain = domain, error = %e, "Geo lookup failed");
                None
            }
        }
    }
}

impl CountryLookup for GeoResolver {
    fn name(&self) -> &'static str {
        "geo"
    }

    fn lookup(&self, domain: &str) -> Option<CountryCode> {
        GeoResolver::lookup(self, domain)
    }
}
