use std::collections::HashMap;

use tracing::info;

use crate::domain::{extract_domain, ClassifiedEmail, CountryCode};
use crate::geo::GeoResolver;
use crate::settings::LookupOrder;
use crate::tld::TldTable;

/// Entries a worker keeps before its cache is reset.
const CACHE_CAPACITY: usize = 64 * 1024;

/// One way of routing a domain to a country.
pub trait CountryLookup: Send + Sync {
    fn name(&self) -> &'static str;
    fn lookup(&self, domain: &str) -> Option<CountryCode>;
}

/// Tries its lookup strategies in order and falls back to `UNKNOWN`.
///
/// Classification never fails: every line yields exactly one result.
pub struct CountryClassifier {
    strategies: Vec<Box<dyn CountryLookup>>,
}

impl CountryClassifier {
    pub fn new(strategies: Vec<Box<dyn CountryLookup>>) -> Self {
        CountryClassifier { strategies }
    }

    /// Compose the TLD table and optional geo resolver in the given order.
    pub fn from_assets(tld: TldTable, geo: Option<GeoResolver>, order: LookupOrder) -> Self {
        let tld: Box<dyn CountryLookup> = Box::new(tld);
        let mut strategies = vec![tld];
        if let Some(geo) = geo {
            match order {
                LookupOrder::TldFirst => strategies.push(Box::new(geo)),
                LookupOrder::GeoFirst => strategies.insert(0, Box::new(geo)),
            }
        }

        let classifier = CountryClassifier::new(strategies);
        info!(action = "configure", component = "classifier", strategies = ?classifier.strategy_names(), "Classifier ready");
        classifier
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn classify(&self, line: String) -> ClassifiedEmail {
        match extract_domain(&line) {
            Ok(domain) => {
                let country = self.resolve(&domain);
                ClassifiedEmail::new(country, line)
            }
            Err(_) => ClassifiedEmail::unknown(line),
        }
    }

    /// Same as [`classify`](Self::classify), memoizing domains in `cache`.
    pub fn classify_cached(&self, line: String, cache: &mut ResolutionCache) -> ClassifiedEmail {
        let domain = match extract_domain(&line) {
            Ok(domain) => domain,
            Err(_) => return ClassifiedEmail::unknown(line),
        };

        if let Some(country) = cache.get(&domain) {
            return ClassifiedEmail::new(country.clone(), line);
        }

        let country = self.resolve(&domain);
        cache.insert(domain, country.clone());
        ClassifiedEmail::new(country, line)
    }

    fn resolve(&self, domain: &str) -> CountryCode {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.lookup(domain))
            .unwrap_or_else(CountryCode::unknown)
    }
}

/// Per-worker memo of domain lookups.
///
/// Each worker owns one, so there is no shared mutable state. The cache is
/// cleared once it reaches its capacity.
#[derive(Debug)]
pub struct ResolutionCache {
    entries: HashMap<String, CountryCode>,
    capacity: usize,
    hits: u64,
}

impl ResolutionCache {
    pub fn new() -> Self {
        ResolutionCache::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ResolutionCache {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            hits: 0,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&mut self, domain: &str) -> Option<&CountryCode> {
        let hit = self.entries.get(domain);
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    fn insert(&mut self, domain: String, country: CountryCode) {
        if self.entries.len() >= self.capacity {
            self.entries.clear();
        }
        self.entries.insert(domain, country);
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        ResolutionCache::new()
    }
}
