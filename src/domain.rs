use std::fmt;
use std::sync::Arc;

use url::Host;

use crate::error::MalformedAddress;

const UNKNOWN: &str = "UNKNOWN";

/// Country identifier attached to an address, or the `UNKNOWN` bucket.
///
/// Backed by an `Arc<str>` so the value handed out by a lookup table can be
/// cloned into millions of results without copying the text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryCode(Arc<str>);

impl CountryCode {
    pub fn new(code: &str) -> Self {
        CountryCode(Arc::from(code))
    }

    pub fn unknown() -> Self {
        CountryCode::new(UNKNOWN)
    }

    pub fn is_unknown(&self) -> bool {
        &*self.0 == UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One input line together with the country it was routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEmail {
    pub country: CountryCode,
    pub email: String,
}

impl ClassifiedEmail {
    pub fn new(country: CountryCode, email: String) -> Self {
        ClassifiedEmail { country, email }
    }

    pub fn unknown(email: String) -> Self {
        ClassifiedEmail::new(CountryCode::unknown(), email)
    }
}

/// Pull the normalized domain out of a raw line.
///
/// Takes everything after the last `@`, drops any `:port` or `/path` tail,
/// trims trailing whitespace and punctuation and lower-cases the result.
/// International names are converted to their ASCII form when possible.
/// Address literals such as `[192.0.2.1]` are kept bracketed.
pub fn extract_domain(line: &str) -> Result<String, MalformedAddress> {
    let malformed = || MalformedAddress {
        line: line.to_string(),
    };

    let (_, raw) = line.rsplit_once('@').ok_or_else(malformed)?;
    let raw = raw.trim();

    let raw = if raw.starts_with('[') {
        match raw.find(']') {
            Some(end) => &raw[..=end],
            None => raw,
        }
    } else {
        raw.split([':', '/']).next().unwrap_or_default()
    };

    let trimmed =
        raw.trim_end_matches(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != ']'));
    if trimmed.is_empty() {
        return Err(malformed());
    }

    let lowered = trimmed.to_lowercase();
    if lowered.starts_with('[') {
        return Ok(lowered);
    }

    Ok(match Host::parse(&lowered) {
        Ok(Host::Domain(ascii)) => ascii,
        _ => lowered,
    })
}
