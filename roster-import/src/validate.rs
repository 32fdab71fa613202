//! Field validation helpers: email syntax, email-domain liveness, ages

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    // Local part, then a dotted hostname or a bracketed IPv4/IPv6 literal.
    Regex::new(
        r"(?x)^
        [a-zA-Z0-9_\-\.\+\^!\#\$%&\*\+/\=\?`\|\{\}~']+
        @
        (
            (([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.?)+
            |
            \[([0-9]{1,3}(\.[0-9]{1,3}){3}|[0-9a-fA-F]{1,4}(:[0-9a-fA-F]{1,4}){7})\]
        )
        $",
    )
    .unwrap()
});

/// Syntactic email address check
pub fn valid_email_address(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Liveness check for an email address's domain
///
/// A trait so tests can stub it out; the real implementation hits DNS.
#[async_trait]
pub trait EmailDomainCheck: Send + Sync {
    /// Whether the domain of `email` resolves to a live host
    async fn active_email_domain(&self, email: &str) -> bool;
}

/// DNS-backed domain check using the system resolver
pub struct DnsDomainCheck;

#[async_trait]
impl EmailDomainCheck for DnsDomainCheck {
    async fn active_email_domain(&self, email: &str) -> bool {
        let Some(domain) = email.rsplit_once('@').map(|(_, d)| d) else {
            return false;
        };
        // Port is irrelevant; lookup_host only needs the name to resolve.
        tokio::net::lookup_host((domain, 25))
            .await
            .map(|mut addrs| addrs.next().is_some())
            .unwrap_or(false)
    }
}

/// Stub check that accepts every domain (tests, offline runs)
pub struct AcceptAllDomains;

#[async_trait]
impl EmailDomainCheck for AcceptAllDomains {
    async fn active_email_domain(&self, _email: &str) -> bool {
        true
    }
}

/// Age in whole years on `today`, adjusted for whether the birthday has
/// already occurred this year
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    let had_birthday = today.month() > birth.month()
        || (today.month() == birth.month() && today.day() >= birth.day());
    if !had_birthday {
        age -= 1;
    }
    age
}

/// Age in whole years as of the current UTC date
pub fn age_today(birth: NaiveDate) -> i32 {
    age_on(birth, Utc::now().date_naive())
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%d.%m.%Y", "%Y/%m/%d"];

/// Parse a birth date from any of the spreadsheet date formats we accept
pub fn parse_birthdate(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value.trim(), fmt).ok())
}
