use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Seconds before `expires_at` at which a cached access token stops being handed out.
pub const FRESHNESS_BUFFER_SECS: i64 = 60;

/// The two OAuth providers the connector holds credentials for.
///
/// The string form is the key used in the persisted token document.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderId {
    /// Authorization code with PKCE.
    Airtable,
    /// Confidential client, refresh-token grant.
    Ebay,
}

impl ProviderId {
    pub fn all() -> impl Iterator<Item = ProviderId> {
        Self::iter()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Airtable => "Airtable",
            Self::Ebay => "eBay",
        }
    }

    /// Nominal access-token lifetime used when a token response omits `expires_in`.
    pub fn default_lifetime(&self) -> Duration {
        match self {
            Self::Airtable => Duration::seconds(3600),
            Self::Ebay => Duration::seconds(7200),
        }
    }

    /// Whether the authorization leg uses a PKCE challenge and a stored verifier.
    pub fn uses_pkce(&self) -> bool {
        matches!(self, Self::Airtable)
    }
}

/// Persisted credentials for one provider.
///
/// `expires_at` is always computed when the record is written, as
/// `now + provider-declared lifetime`. It is stored as epoch milliseconds.
///
/// # Example
/// ```
/// use chrono::Duration;
/// use listing_connector::auth::TokenRecord;
///
/// let record = TokenRecord::issued("at-123", Some("rt-456".into()), Duration::hours(1));
/// assert!(record.is_fresh());
/// assert!(!format!("{record:?}").contains("at-123"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Build a record for a token that was issued just now with the given lifetime.
    ///
    /// An expiry past the representable range saturates at the maximum date.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        lifetime: Duration,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: Utc::now()
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// True while `expires_at` is more than [`FRESHNESS_BUFFER_SECS`] away.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::seconds(FRESHNESS_BUFFER_SECS)
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        let remaining = self.expires_at - Utc::now();
        (remaining > Duration::zero()).then_some(remaining)
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn provider_id_round_trips_through_its_store_key() {
        assert_eq!(ProviderId::Airtable.to_string(), "airtable");
        assert_eq!(ProviderId::Ebay.as_ref(), "ebay");
        assert_eq!(ProviderId::from_str("ebay").unwrap(), ProviderId::Ebay);
        assert!(ProviderId::from_str("github").is_err());
        assert_eq!(
            serde_json::to_string(&ProviderId::Airtable).unwrap(),
            "\"airtable\""
        );
    }

    #[test]
    fn default_lifetimes_match_provider_nominal_values() {
        assert_eq!(ProviderId::Airtable.default_lifetime().num_seconds(), 3600);
        assert_eq!(ProviderId::Ebay.default_lifetime().num_seconds(), 7200);
        assert!(ProviderId::Airtable.uses_pkce());
        assert!(!ProviderId::Ebay.uses_pkce());
    }

    #[test]
    fn freshness_uses_sixty_second_buffer() {
        let now = Utc::now();
        let mut record = TokenRecord::issued("a", None, Duration::hours(1));

        record.expires_at = now + Duration::seconds(61);
        assert!(record.is_fresh_at(now));

        record.expires_at = now + Duration::seconds(60);
        assert!(!record.is_fresh_at(now));

        record.expires_at = now - Duration::seconds(10);
        assert!(!record.is_fresh_at(now));
        assert!(record.time_until_expiry().is_none());
    }

    #[test]
    fn issued_saturates_instead_of_overflowing() {
        let record = TokenRecord::issued("a", None, Duration::MAX);
        assert_eq!(record.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(record.is_fresh());
    }

    #[test]
    fn serializes_expiry_as_epoch_millis() {
        let record = TokenRecord {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
            expires_at: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["expires_at"], 1_700_000_000_123i64);
        assert_eq!(json["refresh_token"], "R1");

        let back: TokenRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn missing_refresh_token_deserializes_as_none() {
        let record: TokenRecord =
            serde_json::from_str(r#"{"access_token":"A","expires_at":0}"#).unwrap();
        assert!(record.refresh_token.is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let record = TokenRecord::issued(
            "secret_access",
            Some("secret_refresh".into()),
            Duration::hours(1),
        );
        let debug = format!("{record:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret_access"));
        assert!(!debug.contains("secret_refresh"));
    }
}
