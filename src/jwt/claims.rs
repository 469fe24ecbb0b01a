use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed token lifetime: every token expires two hours after issuance.
pub const TOKEN_TTL_SECS: i64 = 2 * 60 * 60;

/// The claim set carried by every token.
///
/// Registered claims are stamped by the issuer and checked by the
/// verifier; application claims ride along untouched in `custom`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Deployment issuer constant
    pub iss: String,
    /// Deployment audience constant
    pub aud: String,
    /// Expiration, seconds since the epoch
    pub exp: i64,
    /// Issued-at, seconds since the epoch
    pub iat: i64,

    /// Application claims, e.g. `username`
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl SessionClaims {
    /// Stamp the registered claims over a set of application claims.
    ///
    /// Registered names in `custom` are dropped first; callers cannot
    /// override what the issuer asserts.
    #[must_use]
    pub fn stamp(
        mut custom: HashMap<String, serde_json::Value>,
        issuer: &str,
        audience: &str,
        now: i64,
    ) -> Self {
        for reserved in ["iss", "aud", "exp", "iat"] {
            custom.remove(reserved);
        }

        Self {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: now + TOKEN_TTL_SECS,
            iat: now,
            custom,
        }
    }

    /// Whether the token is still live at `timestamp`. Expiry is exact, no
    /// grace window.
    #[must_use]
    pub fn is_valid_at(&self, timestamp: i64) -> bool {
        timestamp < self.exp
    }

    /// Whether the token has expired against the wall clock.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(chrono::Utc::now().timestamp())
    }

    /// Look up an application claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.custom.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(pairs: &[(&str, &str)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::json!(v)))
            .collect()
    }

    #[test]
    fn test_stamp_sets_two_hour_window() {
        let claims = SessionClaims::stamp(custom(&[("username", "alice")]), "iss", "aud", 1_000);

        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
        assert_eq!(claims.get("username"), Some(&serde_json::json!("alice")));
    }

    #[test]
    fn test_stamp_drops_reserved_names() {
        let claims = SessionClaims::stamp(
            custom(&[("iss", "spoofed"), ("exp", "9999999999")]),
            "real-issuer",
            "aud",
            1_000,
        );

        assert_eq!(claims.iss, "real-issuer");
        assert_eq!(claims.exp, 1_000 + TOKEN_TTL_SECS);
        assert!(claims.custom.is_empty());
    }

    #[test]
    fn test_validity_boundary_is_exclusive() {
        let claims = SessionClaims::stamp(HashMap::new(), "iss", "aud", 0);

        assert!(claims.is_valid_at(TOKEN_TTL_SECS - 1));
        assert!(!claims.is_valid_at(TOKEN_TTL_SECS));
        assert!(!claims.is_valid_at(TOKEN_TTL_SECS + 1));
    }

    #[test]
    fn test_custom_claims_survive_serde() {
        let claims = SessionClaims::stamp(custom(&[("username", "alice")]), "iss", "aud", 1_000);

        let json = serde_json::to_string(&claims).unwrap();
        let back: SessionClaims = serde_json::from_str(&json).unwrap();

        assert_eq!(claims, back);
        assert_eq!(back.get("username"), Some(&serde_json::json!("alice")));
    }
}
