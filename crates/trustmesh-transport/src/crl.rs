//! Certificate revocation checking: a validator built from the trust
//! store's certificates, consulted per peer certificate during the TLS
//! handshake, with a `max_crl_validity_days` staleness cutoff.

use std::time::{Duration, SystemTime};

/// One revocation list: the serials it lists as revoked, and when it was
/// issued (`this_update`).
#[derive(Clone, Debug)]
pub struct RevocationList {
    pub issuer: String,
    pub this_update: SystemTime,
    pub revoked_serials: Vec<Vec<u8>>,
}

/// Checks a peer certificate's serial against every loaded CRL. A CRL older
/// than `max_validity_days` is treated as stale: it is not consulted for
/// revocation, only logged, matching the original's preference for
/// availability over strict freshness when CRLs can't be refreshed in time.
pub struct CrlValidator {
    lists: Vec<RevocationList>,
    max_validity: Duration,
}

impl CrlValidator {
    pub fn new(lists: Vec<RevocationList>, max_validity_days: u32) -> Self {
        Self {
            lists,
            max_validity: Duration::from_secs(u64::from(max_validity_days) * 24 * 3600),
        }
    }

    /// `true` if `serial` is not revoked by any non-stale CRL.
    pub fn is_valid(&self, serial: &[u8], now: SystemTime) -> bool {
        for list in &self.lists {
            let age = now
                .duration_since(list.this_update)
                .unwrap_or(Duration::ZERO);
            if age > self.max_validity {
                tracing::warn!(issuer = %list.issuer, "CRL is stale, ignoring for revocation check");
                continue;
            }
            if list.revoked_serials.iter().any(|s| s == serial) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(this_update: SystemTime, revoked: Vec<Vec<u8>>) -> RevocationList {
        RevocationList {
            issuer: "test-ca".into(),
            this_update,
            revoked_serials: revoked,
        }
    }

    #[test]
    fn revoked_serial_is_rejected() {
        let now = SystemTime::now();
        let validator = CrlValidator::new(vec![list(now, vec![vec![1, 2, 3]])], 4);
        assert!(!validator.is_valid(&[1, 2, 3], now));
        assert!(validator.is_valid(&[4, 5, 6], now));
    }

    #[test]
    fn stale_crl_is_ignored() {
        let now = SystemTime::now();
        let stale_issue = now - Duration::from_secs(10 * 24 * 3600);
        let validator = CrlValidator::new(vec![list(stale_issue, vec![vec![1, 2, 3]])], 4);
        assert!(validator.is_valid(&[1, 2, 3], now));
    }

    #[test]
    fn no_lists_means_nothing_is_revoked() {
        let validator = CrlValidator::new(vec![], 4);
        assert!(validator.is_valid(&[9, 9, 9], SystemTime::now()));
    }
}
