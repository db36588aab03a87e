//! Share links: `nullshare://d/{transfer_id}#key={64 hex}`
//!
//! The key lives in the fragment. A link is the only place the key ever
//! appears outside process memory, so `Display` output must never be logged.

use std::fmt;
use std::str::FromStr;

use nullshare_core::{TransferError, TransferId};
use nullshare_crypto::TransferKey;

const LINK_PREFIX: &str = "nullshare://d/";
const KEY_PARAM: &str = "key=";
const HYPHENATED_UUID_LEN: usize = 36;

/// A parsed share link.
///
/// `Debug` redacts the key; `Display` renders the full link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLink {
    pub transfer_id: TransferId,
    key: TransferKey,
}

impl TransferLink {
    pub fn new(transfer_id: TransferId, key: TransferKey) -> Self {
        Self { transfer_id, key }
    }

    pub fn key(&self) -> &TransferKey {
        &self.key
    }
}

impl fmt::Display for TransferLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{LINK_PREFIX}{}#{KEY_PARAM}{}",
            self.transfer_id,
            self.key.to_hex()
        )
    }
}

impl FromStr for TransferLink {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.trim().strip_prefix(LINK_PREFIX).ok_or_else(|| {
            TransferError::InvalidLink(format!("link must start with {LINK_PREFIX}"))
        })?;

        let (path, fragment) = match rest.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment)),
            None => (rest, None),
        };

        // a key in the query string would be sent to servers
        if path.contains('?') {
            return Err(TransferError::InvalidLink(
                "query strings are not allowed; the key belongs in the #key= fragment".into(),
            ));
        }

        // hyphenated form only; uuid also parses simple, braced and urn forms
        let id = path.trim_end_matches('/');
        if id.len() != HYPHENATED_UUID_LEN {
            return Err(TransferError::InvalidLink(format!(
                "bad transfer id {id:?}: expected a hyphenated UUID"
            )));
        }
        let transfer_id: TransferId = id
            .parse()
            .map_err(|e| TransferError::InvalidLink(format!("bad transfer id {id:?}: {e}")))?;

        let key_hex = fragment
            .and_then(|f| f.strip_prefix(KEY_PARAM))
            .ok_or_else(|| TransferError::InvalidLink("missing #key= fragment".into()))?;
        let key = TransferKey::from_hex(key_hex)
            .map_err(|e| TransferError::InvalidLink(format!("bad key: {e}")))?;

        Ok(Self { transfer_id, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "3f2b8c1e-9a4d-4e7f-b2c6-5d8e1f0a7b93";

    fn key_hex() -> String {
        "a1".repeat(32)
    }

    #[test]
    fn test_display_format() {
        let id: TransferId = ID.parse().unwrap();
        let key = TransferKey::from_hex(&key_hex()).unwrap();
        let link = TransferLink::new(id, key);

        assert_eq!(
            link.to_string(),
            format!("nullshare://d/{ID}#key={}", key_hex())
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let link = TransferLink::new(TransferId::new(), TransferKey::generate());
        let parsed: TransferLink = link.to_string().parse().unwrap();
        assert_eq!(parsed, link);
    }

    #[test]
    fn test_parse_accepts_surrounding_whitespace() {
        let raw = format!("  nullshare://d/{ID}#key={}\n", key_hex());
        let link: TransferLink = raw.parse().unwrap();
        assert_eq!(link.transfer_id.to_string(), ID);
        assert_eq!(link.key().to_hex(), key_hex());
    }

    #[test]
    fn test_parse_rejects_query_string_key() {
        let raw = format!("nullshare://d/{ID}?key={}", key_hex());
        let err = raw.parse::<TransferLink>().unwrap_err();
        assert!(matches!(err, TransferError::InvalidLink(_)), "got {err:?}");
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn test_parse_rejects_malformed_links() {
        let bad = [
            format!("https://d/{ID}#key={}", key_hex()),
            format!("nullshare://x/{ID}#key={}", key_hex()),
            format!("nullshare://d/not-a-uuid#key={}", key_hex()),
            format!("nullshare://d/{ID}"),
            format!("nullshare://d/{ID}#k={}", key_hex()),
            format!("nullshare://d/{ID}#key=abcd"),
            format!("nullshare://d/{ID}#key={}", "zz".repeat(32)),
        ];
        for raw in bad {
            assert!(
                matches!(raw.parse::<TransferLink>(), Err(TransferError::InvalidLink(_))),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_non_hyphenated_ids() {
        let simple = ID.replace('-', "");
        let forms = [
            simple,
            format!("{{{ID}}}"),
            format!("urn:uuid:{ID}"),
            format!(" {ID}"),
        ];
        for id in forms {
            let raw = format!("nullshare://d/{id}#key={}", key_hex());
            assert!(
                matches!(raw.parse::<TransferLink>(), Err(TransferError::InvalidLink(_))),
                "accepted {raw}"
            );
        }

        // canonical form still parses, uppercase included
        let upper = format!("nullshare://d/{}#key={}", ID.to_uppercase(), key_hex());
        let link: TransferLink = upper.parse().unwrap();
        assert_eq!(link.transfer_id.to_string(), ID);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let link: TransferLink = format!("nullshare://d/{ID}#key={}", key_hex())
            .parse()
            .unwrap();
        let debug = format!("{link:?}");
        assert!(!debug.contains(&key_hex()));
    }
}
