use crate::error::FetchError;

use super::FetchOptions;

/// Identity of an operation: every submission with an equal key shares one
/// transfer.
///
/// The URL is normalised through `url::Url` (scheme and host lowercased,
/// default port dropped) so trivially different spellings coalesce. Only
/// request-shaping flags take part; priority and delivery flags do not.
///
/// `revision` stands for the header set and credential in effect when the
/// request was admitted. The fetcher stamps it under its lock and bumps it on
/// every header or credential change, so requests sent with different
/// headers or credentials never share a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub url: String,
    pub shaping: FetchOptions,
    pub revision: u64,
}

impl OperationKey {
    /// Validate `url` and build the key for a request with `options`.
    pub fn for_request(url: &str, options: FetchOptions) -> Result<Self, FetchError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(FetchError::InvalidRequest("empty URL".to_string()));
        }
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", trimmed, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(FetchError::InvalidRequest(format!(
                "{}: not a fetchable URL",
                trimmed
            )));
        }
        Ok(Self {
            url: parsed.to_string(),
            shaping: options.shaping(),
            revision: 0,
        })
    }

    /// Same request under another header and credential revision.
    pub fn at_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(matches!(
            OperationKey::for_request("", FetchOptions::NONE),
            Err(FetchError::InvalidRequest(_))
        ));
        assert!(matches!(
            OperationKey::for_request("   ", FetchOptions::NONE),
            Err(FetchError::InvalidRequest(_))
        ));
        assert!(OperationKey::for_request("not a url", FetchOptions::NONE).is_err());
        assert!(OperationKey::for_request("mailto:someone@example.com", FetchOptions::NONE).is_err());
    }

    #[test]
    fn normalises_url_spelling() {
        let a = OperationKey::for_request("HTTPS://Example.COM:443/a.png", FetchOptions::NONE).unwrap();
        let b = OperationKey::for_request("https://example.com/a.png", FetchOptions::NONE).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.url, "https://example.com/a.png");
    }

    #[test]
    fn priority_does_not_split_keys_but_cookies_do() {
        let url = "https://cdn.test/x.jpg";
        let plain = OperationKey::for_request(url, FetchOptions::NONE).unwrap();
        let high = OperationKey::for_request(url, FetchOptions::HIGH_PRIORITY).unwrap();
        let progressive = OperationKey::for_request(url, FetchOptions::PROGRESSIVE).unwrap();
        let cookies = OperationKey::for_request(url, FetchOptions::HANDLE_COOKIES).unwrap();
        assert_eq!(plain, high);
        assert_eq!(plain, progressive);
        assert_ne!(plain, cookies);
    }

    #[test]
    fn header_and_credential_revision_splits_keys() {
        let key = OperationKey::for_request("https://cdn.test/x.jpg", FetchOptions::NONE).unwrap();
        assert_eq!(key.clone().at_revision(3), key.clone().at_revision(3));
        assert_ne!(key.clone().at_revision(3), key.at_revision(4));
    }
}
