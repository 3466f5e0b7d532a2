use serde::{Deserialize, Serialize};

use crate::error::{Result, SourceError};

/// A validated, normalized DOI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Doi {
    pub raw: String,
    pub normalized: String,
}

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let stripped = if let Some(s) = input.strip_prefix("https://doi.org/") {
            s
        } else if let Some(s) = input.strip_prefix("http://doi.org/") {
            s
        } else if let Some(s) = input.strip_prefix("https://dx.doi.org/") {
            s
        } else if let Some(s) = input.strip_prefix("http://dx.doi.org/") {
            s
        } else if let Some(s) = input.strip_prefix("doi:") {
            s.trim_start()
        } else if let Some(s) = input.strip_prefix("DOI:") {
            s.trim_start()
        } else {
            input
        };

        // Must be "10.<registrant>/<suffix>" with a non-empty suffix.
        if !stripped.starts_with("10.") {
            return Err(SourceError::InvalidDoi(input.to_string()));
        }
        let slash = stripped
            .find('/')
            .ok_or_else(|| SourceError::InvalidDoi(input.to_string()))?;
        if stripped[slash + 1..].is_empty() {
            return Err(SourceError::InvalidDoi(input.to_string()));
        }

        Ok(Self {
            raw: input.to_string(),
            normalized: stripped.to_lowercase(),
        })
    }

    /// The paper-store id for a DOI-keyed record.
    pub fn record_id(&self) -> String {
        format!("doi:{}", self.normalized)
    }

    pub fn url(&self) -> String {
        format!("https://doi.org/{}", self.normalized)
    }
}

/// PMIDs are opaque numeric strings.
pub fn is_pmid(identifier: &str) -> bool {
    let trimmed = identifier.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit())
}

/// The paper-store id for a Zotero item lacking a DOI.
pub fn zotero_record_id(item_key: &str) -> String {
    format!("zotero:{item_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_doi() {
        let doi = Doi::parse("10.1000/xyz123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
        assert_eq!(doi.record_id(), "doi:10.1000/xyz123");
    }

    #[test]
    fn doi_with_url_prefix() {
        let doi = Doi::parse("https://doi.org/10.1101/2024.01.01.573001").unwrap();
        assert_eq!(doi.normalized, "10.1101/2024.01.01.573001");
    }

    #[test]
    fn doi_with_colon_prefix_and_case() {
        let doi = Doi::parse("DOI: 10.1002/HEP.12345").unwrap();
        assert_eq!(doi.normalized, "10.1002/hep.12345");
    }

    #[test]
    fn rejects_non_doi() {
        assert!(Doi::parse("not-a-doi").is_err());
        assert!(Doi::parse("10.1000").is_err());
        assert!(Doi::parse("10.1000/").is_err());
    }

    #[test]
    fn pmid_detection() {
        assert!(is_pmid("38412345"));
        assert!(is_pmid(" 12345 "));
        assert!(!is_pmid("10.1000/xyz"));
        assert!(!is_pmid(""));
    }
}
