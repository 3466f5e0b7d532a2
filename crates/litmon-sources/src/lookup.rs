use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use litmon_core::{Paper, PaperSource};

use crate::error::{Result, SourceError};
use crate::http::RateLimitedClient;
use crate::identifiers::{is_pmid, Doi};
use crate::pubmed::PubMedAdapter;

const CROSSREF_URL: &str = "https://api.crossref.org";

/// CrossRef abstracts arrive wrapped in JATS markup.
static JATS_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());

/// Resolves a user-supplied identifier (bare PMID or DOI in any common
/// spelling) to a full paper record for seeding.
pub struct SeedLookup {
    crossref: RateLimitedClient,
    crossref_base: String,
    pubmed: PubMedAdapter,
}

impl SeedLookup {
    pub fn new(ncbi_api_key: Option<String>, ncbi_email: Option<String>) -> Self {
        Self::with_base_urls(
            CROSSREF_URL,
            PubMedAdapter::new(ncbi_api_key, ncbi_email),
        )
    }

    pub fn with_base_urls(crossref_base: &str, pubmed: PubMedAdapter) -> Self {
        Self {
            crossref: RateLimitedClient::new(Duration::from_millis(500), 3, "litmon/0.1"),
            crossref_base: crossref_base.to_string(),
            pubmed,
        }
    }

    /// Look up an identifier, returning the paper and its seed origin
    /// (`pmid_lookup` or `doi_lookup`).
    pub async fn resolve(&self, identifier: &str) -> Result<(Paper, &'static str)> {
        if is_pmid(identifier) {
            let pmid = identifier.trim();
            let papers = self.pubmed.fetch_papers(&[pmid.to_string()]).await?;
            let paper = papers
                .into_iter()
                .next()
                .ok_or_else(|| SourceError::IdentifierNotFound(pmid.to_string()))?;
            return Ok((paper, "pmid_lookup"));
        }

        let doi = Doi::parse(identifier)?;
        match self.crossref_lookup(&doi).await {
            Ok(paper) => Ok((paper, "doi_lookup")),
            Err(e) => {
                debug!(doi = %doi.normalized, error = %e, "crossref lookup failed, trying pubmed");
                let paper = self.pubmed_doi_fallback(&doi).await?;
                Ok((paper, "doi_lookup"))
            }
        }
    }

    async fn crossref_lookup(&self, doi: &Doi) -> Result<Paper> {
        let url = format!("{}/works/{}", self.crossref_base, doi.normalized);
        let body: Value = self.crossref.get_json(&url).await?;
        let message = &body["message"];
        if message.is_null() {
            return Err(SourceError::IdentifierNotFound(doi.normalized.clone()));
        }

        let title = message["title"]
            .as_array()
            .and_then(|t| t.first())
            .and_then(Value::as_str)
            .unwrap_or("[Untitled]")
            .to_string();

        let authors = message["author"]
            .as_array()
            .map(|authors| {
                authors
                    .iter()
                    .filter_map(|a| {
                        let family = a["family"].as_str()?;
                        let initials: String = a["given"]
                            .as_str()
                            .unwrap_or("")
                            .split_whitespace()
                            .filter_map(|w| w.chars().next())
                            .collect();
                        Some(if initials.is_empty() {
                            family.to_string()
                        } else {
                            format!("{family} {initials}")
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let journal = message["container-title"]
            .as_array()
            .and_then(|t| t.first())
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let abstract_text = message["abstract"]
            .as_str()
            .map(|raw| JATS_TAG_RE.replace_all(raw, "").trim().to_string())
            .unwrap_or_default();

        // License URLs are the closest thing CrossRef has to an OA flag.
        let is_open_access = message["license"]
            .as_array()
            .map(|ls| {
                ls.iter().any(|l| {
                    l["URL"]
                        .as_str()
                        .is_some_and(|u| u.contains("creativecommons.org"))
                })
            })
            .unwrap_or(false);

        let mut paper = Paper::new(doi.record_id(), PaperSource::Crossref, title);
        paper.authors = authors;
        paper.journal = journal;
        if let Some(date) = crossref_date(message) {
            paper.pub_date = date;
        }
        paper.abstract_text = abstract_text;
        paper.url = doi.url();
        paper.is_open_access = is_open_access;
        paper.doi = Some(doi.normalized.clone());
        Ok(paper)
    }

    async fn pubmed_doi_fallback(&self, doi: &Doi) -> Result<Paper> {
        let term = format!("{}[DOI]", doi.normalized);
        let pmids = self.pubmed.search_term(&term, 1).await?;
        let papers = self.pubmed.fetch_papers(&pmids).await?;
        papers
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::IdentifierNotFound(doi.raw.clone()))
    }
}

/// CrossRef dates are `date-parts: [[y, m, d]]` with trailing parts optional.
fn crossref_date(message: &Value) -> Option<String> {
    let parts = ["published-online", "published-print", "issued"]
        .iter()
        .find_map(|key| message[*key]["date-parts"][0].as_array())?;
    let year = parts.first()?.as_u64()?;
    let month = parts.get(1).and_then(Value::as_u64).unwrap_or(1);
    let day = parts.get(2).and_then(Value::as_u64).unwrap_or(1);
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn lookup_against(crossref: &str, pubmed: &str) -> SeedLookup {
        SeedLookup::with_base_urls(crossref, PubMedAdapter::with_base_url(pubmed, None, None))
    }

    #[tokio::test]
    async fn doi_resolves_through_crossref() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1016/j.jhep.2024.01.001")
            .with_body(
                r#"{"message":{
                    "title":["Hepatic stellate cell plasticity"],
                    "author":[{"family":"Rivera","given":"Ana M."}],
                    "container-title":["Journal of Hepatology"],
                    "abstract":"<jats:p>Stellate cells drive fibrosis.</jats:p>",
                    "published-online":{"date-parts":[[2024,1,15]]},
                    "license":[{"URL":"https://creativecommons.org/licenses/by/4.0/"}]
                }}"#,
            )
            .create_async()
            .await;

        let lookup = lookup_against(&server.url(), "http://unused.invalid");
        let (paper, origin) = lookup
            .resolve("https://doi.org/10.1016/j.jhep.2024.01.001")
            .await
            .unwrap();

        assert_eq!(origin, "doi_lookup");
        assert_eq!(paper.id, "doi:10.1016/j.jhep.2024.01.001");
        assert_eq!(paper.title, "Hepatic stellate cell plasticity");
        assert_eq!(paper.authors, vec!["Rivera AM"]);
        assert_eq!(paper.abstract_text, "Stellate cells drive fibrosis.");
        assert_eq!(paper.pub_date, "2024-01-15");
        assert!(paper.is_open_access);
        assert_eq!(paper.url, "https://doi.org/10.1016/j.jhep.2024.01.001");
    }

    #[tokio::test]
    async fn crossref_miss_falls_back_to_pubmed() {
        let mut crossref = Server::new_async().await;
        let _miss = crossref
            .mock("GET", "/works/10.1/gone")
            .with_status(404)
            .with_body("Resource not found.")
            .create_async()
            .await;

        let mut pubmed = Server::new_async().await;
        let _search = pubmed
            .mock("GET", "/esearch.fcgi")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"esearchresult":{"count":"1","idlist":["555"]}}"#)
            .create_async()
            .await;
        let _fetch = pubmed
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"<PubmedArticleSet><PubmedArticle><MedlineCitation>
                    <PMID>555</PMID>
                    <Article><ArticleTitle>Recovered via PubMed</ArticleTitle></Article>
                </MedlineCitation></PubmedArticle></PubmedArticleSet>"#,
            )
            .create_async()
            .await;

        let lookup = lookup_against(&crossref.url(), &pubmed.url());
        let (paper, origin) = lookup.resolve("10.1/gone").await.unwrap();
        assert_eq!(origin, "doi_lookup");
        assert_eq!(paper.id, "555");
        assert_eq!(paper.title, "Recovered via PubMed");
    }

    #[tokio::test]
    async fn pmid_resolves_through_efetch() {
        let mut pubmed = Server::new_async().await;
        let _fetch = pubmed
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "42".into()))
            .with_body(
                r#"<PubmedArticleSet><PubmedArticle><MedlineCitation>
                    <PMID>42</PMID>
                    <Article><ArticleTitle>Direct lookup</ArticleTitle></Article>
                </MedlineCitation></PubmedArticle></PubmedArticleSet>"#,
            )
            .create_async()
            .await;

        let lookup = lookup_against("http://unused.invalid", &pubmed.url());
        let (paper, origin) = lookup.resolve("42").await.unwrap();
        assert_eq!(origin, "pmid_lookup");
        assert_eq!(paper.id, "42");
    }

    #[tokio::test]
    async fn unknown_pmid_is_not_found() {
        let mut pubmed = Server::new_async().await;
        let _fetch = pubmed
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::Any)
            .with_body("<PubmedArticleSet></PubmedArticleSet>")
            .create_async()
            .await;

        let lookup = lookup_against("http://unused.invalid", &pubmed.url());
        let err = lookup.resolve("99999999").await.unwrap_err();
        assert!(matches!(err, SourceError::IdentifierNotFound(_)));
    }

    #[test]
    fn jats_markup_is_stripped() {
        let raw = "<jats:sec><jats:title>Background</jats:title><jats:p>Text here.</jats:p></jats:sec>";
        assert_eq!(JATS_TAG_RE.replace_all(raw, ""), "BackgroundText here.");
    }
}
