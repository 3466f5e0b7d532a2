use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use litmon_core::{Paper, PaperSource};

use crate::adapter::SourceAdapter;
use crate::error::Result;
use crate::http::RateLimitedClient;
use crate::identifiers::Doi;
use crate::query::QueryMatcher;

const BASE_URL: &str = "https://api.biorxiv.org";

/// The details endpoint returns pages of 100 records.
const PAGE_SIZE: usize = 100;

/// Hard ceiling on pagination in case the server misreports its total.
const MAX_PAGES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprintServer {
    Biorxiv,
    Medrxiv,
}

impl PreprintServer {
    fn api_name(self) -> &'static str {
        match self {
            Self::Biorxiv => "biorxiv",
            Self::Medrxiv => "medrxiv",
        }
    }

    fn journal_label(self) -> &'static str {
        match self {
            Self::Biorxiv => "bioRxiv (preprint)",
            Self::Medrxiv => "medRxiv (preprint)",
        }
    }

    fn source(self) -> PaperSource {
        match self {
            Self::Biorxiv => PaperSource::Biorxiv,
            Self::Medrxiv => PaperSource::Medrxiv,
        }
    }

    fn content_host(self) -> &'static str {
        match self {
            Self::Biorxiv => "www.biorxiv.org",
            Self::Medrxiv => "www.medrxiv.org",
        }
    }
}

/// Adapter for the bioRxiv and medRxiv details API. The API has no query
/// endpoint, so we page through everything posted in the date window and
/// filter locally against the search query.
pub struct PreprintAdapter {
    client: RateLimitedClient,
    base_url: String,
    server: PreprintServer,
}

#[derive(Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    collection: Vec<PreprintRecord>,
}

#[derive(Deserialize)]
struct PreprintRecord {
    #[serde(default)]
    doi: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    version: String,
    #[serde(default, rename = "abstract")]
    abstract_text: String,
}

impl PreprintAdapter {
    pub fn new(server: PreprintServer) -> Self {
        Self::with_base_url(BASE_URL, server)
    }

    pub fn with_base_url(base_url: &str, server: PreprintServer) -> Self {
        Self {
            client: RateLimitedClient::new(Duration::from_millis(500), 3, "litmon/0.1"),
            base_url: base_url.to_string(),
            server,
        }
    }

    /// Walk the details endpoint cursor until the server's reported total
    /// is exhausted, collecting every record in the window.
    async fn fetch_window(&self, days_back: u32) -> Result<Vec<PreprintRecord>> {
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(i64::from(days_back));

        let mut records = Vec::new();
        let mut cursor = 0usize;
        for _ in 0..MAX_PAGES {
            let url = format!(
                "{}/details/{}/{}/{}/{}",
                self.base_url,
                self.server.api_name(),
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d"),
                cursor,
            );
            let page: DetailsResponse = self.client.get_json(&url).await?;

            if page.collection.is_empty() {
                break;
            }
            cursor += page.collection.len();
            records.extend(page.collection);

            let total = page
                .messages
                .first()
                .and_then(|m| m.get("total"))
                .and_then(total_as_usize)
                .unwrap_or(0);
            if cursor >= total {
                break;
            }
        }

        if records.len() >= MAX_PAGES * PAGE_SIZE {
            warn!(
                server = self.server.api_name(),
                "preprint pagination hit the page ceiling, window may be incomplete"
            );
        }

        Ok(records)
    }

    fn to_paper(&self, record: &PreprintRecord) -> Option<Paper> {
        let doi = Doi::parse(&record.doi).ok()?;
        let version = if record.version.is_empty() {
            "1"
        } else {
            &record.version
        };
        let content_url = format!(
            "https://{}/content/{}v{}",
            self.server.content_host(),
            doi.normalized,
            version,
        );

        let mut paper = Paper::new(doi.record_id(), self.server.source(), record.title.trim());
        paper.authors = normalize_authors(&record.authors);
        paper.journal = self.server.journal_label().to_string();
        if !record.date.is_empty() {
            paper.pub_date = record.date.clone();
        }
        paper.abstract_text = record.abstract_text.trim().to_string();
        paper.url = content_url.clone();
        paper.full_text_url = Some(format!("{content_url}.full.pdf"));
        paper.is_open_access = true;
        paper.doi = Some(doi.normalized.clone());
        Some(paper)
    }
}

fn total_as_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// The details API packs authors into one string, "Last, First M.; Last, First".
/// Render each as "Last FM" to match the PubMed author style.
fn normalize_authors(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|author| {
            let mut parts = author.splitn(2, ',');
            let last = parts.next().unwrap_or("").trim();
            match parts.next() {
                Some(given) => {
                    let initials: String = given
                        .split_whitespace()
                        .filter_map(|word| word.chars().next())
                        .filter(|c| c.is_alphabetic())
                        .flat_map(char::to_uppercase)
                        .collect();
                    if initials.is_empty() {
                        last.to_string()
                    } else {
                        format!("{last} {initials}")
                    }
                }
                None => last.to_string(),
            }
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for PreprintAdapter {
    fn name(&self) -> &str {
        self.server.api_name()
    }

    async fn search_and_fetch(
        &self,
        query: &str,
        max_results: u32,
        days_back: u32,
    ) -> Result<Vec<Paper>> {
        let matcher = QueryMatcher::parse(query);
        let records = self.fetch_window(days_back).await?;
        debug!(
            server = self.server.api_name(),
            fetched = records.len(),
            "filtering preprint window locally"
        );

        let papers = records
            .iter()
            .filter(|r| matcher.matches(&r.title, &r.abstract_text))
            .filter_map(|r| self.to_paper(r))
            .take(max_results as usize)
            .collect();
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn author_string_is_normalized() {
        let authors = normalize_authors("Doe, Jane A.; Smith, John; Nguyen, T. K.");
        assert_eq!(authors, vec!["Doe JA", "Smith J", "Nguyen TK"]);
    }

    #[test]
    fn author_without_comma_kept_verbatim() {
        assert_eq!(normalize_authors("BioProject Consortium"), vec!["BioProject Consortium"]);
    }

    fn record_json(doi: &str, title: &str) -> String {
        format!(
            r#"{{"doi":"{doi}","title":"{title}","authors":"Doe, Jane","date":"2024-02-10","version":"2","abstract":"We describe a new resource."}}"#
        )
    }

    #[tokio::test]
    async fn pages_until_total_reached_and_filters_locally() {
        let mut server = Server::new_async().await;

        let page0: String = format!(
            r#"{{"messages":[{{"total":"3"}}],"collection":[{},{}]}}"#,
            record_json("10.1101/2024.02.10.111111", "Single cell atlas of liver fibrosis"),
            record_json("10.1101/2024.02.10.222222", "Cardiac imaging in mice"),
        );
        let page1: String = format!(
            r#"{{"messages":[{{"total":"3"}}],"collection":[{}]}}"#,
            record_json("10.1101/2024.02.10.333333", "Liver organoid single cell screening"),
        );

        let _m0 = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/details/biorxiv/[0-9-]+/[0-9-]+/0$".to_string()),
            )
            .with_body(page0)
            .create_async()
            .await;
        let _m1 = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/details/biorxiv/[0-9-]+/[0-9-]+/2$".to_string()),
            )
            .with_body(page1)
            .create_async()
            .await;

        let adapter = PreprintAdapter::with_base_url(&server.url(), PreprintServer::Biorxiv);
        let papers = adapter
            .search_and_fetch("\"single cell\" liver", 10, 7)
            .await
            .unwrap();

        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].id, "doi:10.1101/2024.02.10.111111");
        assert_eq!(papers[1].id, "doi:10.1101/2024.02.10.333333");
        assert_eq!(papers[0].journal, "bioRxiv (preprint)");
        assert!(papers[0].is_open_access);
        assert_eq!(
            papers[0].url,
            "https://www.biorxiv.org/content/10.1101/2024.02.10.111111v2"
        );
    }

    #[tokio::test]
    async fn empty_collection_stops_pagination() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/details/medrxiv/.*/0$".to_string()),
            )
            .with_body(r#"{"messages":[{"total":"0"}],"collection":[]}"#)
            .create_async()
            .await;

        let adapter = PreprintAdapter::with_base_url(&server.url(), PreprintServer::Medrxiv);
        let papers = adapter.search_and_fetch("anything", 10, 7).await.unwrap();
        assert!(papers.is_empty());
    }
}
