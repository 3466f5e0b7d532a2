use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use tracing::{debug, warn};

use litmon_core::{Paper, PaperSource};

use crate::adapter::SourceAdapter;
use crate::error::{Result, SourceError};
use crate::http::RateLimitedClient;

const BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const PUBMED_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// NCBI caps efetch requests at 200 ids per call.
const FETCH_BATCH_SIZE: usize = 200;

/// PubMed adapter over the NCBI E-utilities: esearch resolves a query and
/// date window to PMIDs, efetch returns article XML in batches.
pub struct PubMedAdapter {
    client: RateLimitedClient,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMedAdapter {
    pub fn new(api_key: Option<String>, email: Option<String>) -> Self {
        Self::with_base_url(BASE_URL, api_key, email)
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>, email: Option<String>) -> Self {
        // 3 req/s without an API key, 10 req/s with one; stay conservative.
        let min_interval = if api_key.is_some() {
            Duration::from_millis(150)
        } else {
            Duration::from_millis(500)
        };
        Self {
            client: RateLimitedClient::new(min_interval, 3, "litmon/0.1"),
            base_url: base_url.to_string(),
            api_key,
            email,
        }
    }

    fn auth_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(key) = &self.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email".to_string(), email.clone()));
        }
        params
    }

    /// Search PubMed, returning matching PMIDs for the last `days_back` days.
    pub async fn search(&self, query: &str, max_results: u32, days_back: u32) -> Result<Vec<String>> {
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(i64::from(days_back));
        let date_range = format!(
            "{}:{}[EDAT]",
            start.format("%Y/%m/%d"),
            end.format("%Y/%m/%d")
        );
        let full_query = format!("({query}) AND {date_range}");
        self.search_term(&full_query, max_results).await
    }

    /// Raw esearch with no date window. Used for identifier lookups such as
    /// `<doi>[DOI]`.
    pub async fn search_term(&self, term: &str, max_results: u32) -> Result<Vec<String>> {
        let mut params = self.auth_params();
        params.push(("db".to_string(), "pubmed".to_string()));
        params.push(("term".to_string(), term.to_string()));
        params.push(("retmax".to_string(), max_results.to_string()));
        params.push(("retmode".to_string(), "json".to_string()));
        params.push(("sort".to_string(), "relevance".to_string()));

        let url = format!("{}/esearch.fcgi", self.base_url);
        let body: Value = self.client.get_json_with_query(&url, params).await?;

        let result = &body["esearchresult"];
        if let Some(err) = result.get("ERROR").and_then(Value::as_str) {
            return Err(SourceError::Api("pubmed".to_string(), err.to_string()));
        }

        let pmids = result["idlist"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let total = result["count"]
            .as_str()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        if total > max_results {
            debug!(total, max_results, "pubmed search truncated to requested maximum");
        }

        Ok(pmids)
    }

    /// Fetch full metadata for a list of PMIDs, batched per the NCBI limit.
    pub async fn fetch_papers(&self, pmids: &[String]) -> Result<Vec<Paper>> {
        let mut papers = Vec::new();
        for batch in pmids.chunks(FETCH_BATCH_SIZE) {
            let mut params = self.auth_params();
            params.push(("db".to_string(), "pubmed".to_string()));
            params.push(("id".to_string(), batch.join(",")));
            params.push(("rettype".to_string(), "xml".to_string()));
            params.push(("retmode".to_string(), "xml".to_string()));

            let url = format!("{}/efetch.fcgi", self.base_url);
            let xml = self.client.get_with_query(&url, params).await?;
            papers.extend(parse_efetch_xml(&xml));
        }
        Ok(papers)
    }
}

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn name(&self) -> &str {
        "pubmed"
    }

    async fn search_and_fetch(
        &self,
        query: &str,
        max_results: u32,
        days_back: u32,
    ) -> Result<Vec<Paper>> {
        let pmids = self.search(query, max_results, days_back).await?;
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_papers(&pmids).await
    }
}

// ─── efetch XML parsing ──────────────────────────────────────────────────────

#[derive(Default)]
struct ArticleBuilder {
    pmid: String,
    title: String,
    authors: Vec<String>,
    last_name: String,
    initials: String,
    journal_title: String,
    journal_iso: String,
    article_date: DateParts,
    pub_date: DateParts,
    abstract_parts: Vec<String>,
    abstract_label: Option<String>,
    abstract_buf: String,
    doi: Option<String>,
    pmc_id: Option<String>,
    article_id_type: Option<String>,
}

#[derive(Default)]
struct DateParts {
    year: String,
    month: String,
    day: String,
}

impl DateParts {
    fn to_iso(&self) -> Option<String> {
        if self.year.is_empty() {
            return None;
        }
        let month = normalize_month(&self.month);
        let day = if self.day.is_empty() {
            "01".to_string()
        } else {
            format!("{:0>2}", self.day)
        };
        Some(format!("{}-{}-{}", self.year, month, day))
    }
}

fn normalize_month(month: &str) -> String {
    let mapped = match month {
        "Jan" => "01",
        "Feb" => "02",
        "Mar" => "03",
        "Apr" => "04",
        "May" => "05",
        "Jun" => "06",
        "Jul" => "07",
        "Aug" => "08",
        "Sep" => "09",
        "Oct" => "10",
        "Nov" => "11",
        "Dec" => "12",
        "" => "01",
        other => other,
    };
    format!("{mapped:0>2}")
}

impl ArticleBuilder {
    fn finish(mut self) -> Option<Paper> {
        if self.pmid.is_empty() {
            return None;
        }

        let journal = if !self.journal_title.is_empty() {
            self.journal_title
        } else {
            self.journal_iso
        };

        // Electronic publication date first, journal issue date as fallback.
        let pub_date = self
            .article_date
            .to_iso()
            .or_else(|| self.pub_date.to_iso())
            .unwrap_or_else(|| "Unknown".to_string());

        let full_text_url = self
            .pmc_id
            .as_deref()
            .map(|pmc| format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{pmc}/"));

        let mut paper = Paper::new(
            std::mem::take(&mut self.pmid),
            PaperSource::Pubmed,
            self.title.trim(),
        );
        paper.authors = self.authors;
        paper.journal = journal;
        paper.pub_date = pub_date;
        paper.abstract_text = self.abstract_parts.join(" ");
        paper.url = format!("{PUBMED_URL}/{}/", paper.id);
        paper.is_open_access = self.pmc_id.is_some();
        paper.full_text_url = full_text_url;
        paper.doi = self.doi;
        Some(paper)
    }
}

/// Parse a PubmedArticleSet efetch payload. Articles that fail to parse are
/// skipped with a warning; they never fail the batch.
pub fn parse_efetch_xml(xml: &str) -> Vec<Paper> {
    let mut reader = Reader::from_str(xml);

    let mut papers = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut article: Option<ArticleBuilder> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                if name == "PubmedArticle" {
                    article = Some(ArticleBuilder::default());
                }

                if let Some(a) = article.as_mut() {
                    match name.as_str() {
                        "AbstractText" if path.iter().any(|p| p == "Abstract") => {
                            a.abstract_label = e
                                .attributes()
                                .flatten()
                                .find(|attr| attr.key.as_ref() == b"Label")
                                .and_then(|attr| {
                                    String::from_utf8(attr.value.to_vec()).ok()
                                });
                            a.abstract_buf.clear();
                        }
                        "ArticleId" => {
                            a.article_id_type = e
                                .attributes()
                                .flatten()
                                .find(|attr| attr.key.as_ref() == b"IdType")
                                .and_then(|attr| {
                                    String::from_utf8(attr.value.to_vec()).ok()
                                });
                        }
                        "Author" => {
                            a.last_name.clear();
                            a.initials.clear();
                        }
                        _ => {}
                    }
                }

                path.push(name);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                path.pop();

                if let Some(a) = article.as_mut() {
                    match name.as_str() {
                        "Author" => {
                            if !a.last_name.is_empty() {
                                let display =
                                    format!("{} {}", a.last_name, a.initials).trim().to_string();
                                a.authors.push(display);
                            }
                        }
                        "AbstractText" => {
                            let text = a.abstract_buf.trim().to_string();
                            if !text.is_empty() {
                                match a.abstract_label.take() {
                                    Some(label) => a.abstract_parts.push(format!("{label}: {text}")),
                                    None => a.abstract_parts.push(text),
                                }
                            }
                            a.abstract_buf.clear();
                        }
                        "ArticleId" => {
                            a.article_id_type = None;
                        }
                        _ => {}
                    }
                }

                if name == "PubmedArticle" {
                    if let Some(paper) = article.take().and_then(ArticleBuilder::finish) {
                        papers.push(paper);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let raw = e.unescape().unwrap_or_default().to_string();

                if let Some(a) = article.as_mut() {
                    let parent = path.last().map(String::as_str).unwrap_or("");
                    let grandparent = path
                        .len()
                        .checked_sub(2)
                        .map(|i| path[i].as_str())
                        .unwrap_or("");

                    // Titles and abstracts can carry inline markup, so their
                    // text arrives in pieces; keep interior whitespace intact.
                    if path.iter().any(|p| p == "ArticleTitle") {
                        a.title.push_str(&raw);
                        buf.clear();
                        continue;
                    }
                    if path.iter().any(|p| p == "AbstractText") {
                        a.abstract_buf.push_str(&raw);
                        buf.clear();
                        continue;
                    }

                    let text = raw.trim().to_string();
                    if text.is_empty() {
                        buf.clear();
                        continue;
                    }

                    if parent == "PMID" && grandparent == "MedlineCitation" {
                        a.pmid = text;
                    } else if parent == "LastName" && grandparent == "Author" {
                        a.last_name = text;
                    } else if parent == "Initials" && grandparent == "Author" {
                        a.initials = text;
                    } else if parent == "Title" && grandparent == "Journal" {
                        a.journal_title = text;
                    } else if parent == "ISOAbbreviation" && grandparent == "Journal" {
                        a.journal_iso = text;
                    } else if grandparent == "ArticleDate" {
                        match parent {
                            "Year" => a.article_date.year = text,
                            "Month" => a.article_date.month = text,
                            "Day" => a.article_date.day = text,
                            _ => {}
                        }
                    } else if grandparent == "PubDate" {
                        match parent {
                            "Year" => a.pub_date.year = text,
                            "Month" => a.pub_date.month = text,
                            "Day" => a.pub_date.day = text,
                            _ => {}
                        }
                    } else if parent == "ArticleId" {
                        match a.article_id_type.as_deref() {
                            Some("doi") => a.doi = Some(text),
                            Some("pmc") => a.pmc_id = Some(text),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "efetch XML parse error, returning articles parsed so far");
                break;
            }
        }
        buf.clear();
    }

    papers
}
