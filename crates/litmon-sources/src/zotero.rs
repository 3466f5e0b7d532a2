use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use litmon_core::{Paper, PaperSource, PaperStore};

use crate::error::Result;
use crate::http::RateLimitedClient;
use crate::identifiers::{zotero_record_id, Doi};

const BASE_URL: &str = "https://api.zotero.org";
const PAGE_LIMIT: usize = 100;
const MAX_PAGES: usize = 100;

/// Imports a Zotero user library as seed papers. Only journal articles are
/// requested; each becomes a starred seed with origin `zotero_import`.
pub struct ZoteroImporter {
    client: RateLimitedClient,
    base_url: String,
    user_id: String,
    api_key: String,
}

impl ZoteroImporter {
    pub fn new(user_id: &str, api_key: &str) -> Self {
        Self::with_base_url(BASE_URL, user_id, api_key)
    }

    pub fn with_base_url(base_url: &str, user_id: &str, api_key: &str) -> Self {
        Self {
            client: RateLimitedClient::new(Duration::from_millis(500), 3, "litmon/0.1"),
            base_url: base_url.to_string(),
            user_id: user_id.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Walk the library and insert every convertible item as a seed.
    /// Returns `(fetched, inserted)`; items already stored count as fetched
    /// but are promoted in place rather than re-inserted.
    pub async fn import(&self, store: &PaperStore) -> Result<(u32, u32)> {
        let mut fetched = 0u32;
        let mut inserted = 0u32;

        for page in 0..MAX_PAGES {
            let start = page * PAGE_LIMIT;
            let url = format!("{}/users/{}/items", self.base_url, self.user_id);
            let params = [
                ("itemType".to_string(), "journalArticle".to_string()),
                ("format".to_string(), "json".to_string()),
                ("limit".to_string(), PAGE_LIMIT.to_string()),
                ("start".to_string(), start.to_string()),
                ("key".to_string(), self.api_key.clone()),
            ];
            let items: Vec<Value> = self.client.get_json_with_query(&url, params).await?;
            let page_len = items.len();

            for item in &items {
                let Some(paper) = item_to_paper(item) else {
                    continue;
                };
                fetched += 1;
                if store.insert_seed(&paper, "zotero_import")? {
                    inserted += 1;
                }
            }

            if page_len < PAGE_LIMIT {
                break;
            }
        }

        debug!(fetched, inserted, "zotero import complete");
        Ok((fetched, inserted))
    }
}

/// Convert one Zotero item to a paper. Items without a title are skipped.
/// The record id is the DOI when the item has a valid one, otherwise the
/// Zotero item key.
fn item_to_paper(item: &Value) -> Option<Paper> {
    let key = item["key"].as_str()?;
    let data = &item["data"];
    let title = data["title"].as_str().filter(|t| !t.trim().is_empty())?;

    let doi = data["DOI"]
        .as_str()
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| match Doi::parse(d) {
            Ok(doi) => Some(doi),
            Err(_) => {
                warn!(key, doi = d, "zotero item carries an unparseable DOI, keying by item key");
                None
            }
        });
    let id = doi
        .as_ref()
        .map(Doi::record_id)
        .unwrap_or_else(|| zotero_record_id(key));

    let authors = data["creators"]
        .as_array()
        .map(|creators| {
            creators
                .iter()
                .filter(|c| {
                    c["creatorType"]
                        .as_str()
                        .map(|t| t == "author")
                        .unwrap_or(true)
                })
                .filter_map(|c| {
                    if let Some(last) = c["lastName"].as_str() {
                        let initials: String = c["firstName"]
                            .as_str()
                            .unwrap_or("")
                            .split_whitespace()
                            .filter_map(|w| w.chars().next())
                            .collect();
                        Some(if initials.is_empty() {
                            last.to_string()
                        } else {
                            format!("{last} {initials}")
                        })
                    } else {
                        c["name"].as_str().map(ToOwned::to_owned)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut paper = Paper::new(id, PaperSource::Zotero, title.trim());
    paper.authors = authors;
    paper.journal = data["publicationTitle"].as_str().unwrap_or("").to_string();
    if let Some(date) = data["date"].as_str().filter(|d| !d.trim().is_empty()) {
        paper.pub_date = date.to_string();
    }
    paper.abstract_text = data["abstractNote"].as_str().unwrap_or("").to_string();
    paper.url = match &doi {
        Some(doi) => doi.url(),
        None => data["url"].as_str().unwrap_or("").to_string(),
    };
    paper.doi = doi.map(|d| d.normalized);
    Some(paper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn item_with_doi_is_keyed_by_doi() {
        let item = json!({
            "key": "ABCD1234",
            "data": {
                "itemType": "journalArticle",
                "title": "Bile acid signalling in cholestasis",
                "creators": [
                    {"creatorType": "author", "firstName": "Maria", "lastName": "Lopez"},
                    {"creatorType": "editor", "firstName": "X", "lastName": "Ignored"}
                ],
                "publicationTitle": "Hepatology",
                "date": "2023-06-01",
                "abstractNote": "FXR signalling is altered.",
                "DOI": "10.1002/hep.12345"
            }
        });
        let paper = item_to_paper(&item).unwrap();
        assert_eq!(paper.id, "doi:10.1002/hep.12345");
        assert_eq!(paper.source, PaperSource::Zotero);
        assert_eq!(paper.authors, vec!["Lopez M"]);
        assert_eq!(paper.journal, "Hepatology");
        assert_eq!(paper.url, "https://doi.org/10.1002/hep.12345");
        assert_eq!(paper.doi.as_deref(), Some("10.1002/hep.12345"));
    }

    #[test]
    fn item_without_doi_is_keyed_by_item_key() {
        let item = json!({
            "key": "ZXY98765",
            "data": {
                "itemType": "journalArticle",
                "title": "Untracked report",
                "url": "https://example.org/report"
            }
        });
        let paper = item_to_paper(&item).unwrap();
        assert_eq!(paper.id, "zotero:ZXY98765");
        assert_eq!(paper.url, "https://example.org/report");
        assert!(paper.doi.is_none());
    }

    #[test]
    fn untitled_item_is_skipped() {
        let item = json!({"key": "K", "data": {"title": "  "}});
        assert!(item_to_paper(&item).is_none());
    }

    #[tokio::test]
    async fn import_paginates_and_seeds_store() {
        let mut server = Server::new_async().await;
        let _page = server
            .mock("GET", "/users/12345/items")
            .match_query(Matcher::UrlEncoded("start".into(), "0".into()))
            .with_body(
                json!([{
                    "key": "ABCD1234",
                    "data": {
                        "itemType": "journalArticle",
                        "title": "Seeded paper",
                        "DOI": "10.1/seed"
                    }
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let store = PaperStore::open_in_memory().unwrap();
        let importer = ZoteroImporter::with_base_url(&server.url(), "12345", "test-key");
        let (fetched, inserted) = importer.import(&store).await.unwrap();

        assert_eq!((fetched, inserted), (1, 1));
        let seeds = store.seed_papers().unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].id, "doi:10.1/seed");
        assert!(seeds[0].is_seed);
        assert_eq!(seeds[0].seed_origin.as_deref(), Some("zotero_import"));
    }
}
