use tracing::{info, warn};

use litmon_core::{Config, Paper};

use crate::adapter::{SourceAdapter, SourceFailure};
use crate::preprints::{PreprintAdapter, PreprintServer};
use crate::pubmed::PubMedAdapter;

/// The raw harvest of one discovery pass: every paper the adapters returned
/// (duplicates included) plus every per-source failure encountered.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub papers: Vec<Paper>,
    pub failures: Vec<SourceFailure>,
}

/// Runs every configured query against every source adapter. Sources are
/// polled sequentially so each adapter's own rate limiter governs pacing; a
/// failing source never aborts its siblings.
pub struct DiscoveryPipeline {
    adapters: Vec<Box<dyn SourceAdapter>>,
    max_results_per_query: u32,
    days_lookback: u32,
}

impl DiscoveryPipeline {
    /// Assemble the standard adapter set from configuration: PubMed,
    /// bioRxiv, and (unless disabled) medRxiv.
    pub fn from_config(config: &Config) -> Self {
        let mut adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(PubMedAdapter::new(
                config.sources.ncbi_api_key.clone(),
                config.sources.ncbi_email.clone(),
            )),
            Box::new(PreprintAdapter::new(PreprintServer::Biorxiv)),
        ];
        if config.sources.include_medrxiv {
            adapters.push(Box::new(PreprintAdapter::new(PreprintServer::Medrxiv)));
        }
        Self {
            adapters,
            max_results_per_query: config.settings.max_results_per_query,
            days_lookback: config.settings.days_lookback,
        }
    }

    pub fn with_adapters(
        adapters: Vec<Box<dyn SourceAdapter>>,
        max_results_per_query: u32,
        days_lookback: u32,
    ) -> Self {
        Self {
            adapters,
            max_results_per_query,
            days_lookback,
        }
    }

    pub async fn run(&self, queries: &[String]) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();

        for adapter in &self.adapters {
            for query in queries {
                match adapter
                    .search_and_fetch(query, self.max_results_per_query, self.days_lookback)
                    .await
                {
                    Ok(papers) => {
                        info!(
                            source = adapter.name(),
                            query, found = papers.len(),
                            "source query complete"
                        );
                        outcome.papers.extend(papers);
                    }
                    Err(e) => {
                        warn!(source = adapter.name(), query, error = %e, "source query failed");
                        outcome.failures.push(SourceFailure {
                            source: adapter.name().to_string(),
                            query: query.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SourceError};
    use async_trait::async_trait;
    use litmon_core::PaperSource;

    struct FixedAdapter {
        name: &'static str,
        papers: Vec<Paper>,
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn name(&self) -> &str {
            self.name
        }

        async fn search_and_fetch(&self, _q: &str, _max: u32, _days: u32) -> Result<Vec<Paper>> {
            Ok(self.papers.clone())
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl SourceAdapter for FailingAdapter {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search_and_fetch(&self, _q: &str, _max: u32, _days: u32) -> Result<Vec<Paper>> {
            Err(SourceError::Api("broken".into(), "service down".into()))
        }
    }

    #[tokio::test]
    async fn failure_in_one_source_does_not_abort_others() {
        let ok = FixedAdapter {
            name: "pubmed",
            papers: vec![Paper::new("1", PaperSource::Pubmed, "a")],
        };
        let pipeline =
            DiscoveryPipeline::with_adapters(vec![Box::new(FailingAdapter), Box::new(ok)], 10, 7);

        let outcome = pipeline.run(&["liver".to_string()]).await;
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source, "broken");
        assert_eq!(outcome.failures[0].query, "liver");
    }

    #[tokio::test]
    async fn every_query_runs_against_every_adapter() {
        let a = FixedAdapter {
            name: "pubmed",
            papers: vec![Paper::new("1", PaperSource::Pubmed, "a")],
        };
        let b = FixedAdapter {
            name: "biorxiv",
            papers: vec![Paper::new("doi:10.1/x", PaperSource::Biorxiv, "b")],
        };
        let pipeline = DiscoveryPipeline::with_adapters(vec![Box::new(a), Box::new(b)], 10, 7);

        let queries = vec!["q1".to_string(), "q2".to_string()];
        let outcome = pipeline.run(&queries).await;
        // 2 adapters x 2 queries, one paper each.
        assert_eq!(outcome.papers.len(), 4);
        assert!(outcome.failures.is_empty());
    }
}
