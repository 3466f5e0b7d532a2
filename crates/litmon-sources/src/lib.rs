//! litmon sources — PubMed and bioRxiv/medRxiv adapters, seed lookup,
//! identity resolution, and the multi-source discovery driver.

pub mod adapter;
pub mod discovery;
pub mod error;
pub mod http;
pub mod identifiers;
pub mod lookup;
pub mod preprints;
pub mod pubmed;
pub mod query;
pub mod resolver;
pub mod zotero;

pub use adapter::{SourceAdapter, SourceFailure};
pub use discovery::{DiscoveryOutcome, DiscoveryPipeline};
pub use error::{Result, SourceError};
pub use resolver::partition_new;
