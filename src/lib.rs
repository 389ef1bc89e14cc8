pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{archive::ArchiveFetcher, edgar::EdgarFetcher, storage::LocalStorage};
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::MapperConfig;
pub use core::{
    etl::EtlEngine,
    extract::{ExtractionRules, Extractor},
    pipeline::MappingPipeline,
    resolve::{MappingIndex, ResolutionPolicy, Resolver},
};
pub use domain::cusip::Cusip;
pub use domain::model::{CanonicalMapping, Cik, FilingReference, FilingType, RawPair};
pub use utils::error::{MappingError, Result};
