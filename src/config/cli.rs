use crate::config::toml_config::{MapperConfig, SourceType};
use crate::domain::model::FilingType;
use crate::utils::error::Result;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "cik-cusip")]
#[command(about = "Builds a CIK to CUSIP mapping from Schedule 13D/13G filings")]
pub struct CliConfig {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory holding downloaded filings
    #[arg(long)]
    pub archive_path: Option<String>,

    /// EDGAR master.idx listing the filings to process
    #[arg(long)]
    pub master_index: Option<String>,

    /// Fetch filings from EDGAR instead of the local archive
    #[arg(long)]
    pub edgar: bool,

    /// Download the quarterly EDGAR indexes from this year on
    #[arg(long)]
    pub index_start_year: Option<i32>,

    #[arg(long)]
    pub index_start_quarter: Option<u32>,

    /// Keep downloaded filings here and skip those already present
    #[arg(long)]
    pub cache_path: Option<String>,

    /// Contact string sent to EDGAR, e.g. "Jane Smith jane@example.com"
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Filing types to process, e.g. "13D,13G/A"
    #[arg(long, value_delimiter = ',')]
    pub filing_types: Vec<FilingType>,

    #[arg(long)]
    pub output_path: Option<String>,

    #[arg(long)]
    pub concurrent_documents: Option<usize>,

    /// Add raw_pairs.csv to the archive
    #[arg(long)]
    pub include_raw_pairs: bool,

    /// Log JSON lines instead of compact text
    #[arg(long)]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Log CPU and memory usage per phase
    #[arg(long)]
    pub monitor: bool,

    /// List the filings that would be processed and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl CliConfig {
    /// Reads the configuration file, if any, and applies the flags on top.
    pub fn load(&self) -> Result<MapperConfig> {
        let mut config = match &self.config {
            Some(path) => MapperConfig::from_file(path)?,
            None => MapperConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }

    fn apply_to(&self, config: &mut MapperConfig) {
        if self.edgar {
            config.source.r#type = SourceType::Edgar;
        }
        if let Some(path) = &self.archive_path {
            config.source.archive_path = path.clone();
        }
        if let Some(index) = &self.master_index {
            config.source.master_index = Some(index.clone());
        }
        if let Some(year) = self.index_start_year {
            config.source.index_start_year = Some(year);
        }
        if let Some(quarter) = self.index_start_quarter {
            config.source.index_start_quarter = quarter;
        }
        if let Some(path) = &self.cache_path {
            config.source.cache_path = Some(path.clone());
        }
        if let Some(agent) = &self.user_agent {
            config.source.user_agent = Some(agent.clone());
        }
        if !self.filing_types.is_empty() {
            config.source.filing_types = self.filing_types.clone();
        }
        if let Some(path) = &self.output_path {
            config.load.output_path = path.clone();
        }
        if let Some(workers) = self.concurrent_documents {
            config.extract.concurrent_documents = workers;
        }
        if self.include_raw_pairs {
            config.load.include_raw_pairs = true;
        }
        if self.json_logs {
            config.monitoring.json_logs = true;
        }
        if self.monitor {
            config.monitoring.enabled = true;
        }
    }
}
