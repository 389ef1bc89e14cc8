use crate::core::extract::ExtractionRules;
use crate::core::resolve::ResolutionPolicy;
use crate::domain::model::FilingType;
use crate::utils::error::{MappingError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub source: SourceConfig,
    pub extract: ExtractConfig,
    pub resolve: ResolutionPolicy,
    pub load: LoadConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Filings already downloaded to disk.
    #[default]
    Archive,
    /// Filings fetched from EDGAR, listed by a master index file or by the
    /// quarterly indexes downloaded from `index_start_year` on.
    Edgar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub r#type: SourceType,
    pub archive_path: String,
    /// EDGAR `master.idx`. Read as the filing list, or written when the
    /// edgar source downloads the indexes itself.
    pub master_index: Option<String>,
    /// First year of quarterly indexes the edgar source downloads.
    pub index_start_year: Option<i32>,
    pub index_start_quarter: u32,
    /// Keeps EDGAR downloads in the archive layout; cached filings are not requested again.
    pub cache_path: Option<String>,
    pub filing_types: Vec<FilingType>,
    pub base_url: String,
    /// EDGAR rejects requests without a contact in the user agent.
    pub user_agent: Option<String>,
    pub rate_limit_per_second: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            r#type: SourceType::Archive,
            archive_path: "./data_dir".to_string(),
            master_index: None,
            index_start_year: None,
            index_start_quarter: 1,
            cache_path: None,
            filing_types: FilingType::ALL.to_vec(),
            base_url: "https://www.sec.gov/Archives/".to_string(),
            user_agent: None,
            rate_limit_per_second: 10,
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub concurrent_documents: usize,
    #[serde(flatten)]
    pub rules: ExtractionRules,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            concurrent_documents: 8,
            rules: ExtractionRules::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub output_path: String,
    pub archive_name: String,
    pub output_formats: Vec<String>,
    /// Adds `raw_pairs.csv` with every extracted observation.
    pub include_raw_pairs: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            archive_name: "cik_cusip.zip".to_string(),
            output_formats: vec!["csv".to_string(), "json".to_string()],
            include_raw_pairs: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub json_logs: bool,
}

impl MapperConfig {
    /// Loads a configuration file; missing sections take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(MappingError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| MappingError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value, leaving unknown variables untouched.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let pattern = r"\$\{([^}]+)\}";
        let re = Regex::new(pattern).map_err(|e| MappingError::pattern(pattern, e))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        let source = &self.source;
        match source.r#type {
            SourceType::Archive => {
                validation::validate_path("source.archive_path", &source.archive_path)?;
            }
            SourceType::Edgar => {
                validation::validate_url("source.base_url", &source.base_url)?;
                let agent = validation::validate_required_field("source.user_agent", &source.user_agent)?;
                validation::validate_user_agent("source.user_agent", agent)?;
                match source.index_start_year {
                    Some(year) => {
                        // Quarterly full indexes start in 1993.
                        validation::validate_range("source.index_start_year", year, 1993, 2100)?;
                        validation::validate_range("source.index_start_quarter", source.index_start_quarter, 1, 4)?;
                    }
                    None => {
                        validation::validate_required_field("source.master_index", &source.master_index)?;
                    }
                }
                if let Some(index) = &source.master_index {
                    validation::validate_path("source.master_index", index)?;
                }
                if let Some(cache) = &source.cache_path {
                    validation::validate_path("source.cache_path", cache)?;
                }
            }
        }
        if source.filing_types.is_empty() {
            return Err(MappingError::InvalidConfigValueError {
                field: "source.filing_types".to_string(),
                value: "[]".to_string(),
                reason: "At least one filing type is required".to_string(),
            });
        }
        // EDGAR's fair access policy allows at most 10 requests per second.
        validation::validate_range("source.rate_limit_per_second", source.rate_limit_per_second, 1, 10)?;
        validation::validate_at_least(
            "source.timeout_seconds",
            source.timeout_seconds as usize,
            1,
        )?;

        let extract = &self.extract;
        validation::validate_at_least(
            "extract.concurrent_documents",
            extract.concurrent_documents,
            1,
        )?;
        validation::validate_at_least(
            "extract.lookahead_tokens",
            extract.rules.lookahead_tokens,
            1,
        )?;
        if extract.rules.caption_patterns.is_empty() {
            return Err(MappingError::MissingConfigError {
                field: "extract.caption_patterns".to_string(),
            });
        }
        validation::validate_patterns("extract.caption_patterns", &extract.rules.caption_patterns)?;
        validation::validate_patterns(
            "extract.boilerplate_patterns",
            &extract.rules.boilerplate_patterns,
        )?;
        for length in &extract.rules.cusip.allowed_lengths {
            validation::validate_range("extract.cusip.allowed_lengths", *length, 6, 9)?;
        }

        let resolve = &self.resolve;
        validation::validate_at_least(
            "resolve.min_corroborating_observations",
            resolve.min_corroborating_observations as usize,
            1,
        )?;
        validation::validate_range(
            "resolve.corroboration_ratio",
            resolve.corroboration_ratio,
            1.0,
            1000.0,
        )?;
        if let Some(days) = resolve.max_challenger_gap_days {
            validation::validate_range("resolve.max_challenger_gap_days", days, 0, 36_500)?;
        }

        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_non_empty_string("load.archive_name", &self.load.archive_name)?;
        let valid_formats = ["csv", "json"];
        for format in &self.load.output_formats {
            if !valid_formats.contains(&format.as_str()) {
                return Err(MappingError::InvalidConfigValueError {
                    field: "load.output_formats".to_string(),
                    value: format.clone(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        valid_formats.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn output_path(&self) -> &str {
        &self.load.output_path
    }

    pub fn concurrent_documents(&self) -> usize {
        self.extract.concurrent_documents
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }

    pub fn writes_format(&self, format: &str) -> bool {
        self.load.output_formats.iter().any(|f| f == format)
    }
}

impl Validate for MapperConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
