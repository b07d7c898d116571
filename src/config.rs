use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::collector::VendorConfig;
use crate::matcher::MatcherConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    /// Tax rate used when a vendor block does not override it.
    pub tax_rate: f64,
    /// Vendor passes run in this order.
    pub vendors: Vec<VendorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Per-vendor CSV stores and run exports live under this dir.
    pub data_dir: PathBuf,
    /// Cached records younger than this are not re-fetched.
    pub cache_ttl_days: i64,
    /// Buffered records per automatic batch flush.
    pub save_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub request_timeout: u64,
    pub user_agent: String,
    pub chrome_path: Option<String>,
    /// Randomized delay between consecutive item fetches, to avoid
    /// burst patterns against vendor sites. Zero max disables it.
    pub item_delay_min_ms: u64,
    pub item_delay_max_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "VIGIE_"
            .add_source(Environment::with_prefix("VIGIE").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.cache_ttl_days < 0 {
            return Err(ConfigError::Message("store.cache_ttl_days cannot be negative".into()));
        }

        if self.store.save_threshold == 0 {
            return Err(ConfigError::Message("store.save_threshold must be greater than 0".into()));
        }

        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(ConfigError::Message("tax_rate must be in [0, 1)".into()));
        }

        if self.matcher.min_token_len == 0 {
            return Err(ConfigError::Message("matcher.min_token_len must be greater than 0".into()));
        }

        for weight in [self.matcher.code_weight, self.matcher.title_weight] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::Message("matcher weights must be in [0, 1]".into()));
            }
        }

        if self.scraper.item_delay_min_ms > self.scraper.item_delay_max_ms {
            return Err(ConfigError::Message(
                "scraper.item_delay_min_ms cannot exceed item_delay_max_ms".into(),
            ));
        }

        if self.vendors.is_empty() {
            return Err(ConfigError::Message("at least one vendor must be configured".into()));
        }

        for vendor in &self.vendors {
            if vendor.name.trim().is_empty() {
                return Err(ConfigError::Message("vendor name cannot be empty".into()));
            }
            if !vendor.entry_url.contains("{reference}") {
                return Err(ConfigError::Message(format!(
                    "vendor '{}' entry_url must contain a {{reference}} placeholder",
                    vendor.name
                )));
            }
            if !(0.0..=1.0).contains(&vendor.match_cutoff) {
                return Err(ConfigError::Message(format!(
                    "vendor '{}' match_cutoff must be in [0, 1]",
                    vendor.name
                )));
            }
            if vendor.max_retries == 0 {
                return Err(ConfigError::Message(format!(
                    "vendor '{}' max_retries must be greater than 0",
                    vendor.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::VendorSelectors;

    fn valid_config() -> AppConfig {
        AppConfig {
            store: StoreConfig {
                data_dir: PathBuf::from("data"),
                cache_ttl_days: 7,
                save_threshold: 500,
            },
            scraper: ScraperConfig {
                request_timeout: 30,
                user_agent: "Vigie/0.1".to_string(),
                chrome_path: None,
                item_delay_min_ms: 500,
                item_delay_max_ms: 2_000,
            },
            matcher: MatcherConfig::default(),
            tax_rate: 0.21,
            vendors: vec![VendorConfig {
                name: "toolnation".to_string(),
                entry_url: "https://example.com/search?q={reference}".to_string(),
                enabled: None,
                use_browser: false,
                use_article_index: true,
                match_cutoff: 0.70,
                max_retries: 3,
                retry_delay_ms: 5_000,
                tax_rate: None,
                selectors: VendorSelectors {
                    consent_button: None,
                    result_link: Some(".result a".to_string()),
                    title: "h1.product-title".to_string(),
                    displayed_reference: Some(".sku".to_string()),
                    price_excl_tax: Some(".price-excl".to_string()),
                    price_incl_tax: None,
                    stock: Some(".stock".to_string()),
                    offer: None,
                },
            }],
        }
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_threshold() {
        let mut config = valid_config();
        config.store.save_threshold = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("save_threshold"));
    }

    #[test]
    fn test_config_validation_negative_ttl() {
        let mut config = valid_config();
        config.store.cache_ttl_days = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_tax_rate() {
        let mut config = valid_config();
        config.tax_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_missing_placeholder() {
        let mut config = valid_config();
        config.vendors[0].entry_url = "https://example.com/search".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("{reference}"));
    }

    #[test]
    fn test_config_validation_bad_cutoff() {
        let mut config = valid_config();
        config.vendors[0].match_cutoff = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_no_vendors() {
        let mut config = valid_config();
        config.vendors.clear();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least one vendor"));
    }

    #[test]
    fn test_config_validation_inverted_delays() {
        let mut config = valid_config();
        config.scraper.item_delay_min_ms = 5_000;
        config.scraper.item_delay_max_ms = 1_000;
        assert!(config.validate().is_err());
    }
}
