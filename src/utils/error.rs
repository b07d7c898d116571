use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Store error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Scraping error: {0}")]
    Scraping(String),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_pattern_error_conversion() {
        let re_err = regex::Regex::new("[").unwrap_err();
        let app_err: AppError = re_err.into();
        assert!(matches!(app_err, AppError::Pattern(_)));
    }

    #[test]
    fn test_scraping_error_display() {
        let err = AppError::Scraping("detail page has no price block".to_string());
        assert_eq!(
            err.to_string(),
            "Scraping error: detail page has no price block"
        );
    }
}
