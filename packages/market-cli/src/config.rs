use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use market_sizing::SecretString;
use std::env;

/// Which web search provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProvider {
    Exa,
    Tavily,
}

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: SecretString,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub search_provider: SearchProvider,
    pub search_api_key: SecretString,
    pub max_results: usize,
    pub concurrency: usize,
    pub requests_per_second: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let search_provider = match env::var("SEARCH_PROVIDER")
            .unwrap_or_else(|_| "exa".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "exa" => SearchProvider::Exa,
            "tavily" => SearchProvider::Tavily,
            other => bail!("SEARCH_PROVIDER must be `exa` or `tavily`, got `{}`", other),
        };

        let search_api_key = match search_provider {
            SearchProvider::Exa => env::var("EXA_API_KEY").context("EXA_API_KEY must be set")?,
            SearchProvider::Tavily => {
                env::var("TAVILY_API_KEY").context("TAVILY_API_KEY must be set")?
            }
        };

        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?
                .into(),
            openai_model: env::var("OPENAI_MODEL").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            search_provider,
            search_api_key: search_api_key.into(),
            max_results: env::var("MARKET_SIZING_MAX_RESULTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("MARKET_SIZING_MAX_RESULTS must be a valid number")?,
            concurrency: env::var("MARKET_SIZING_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("MARKET_SIZING_CONCURRENCY must be a valid number")?,
            requests_per_second: env::var("MARKET_SIZING_REQUESTS_PER_SECOND")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("MARKET_SIZING_REQUESTS_PER_SECOND must be a valid number")?,
        })
    }
}
