//! Market sizing CLI
//!
//! Runs the pipeline phases against OpenAI and a web search provider and
//! prints each result as JSON.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_sizing::ai::OpenAiModel;
use market_sizing::searchers::{ExaSearcher, TavilySearcher};
use market_sizing::{
    ClarificationAnswer, Formula, MarketDescription, Pipeline, PipelineConfig, RateLimited,
    WebSearcher,
};

use crate::config::{Config, SearchProvider};

type CliPipeline = Pipeline<RateLimited<OpenAiModel>, RateLimited<Arc<dyn WebSearcher>>>;

#[derive(Parser)]
#[command(name = "market-sizing")]
#[command(about = "Estimate market sizes from sourced data points")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask which clarifications would sharpen the estimate
    Questions { description: String },

    /// Propose sizing formulas for a market
    Brainstorm {
        description: String,
        /// Clarification answer as `question=answer` (repeatable)
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<ClarificationAnswer>,
    },

    /// Describe each variable of a formula
    Decompose {
        #[arg(long)]
        formula: String,
    },

    /// Suggest data sources for each variable of a formula
    Sources {
        #[arg(long)]
        formula: String,
    },

    /// Decompose a formula and find data points for every variable
    Resolve {
        #[arg(long)]
        formula: String,
    },

    /// Run every phase and print the full report
    Run {
        description: String,
        /// Clarification answer as `question=answer` (repeatable)
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<ClarificationAnswer>,
    },
}

fn parse_answer(raw: &str) -> Result<ClarificationAnswer, String> {
    let (question, answer) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `question=answer`, got `{}`", raw))?;
    Ok(ClarificationAnswer::new(question.trim(), answer.trim()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,market_sizing=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pipeline = build_pipeline(&config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with completed work");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Questions { description } => {
            let description = MarketDescription::new(description)?;
            output(&pipeline.clarifying_questions(&description).await?)
        }
        Commands::Brainstorm {
            description,
            answers,
        } => {
            let description = MarketDescription::new(description)?;
            output(&pipeline.brainstorm(&description, &answers).await?)
        }
        Commands::Decompose { formula } => {
            let formula = parse_formula(&formula)?;
            output(&pipeline.decompose(&formula).await?)
        }
        Commands::Sources { formula } => {
            let formula = parse_formula(&formula)?;
            output(&pipeline.suggest_sources(&formula).await?)
        }
        Commands::Resolve { formula } => {
            let formula = parse_formula(&formula)?;
            let components = pipeline.decompose(&formula).await?;
            let resolutions = pipeline.resolve_components(&components, &cancel).await;
            output(&resolutions)
        }
        Commands::Run {
            description,
            answers,
        } => {
            let description = MarketDescription::new(description)?;
            output(&pipeline.run(&description, &answers, &cancel).await?)
        }
    }
}

fn build_pipeline(config: &Config) -> CliPipeline {
    let mut lm = OpenAiModel::new(config.openai_api_key.expose());
    if let Some(model) = &config.openai_model {
        lm = lm.with_model(model.clone());
    }
    if let Some(base_url) = &config.openai_base_url {
        lm = lm.with_base_url(base_url.clone());
    }

    let searcher: Arc<dyn WebSearcher> = match config.search_provider {
        SearchProvider::Exa => Arc::new(ExaSearcher::new(config.search_api_key.expose())),
        SearchProvider::Tavily => Arc::new(TavilySearcher::new(config.search_api_key.expose())),
    };

    let pipeline_config = PipelineConfig::default()
        .with_max_results(config.max_results)
        .with_concurrency(config.concurrency);

    Pipeline::new(
        RateLimited::new(lm, config.requests_per_second),
        RateLimited::new(searcher, config.requests_per_second),
    )
    .with_config(pipeline_config)
}

fn parse_formula(expression: &str) -> Result<Formula> {
    Formula::new(expression).context("Invalid formula")
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        let answer = parse_answer("Public schools only? = yes").unwrap();
        assert_eq!(answer.question, "Public schools only?");
        assert_eq!(answer.answer, "yes");

        assert!(parse_answer("no separator").is_err());
    }

    #[test]
    fn test_cli_parses_repeated_answers() {
        let cli = Cli::parse_from([
            "market-sizing",
            "run",
            "K-12 software",
            "--answer",
            "region=US",
            "--answer",
            "segment=public",
        ]);
        let Commands::Run { answers, .. } = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(answers.len(), 2);
    }
}
