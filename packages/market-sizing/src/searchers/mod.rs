//! Web searcher implementations.

#[cfg(feature = "exa")]
mod exa;
#[cfg(feature = "tavily")]
mod tavily;

#[cfg(feature = "exa")]
pub use exa::ExaSearcher;
#[cfg(feature = "tavily")]
pub use tavily::TavilySearcher;
