pub mod llm;
pub mod searcher;
