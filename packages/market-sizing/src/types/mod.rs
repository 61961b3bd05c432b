pub mod component;
pub mod config;
pub mod data_point;
pub mod estimate;
pub mod formula;
pub mod resolution;
