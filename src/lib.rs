//! Regression analysis of auction-listing attributes against sale and
//! engagement outcomes.
//!
//! ```text
//!  file ─► data::loader ─► data::clean ─► glm::fit ─► report / export
//! ```
//!
//! [`pipeline`] strings the stages together for one [`config::AnalysisSpec`].

pub mod color;
pub mod config;
pub mod data;
pub mod export;
pub mod glm;
pub mod pipeline;
pub mod report;
