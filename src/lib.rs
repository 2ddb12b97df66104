// src/lib.rs

pub mod analyzer;
pub mod chart;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod github;
pub mod glyphs;
pub mod graph_agent;
pub mod llm;
pub mod model;
pub mod normalize;
pub mod renderer;
pub mod session;
pub mod snapshot;
pub mod summary;
pub mod templates;
pub mod text_agent;
pub mod vector_index;

pub use error::{Error, Result};
pub use model::{CommitRecord, IssueRecord, PullRequestRecord, RepoId, RepoTables, Resource};
