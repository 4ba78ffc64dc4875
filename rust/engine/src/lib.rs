//! Stagewright pipeline engine.
//!
//! Turns natural-language industrial control descriptions into staged,
//! validated, vendor-style Structured Text programs: input gating, flow
//! analysis, LLM-driven stage segregation, dependency checks, per-stage
//! validation and code generation, structured output parsing, project-wide
//! global-label unification, safety interrogation, and an append-only
//! version ledger with semantic-version increments.
//!
//! Transport, authentication UI, persistent storage, and report rendering
//! are external collaborators: storage plugs in behind the repository
//! traits in [`repo`], the LLM behind [`stagewright_llm::ChatClient`], and
//! manuals behind [`stagewright_retrieval::CorpusStore`].

#![warn(clippy::pedantic)]
#![allow(clippy::result_large_err)]
#![allow(clippy::missing_errors_doc)]

pub mod analyzer;
pub mod assistant;
pub mod dependencies;
pub mod error;
pub mod generate;
mod grounding;
pub mod input;
pub mod labels;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod parse;
pub mod repo;
pub mod segregate;
pub mod safety;
pub mod types;
pub mod validate;

pub use error::{EngineError, EngineResult, Entity};
pub use model::*;
pub use orchestrator::{Engine, PlanResult, Repositories};
pub use types::*;
