//! News chatbot stack
//!
//! Declares a knowledge-base chatbot on top of `stackweave-core`: a query
//! function behind a public api, a static website behind a distribution,
//! and (in the ingestion variant) a scheduled fetcher that writes news
//! articles into a versioned data bucket.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stackweave_chatbot::{synthesize_stack, ProcessEnv, StackVariant};
//!
//! let artifact = synthesize_stack(&ProcessEnv, None, StackVariant::Ingestion)?;
//! println!("{}", artifact.to_json_pretty()?);
//! ```

pub mod config;
pub mod contracts;
pub mod stack;

pub use config::{ConfigError, ConfigOverlay, EnvSource, ProcessEnv, StackConfig};
pub use contracts::{
    dispatch_query, ChatRequest, ChatResponse, Citation, Contract, ContractError, HealthStatus, IngestionHandler,
    IngestionReport, QueryHandler,
};
pub use stack::{
    check_contracts, declare_stack, synthesize_stack, synthesize_with, ContractMismatch, StackError, StackVariant,
};
