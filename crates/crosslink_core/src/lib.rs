//! Core engine for cross-linking a markdown article corpus: phrase
//! extraction from titles, a globally ordered candidate index, and the
//! structure-aware link injector, plus the local store, remote sync, and
//! the persisted link graph that the CLI drives.

pub mod config;
pub mod corpus;
pub mod graph;
pub mod inject;
pub mod phrases;
pub mod pipeline;
pub mod remote;
pub mod runtime;
pub mod store;
