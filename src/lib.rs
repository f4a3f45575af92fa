//! Rolling-form feature engine for football match outcome prediction.
//!
//! Match history flows from API-Football through the SQLite [`store`] into
//! validated [`model::Match`] values ([`ingest`]). The [`form`] calculator and
//! the [`features`] assembler turn that history into fixed-order feature
//! vectors, used both to build training matrices ([`training`], [`export`])
//! and to score upcoming fixtures with a fitted model ([`classifier`],
//! [`predict`]). Scored predictions are checked against results in
//! [`tracking`].

pub mod api_football;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod form;
pub mod http_cache;
pub mod http_client;
pub mod ingest;
pub mod model;
pub mod predict;
pub mod scaler;
pub mod store;
pub mod tracking;
pub mod training;
