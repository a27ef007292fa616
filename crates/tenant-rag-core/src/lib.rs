//! # tenant-rag core
//!
//! Shared, WASM-safe logic for tenant-rag: data models, chunking, vector
//! utilities, the store abstraction, the ranking engine, and prompt
//! assembly.
//!
//! This crate contains no tokio, sqlx, network, or filesystem
//! dependencies. Everything that performs I/O lives in the `tenant-rag`
//! app crate and reaches this crate through the [`store::Store`] trait.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod prompt;
pub mod rank;
pub mod store;
