//! DX Node API Adapter
//!
//! Implements the `NodeApi` port against the provider's HTTP surface:
//! channel metadata, receipt fetch, metered queries, closing
//! signatures, and the sync-status probe.

pub mod client;

pub use client::{DxNodeClient, NodeClientConfig};
