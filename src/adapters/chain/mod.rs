//! Chain Adapters - Blockchain Interaction Layer
//!
//! Provides on-chain access via alloy-rs 0.9:
//! - RPC connection management with startup chain-id validation
//! - The `ChainGateway` port implementation (calls, signed sends,
//!   bounded event waits)

pub mod gateway;
pub mod provider;

pub use gateway::EthGateway;
pub use provider::RpcConnection;
