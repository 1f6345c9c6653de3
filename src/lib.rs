//! DX Channel — Library Root
//!
//! Client SDK for the DX Network micropayment channel protocol:
//! open a deposit-backed channel to a provider node, pay per query via
//! provider-issued receipts, settle in one final transaction.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod usecases;
