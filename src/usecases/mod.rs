//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates the domain codecs with the chain and node ports to
//! implement the channel lifecycle.

pub mod channel;

pub use channel::{Channel, ChannelEndpoints, ChannelState, QueryOptions};
