//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) the channel state machine depends
//! on. Adapters implement these against the real chain and provider;
//! tests implement them with mocks. Dependency direction is strictly
//! usecases -> ports <- adapters.

pub mod chain;
pub mod node;

pub use chain::{CallDescriptor, ChainGateway, EventDescriptor, EventParam};
pub use node::{ChannelMetadata, NodeApi, QueryReply, QueryRequest};
