//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionRegistry`: reconciles subscribe/unsubscribe requests with
//!   the upstream feed
//! - `DispatchHandle` / `Dispatcher`: hands upstream pushes to the hub
//! - `handle_command`: client command protocol

pub mod commands;
pub mod dispatcher;
pub mod registry;

pub use commands::{Action, CommandReply, handle_command};
pub use dispatcher::{DispatchHandle, Dispatcher, dispatch_channel};
pub use registry::{RegistryError, SubscriptionRegistry};
