#[macro_use]
extern crate tracing;

pub mod connection;
pub mod hub;

pub use self::{
    connection::Limits,
    hub::{BroadcastHub, Closed, ConnectionId, Liveness, Outbox},
};
