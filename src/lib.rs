//! Chorus API Library
//!
//! Multi-agent assistant core: an in-process event bus, task decomposition,
//! workflow orchestration across agents, and speech chunk streaming, plus
//! the HTTP adapter that exposes them.

pub mod agents;
pub mod api;
pub mod bus;
pub mod config;
pub mod orchestration;
pub mod streaming;
