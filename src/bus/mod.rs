// Event bus
//
// Single-process publish/subscribe channel shared by agents, the workflow
// orchestrator and every live observer (dashboards, speech dispatcher).

pub mod command_bus;
pub mod events;

pub use command_bus::{BusConfig, CommandBus, Subscription, SubscriptionId};
pub use events::{Event, EventKind, Payload};
