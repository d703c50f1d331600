pub mod agents;
pub mod health;
pub mod stream;
pub mod workflow;
