//! Publish/subscribe notifications between the data layer and the views.

pub mod bus;
pub mod domain;

pub use bus::{EventBus, Subscription};
pub use domain::{DomainEvent, Entity, EventName};
