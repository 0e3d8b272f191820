pub mod broadcaster;
pub mod manager;
pub mod subscription;

pub use broadcaster::{Broadcaster, PublishReport};
pub use manager::SubscriptionManager;
pub use subscription::{
    CloseReason, Delivery, SubscriberState, SubscriptionFilter, SubscriptionHandle,
};
