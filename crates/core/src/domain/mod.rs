pub mod event;
pub mod interaction;
pub mod link;
pub mod metrics;
