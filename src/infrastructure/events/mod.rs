//! Events - 朗读事件推送

mod publisher;

pub use publisher::{EventPublisher, PlaybackEvent};
