//! Data models for Stash

mod media;
mod record;
mod task;

pub use media::MediaItem;
pub use record::{Record, OWNER_FIELD};
pub use task::Task;
