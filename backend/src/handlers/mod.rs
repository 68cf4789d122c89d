pub mod collections;
pub mod jobs;
pub mod mailboxes;
pub mod swipes;
pub mod tags;
pub mod webhooks;
