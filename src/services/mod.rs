pub mod auth;
pub mod email;
pub mod groups;
pub mod members;
pub mod metrics;
pub mod notifications;
pub mod permissions;
pub mod reports;
pub mod tasks;
