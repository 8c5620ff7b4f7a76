pub mod auth;
pub mod email;
pub mod groups;
pub mod health;
pub mod members;
pub mod metrics;
pub mod tasks;
