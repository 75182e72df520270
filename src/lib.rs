pub mod banner;
pub mod commands;
pub mod config;
pub mod consts;
pub mod credentials;
pub mod events;
pub mod executor;
pub mod notify;
pub mod projects;
pub mod queue;
pub mod review;
pub mod store;
