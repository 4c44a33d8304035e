pub mod app;
pub mod billing;
pub mod config;
pub mod emails;
pub mod error;
pub mod jobs;
pub mod mailer;
pub mod models;
pub mod render;
pub mod routes;
pub mod session;
pub mod state;
pub mod totp;
