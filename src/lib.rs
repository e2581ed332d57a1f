// Shared components
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Chat domain
pub mod chat;
pub mod history;

// Connection layer
pub mod connection_manager;
pub mod websocket;

// Presentation
pub mod view;
