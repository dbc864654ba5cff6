pub mod analyzer;
pub mod clock;
pub mod commands;
pub mod commit;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fixes;
pub mod github;
pub mod http;
pub mod llm;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod retry;
pub mod store;
pub mod validation;
