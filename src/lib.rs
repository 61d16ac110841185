pub mod analytics;
pub mod api;
pub mod config;
pub mod export;
pub mod live;
pub mod models;
pub mod storage;
