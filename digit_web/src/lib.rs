mod page;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod form;
pub mod prediction;
pub mod repository;
pub mod storage;
pub mod submission;

pub use app::start_app;
