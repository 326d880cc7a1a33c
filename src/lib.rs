// Analysis Service - queued LLM content analysis over HTTP

pub mod config;
pub mod db;
pub mod models;
pub mod types;
pub mod llm;
pub mod cache;
pub mod storage;
pub mod routes;
pub mod middleware;
pub mod queue;
pub mod analysis;
pub mod maintenance;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
