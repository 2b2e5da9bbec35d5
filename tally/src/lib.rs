pub mod agent;
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod models;
pub mod parser;
pub mod rag;
pub mod scheduler;
pub mod services;

#[cfg(test)]
mod test_support;
