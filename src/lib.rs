pub mod cache;
pub mod composer;
pub mod config;
pub mod data_store;
pub mod engine;
pub mod filter;
pub mod predicate;
pub mod template;
pub mod utils;

pub use engine::QueryEngine;

#[cfg(test)]
mod tests;
