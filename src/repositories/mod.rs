// src/repositories/mod.rs
//
// Repository layer
//
// RULES:
// - One repository per Model kind
// - Models are built by an explicit factory
// - The executor is injected; there is no global database

pub mod record_repository;

pub use record_repository::RecordRepository;

#[cfg(test)]
mod record_repository_tests;
