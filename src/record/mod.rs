// src/record/mod.rs
//
// Active records
//
// RULES:
// - One Record per row, identified by table + primary key
// - Column writes persist individually, never as a full-row save
// - Models add typed accessors on top of a Record

mod entity;
mod model;

pub use entity::{Record, RecordState};
pub use model::Model;
