//! Catalog Migrate
//!
//! Exports a legacy relational e-commerce store as self-contained JSON
//! documents and mirrors the product images it references to local disk.

pub mod config;
pub mod db;
pub mod export;
pub mod manifest;
pub mod mirror;
