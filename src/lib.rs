pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod idmap;
pub mod merge;
pub mod migrate;
pub mod pages;
