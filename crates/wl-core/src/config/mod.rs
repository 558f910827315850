//! # Pure Data Module - Data Transfer Objects Only
//!
//! Defines the configuration DTO and its TOML mapping. No validation, no
//! default value policy: an empty string read from the file is a fact.

pub mod app_config;

pub use app_config::AppConfig;
