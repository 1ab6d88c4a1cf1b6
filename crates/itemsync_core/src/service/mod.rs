//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate cache and remote calls into use-case level APIs.
//! - Keep the CLI decoupled from storage details.

pub mod item_service;
