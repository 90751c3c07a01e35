//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and id minting into use-case APIs.
//! - Keep CLI callers decoupled from storage details.

pub mod config_service;
