//! Kothar - Personality-driven conversational souls
//!
//! This crate implements souls that think in cognitive steps over an
//! immutable working memory, and a two-voice radio dialogue in which the
//! souls take turns, interrupt each other and answer listener questions.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
