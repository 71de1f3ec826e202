//! adpilot - customer-portal core for an Amazon-ads automation service
//!
//! This crate provides the portal's client core: automation rule storage and
//! editing, session identity, customer/admin messaging with presence, and
//! user administration, all over an abstracted hosted backend.

pub mod app;
pub mod backend;
pub mod config;
pub mod domain;
pub mod services;
pub mod storage;

pub use app::{AdminSession, Portal, UserSession};
