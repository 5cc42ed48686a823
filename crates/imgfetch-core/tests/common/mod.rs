//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod image_server;
pub mod scripted;
