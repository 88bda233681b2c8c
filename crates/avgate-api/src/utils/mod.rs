//! Helpers shared by handlers

pub mod upload;
