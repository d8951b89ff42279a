// ABOUTME: Library module for pg-user-dump
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod config;
pub mod dump;
pub mod postgres;
pub mod utils;
