//! HTTP request handlers

pub mod rt;
