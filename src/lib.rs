// src/lib.rs

//! Timetable Crawler Library
//!
//! Scrapes a cohort timetable portal, reconciles the observed slots with
//! the stored schedule and announces changes.

pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
