//! Foresight: multi-tenant prediction pipeline
//!
//! Crawls configured sources per target universe, detects directional
//! signals, scores them with a weighted panel of LLM analysts, and emits
//! threshold-gated predictions whose outcomes feed a human-supervised
//! learning loop.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler (crawl) → Detector (claims) → Analysts (LLM panel) → Predictions
//!                                              ↓                      ↓
//!                                        Review Queue           Evaluator
//!                                                                    ↓
//!                                  Learning Queue → Promotion (test → prod)
//!                                              ↑
//!                            Sandbox (T_ scenarios)    Monitor (anomalies)
//! ```
//!
//! Every row carries `organization_slug` and an `is_test` flag; test and
//! production data share tables but never mix in queries.

pub mod analysts;
pub mod api;
pub mod catalog;
pub mod config;
pub mod detector;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod learning;
pub mod monitor;
pub mod pipeline;
pub mod predictions;
pub mod promotion;
pub mod review;
pub mod sandbox;
pub mod scheduler;
pub mod storage;
pub mod types;

#[cfg(test)]
mod types_tests;
