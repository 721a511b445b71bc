//! Grade prediction for syllabus-parsed courses.
//!
//! The predictor in [`predict`] is pure; [`service`] wires it to a
//! [`store::CourseProfileStore`] and an [`aggregate::AssignmentFeed`], and
//! [`db`] provides the Postgres implementations of both.

pub mod aggregate;
pub mod categorize;
pub mod config;
pub mod db;
pub mod import;
pub mod models;
pub mod predict;
pub mod profile;
pub mod report;
pub mod service;
pub mod store;
pub mod telemetry;
