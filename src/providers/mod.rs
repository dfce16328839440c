//! Data provider implementations.
//!
//! The cache only requires the [`crate::DataProvider`] capability; this
//! module ships the reference provider over Multiple-Object-Tracking text
//! files, the dataset format the crate was originally built around.

pub mod mot;

pub use mot::{MotDataProvider, MotDetection, MotError, MotFrame};
