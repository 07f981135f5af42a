//! Report export helpers.

pub mod csv_utils;

pub use csv_utils::incidents_to_csv;
