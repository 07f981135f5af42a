//! dat-dispatch: disaster incident tracking with responder dispatch and two-way SMS,
//! in a hexagonal layout.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
