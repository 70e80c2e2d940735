//! Platform services for GreenWatch
//!
//! This crate wraps device capabilities behind traits so the networking
//! layer can use them without knowing which platform it runs on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod location;

pub use location::{
    Accuracy, Coordinates, Location, LocationCache, LocationConfig, LocationError,
    LocationProvider,
};
