#![forbid(unsafe_code)]

mod in_flight;

pub use in_flight::{Admission, InFlightSet, Release};
