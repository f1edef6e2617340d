pub mod reading;

pub use reading::{Category, NewReading, Reading};
