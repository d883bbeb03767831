pub mod generation;
pub mod workers;
