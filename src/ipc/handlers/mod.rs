pub mod availability;
pub mod conflicts;
pub mod constraints;
pub mod core;
pub mod schedule;
pub mod teachers;
