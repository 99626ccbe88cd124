//! SeaORM entities.

pub mod ai_model;
pub mod usage;
