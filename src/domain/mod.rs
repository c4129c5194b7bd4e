// Domain layer - Export job model and clip policies

pub mod model;
pub mod rules;
