#[allow(non_snake_case)]
pub mod CollisionProbability;
#[allow(non_snake_case)]
pub mod CrossSections;
#[allow(non_snake_case)]
pub mod Utils;
pub mod errors;
pub mod settings;
pub mod task_parser;
