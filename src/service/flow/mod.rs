pub mod action;
pub mod engine;
pub mod plan;
