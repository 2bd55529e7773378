pub mod category;
pub mod controller;
pub mod execution;
