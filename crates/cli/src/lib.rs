pub mod cli;
pub mod commands;
pub mod priority;
pub mod signals;
