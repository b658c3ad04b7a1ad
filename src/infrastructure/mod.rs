pub mod addok;
pub mod bootstrap;
pub mod config;
pub mod csv;
