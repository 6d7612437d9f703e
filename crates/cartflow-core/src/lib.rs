pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod flatten;
pub mod graph;
pub mod load;
pub mod pipeline;
pub mod schedule;
pub mod secrets;
pub mod table;
pub mod transform;
pub mod upload;
