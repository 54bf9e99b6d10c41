//! Connection management for the three physical stores. Each backend owns
//! its handle for the process lifetime.

pub mod dynamo;
pub mod mongo;
pub mod postgres;
