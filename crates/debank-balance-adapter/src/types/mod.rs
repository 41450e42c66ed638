/*
[INPUT]:  API schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums for wire payloads, coins and tasks
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

pub mod coin;
pub mod models;
pub mod task;

pub use coin::*;
pub use models::*;
pub use task::*;
