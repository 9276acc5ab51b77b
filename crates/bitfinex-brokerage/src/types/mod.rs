/*
[INPUT]:  API schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for API communication and engine contract
[UPDATE]: When API schema changes or new types added
*/

pub mod engine;
pub mod enums;
pub mod models;
pub mod requests;

pub use engine::*;
pub use enums::*;
pub use models::*;
pub use requests::*;
