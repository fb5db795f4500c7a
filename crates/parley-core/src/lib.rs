pub mod errors;
pub mod events;
pub mod generation;
pub mod generator;
pub mod ids;
pub mod prompt;
pub mod speech;
pub mod tool_call;
pub mod tools;
pub mod turns;
