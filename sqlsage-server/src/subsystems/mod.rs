pub mod connect;
pub mod describe;
pub mod execute;
pub mod extract;
pub mod format;
pub mod fragments;
pub mod generate;
pub mod orchestrate;
pub mod prompt;
pub mod retrieve;
