pub mod project;
pub mod prompt;
