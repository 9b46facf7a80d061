pub mod ast;
pub mod module;
