pub mod master;
pub mod parse;
