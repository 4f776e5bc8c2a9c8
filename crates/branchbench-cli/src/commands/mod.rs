pub mod emit;
pub mod hooks;
pub mod parse;
pub mod run;
