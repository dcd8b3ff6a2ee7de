pub mod check;
pub mod common;
pub mod run;
pub mod tools;
