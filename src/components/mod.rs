pub mod compare;
pub mod history;
pub mod tools;
