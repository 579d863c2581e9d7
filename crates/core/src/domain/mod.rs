pub mod action;
pub mod param;
