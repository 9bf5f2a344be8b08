pub mod catalog;
pub mod order;
