pub mod collate;
pub mod command;
pub mod info;
mod worker;
