#![forbid(unsafe_code)]

mod db;
mod entry;
mod locks;

pub use db::Db;
pub use entry::Value;
