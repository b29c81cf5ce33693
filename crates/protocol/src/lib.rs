#![forbid(unsafe_code)]

mod command;
mod frame;
mod parse;

pub use command::Command;
pub use frame::{Frame, check_command, decode_command};
pub use parse::Parse;
