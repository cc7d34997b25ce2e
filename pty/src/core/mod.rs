mod error;
mod gate;
mod hook;
mod interaction;
mod io_loop;
mod ipc;
mod output_handler;
mod pty;
mod resize;
mod session;
mod suggestion;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::*;
pub use session::Session;
