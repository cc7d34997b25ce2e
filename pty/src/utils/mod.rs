pub mod logging;
mod terminal;
mod theme;

pub use terminal::*;
pub use theme::*;
