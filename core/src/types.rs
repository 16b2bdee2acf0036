mod common;
mod events;
mod game;
mod params;
mod tournament;

pub use common::*;
pub use events::*;
pub use game::*;
pub use params::*;
pub use tournament::*;
