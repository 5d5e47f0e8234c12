pub mod clock;
pub mod error;
pub mod resources;
pub mod state;

pub use clock::*;
pub use error::*;
pub use resources::*;
pub use state::*;
