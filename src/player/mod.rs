pub mod scripted;
pub mod traits;
pub mod types;

pub use scripted::ScriptedPlayer;
pub use traits::PlayerAdapter;
pub use types::{AdapterOptions, PlayerEvent};
