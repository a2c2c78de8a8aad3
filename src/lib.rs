//! RTS Gamestate - session-level simulation kernel for a data-driven RTS

pub mod core;
pub mod data;
pub mod entity;
pub mod event;
pub mod game;
pub mod render;
pub mod state;
pub mod terrain;
pub mod universe;
pub mod world;

pub use crate::core::error::{Result, SessionError};
pub use crate::game::Game;
pub use crate::state::GameState;
