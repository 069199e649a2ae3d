//! Infrastructure wiring: database bootstrap and application state.

pub mod db;
pub mod state;
