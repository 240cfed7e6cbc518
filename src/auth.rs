//! Identity identifiers, application tokens, and user projections.

pub mod id;
pub mod token;
pub mod user;

pub use id::*;
pub use token::{secret::*, *};
pub use user::*;
