//! Database models split into domain-specific modules.

pub mod image;
pub mod lap;
pub mod refresh_token;
pub mod session;
pub mod settings;
pub mod user;

pub use image::*;
pub use lap::*;
pub use refresh_token::*;
pub use session::*;
pub use settings::*;
pub use user::*;
