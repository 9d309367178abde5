//! Route handlers, grouped by surface.

pub mod admin;
pub mod callback;
pub mod intake;
pub mod subscription;
