//! HTTP request handlers.

pub mod common;
pub mod health;
pub mod reports;
pub mod uploads;

pub use common::*;
pub use health::*;
pub use reports::*;
pub use uploads::*;
