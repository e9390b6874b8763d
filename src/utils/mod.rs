//! Utils module - logging setup, string previews and media helpers

pub mod logging;
pub mod media;
pub mod string;
