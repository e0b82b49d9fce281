//! Transpile worker
//!
//! [`LanguageService`] holds the open documents and compiles one of them on
//! request; [`worker`] runs it on its own thread behind [`TranspileClient`].

pub mod service;
pub mod worker;

pub use service::LanguageService;
pub use worker::{spawn as spawn_transpile_worker, TranspileClient};
