//! Cafebot core library: LINE webhook handling, intent routing, hand-off state,
//! and the completion fallback, used by the `cafebot` CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod fallback;
pub mod gateway;
pub mod handoff;
pub mod init;
pub mod intent;
pub mod llm;
pub mod normalize;
pub mod profile;
