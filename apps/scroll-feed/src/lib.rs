//! Records endpoint and scroll simulator built on `scroll-window`.

pub mod server;
pub mod simulate;
pub mod telemetry;
