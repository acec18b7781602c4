//! Modem engine module

pub mod builder;
pub mod config;
pub mod join;
pub mod modem;

mod clock;
mod device;
mod radio;
mod uplink;

pub use builder::ModemBuilder;
pub use config::ModemConfig;
pub use join::JoinReport;
pub use modem::LoraModem;
pub use uplink::UPLINK_CHUNK_ATTEMPTS;
