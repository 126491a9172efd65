// ABOUTME: Admin access gate, configuration and shared plumbing for the broker website
// ABOUTME: HTTP-agnostic: the server wraps its session and request types around these traits

pub mod config;
pub mod gate;
pub mod lookup;
pub mod metrics;
pub mod paths;
pub mod whitelist;

pub use config::Config;
pub use gate::{
    AccessGate, AdminSecret, AuthorizationState, GateView, MemoryFlag, PasswordOutcome,
    SessionFlagStore, SESSION_FLAG_KEY,
};
pub use lookup::{AddressLookup, CallerContext, PeerAddressLookup};
pub use whitelist::{Whitelist, WhitelistLocation, WhitelistSource};
