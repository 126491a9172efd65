// ABOUTME: Test doubles for the hosting API.
// ABOUTME: Public so integration tests and the CLI's dry runs can share them.

pub mod mock_hosting;

pub use mock_hosting::{HostingCall, MockHosting, Stage};
