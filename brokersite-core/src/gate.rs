// ABOUTME: Admin access gate: session flag short-circuit, IP whitelist check, password challenge
// ABOUTME: Every lookup failure degrades to the password challenge, never to access

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::lookup::{AddressLookup, CallerContext};
use crate::metrics;
use crate::whitelist::{Whitelist, WhitelistSource};

/// Session key holding the authorization flag
pub const SESSION_FLAG_KEY: &str = "admin_authorized";

/// Password used when configuration supplies none
pub const DEFAULT_ADMIN_PASSWORD: &str = "broker-admin";

/// The only error a visitor ever sees from the gate
pub const INCORRECT_PASSWORD: &str = "Incorrect password";

/// What the render boundary shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    /// A fresh `GateView` before `initialize`; `authorize` never returns it
    Loading,
    Unauthorized,
    Authorized,
}

/// Per-session storage for the authorization flag.
///
/// Implementations scope the flag to one visitor session and drop it when that
/// session ends.
#[async_trait]
pub trait SessionFlagStore: Send + Sync {
    async fn get(&self) -> Result<bool>;
    async fn set(&self) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// In-process flag, for tests and single-visitor tools
#[derive(Debug, Default)]
pub struct MemoryFlag(AtomicBool);

impl MemoryFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorized() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFlagStore for MemoryFlag {
    async fn get(&self) -> Result<bool> {
        Ok(self.is_set())
    }

    async fn set(&self) -> Result<()> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.0.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// The configured admin password, held as an Argon2 hash
#[derive(Clone)]
pub struct AdminSecret {
    hash: String,
}

impl std::fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSecret").field("hash", &"[REDACTED]").finish()
    }
}

impl AdminSecret {
    pub fn new(password: &str) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash admin password: {}", e))?
            .to_string();
        Ok(Self { hash })
    }

    /// Exact match against the configured password. No trimming.
    pub fn verify(&self, input: &str) -> bool {
        let parsed = match PasswordHash::new(&self.hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(input.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Result of a password submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordOutcome {
    Granted,
    Rejected,
}

impl PasswordOutcome {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Granted => None,
            Self::Rejected => Some(INCORRECT_PASSWORD),
        }
    }
}

/// Decides who gets into the admin area
#[derive(Clone)]
pub struct AccessGate {
    lookup: Arc<dyn AddressLookup>,
    whitelist: Arc<dyn WhitelistSource>,
    secret: AdminSecret,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("lookup", &"<AddressLookup>")
            .field("whitelist", &self.whitelist.describe())
            .field("secret", &self.secret)
            .finish()
    }
}

impl AccessGate {
    pub fn new(
        lookup: Arc<dyn AddressLookup>,
        whitelist: Arc<dyn WhitelistSource>,
        secret: AdminSecret,
    ) -> Self {
        Self {
            lookup,
            whitelist,
            secret,
        }
    }

    /// Resolve the visitor's state.
    ///
    /// A set session flag wins without any lookups. Otherwise the address
    /// lookup and the whitelist fetch run one after the other; a match sets
    /// the flag. Any failure along the way leaves the visitor unauthorized.
    pub async fn authorize(
        &self,
        flag: &dyn SessionFlagStore,
        caller: &CallerContext,
    ) -> AuthorizationState {
        match flag.get().await {
            Ok(true) => {
                metrics::record_gate_decision("session");
                return AuthorizationState::Authorized;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read session flag, treating as unset"),
        }

        if !self.is_whitelisted(caller).await {
            metrics::record_gate_decision("challenge");
            return AuthorizationState::Unauthorized;
        }

        if let Err(e) = flag.set().await {
            tracing::warn!(error = %e, "Failed to persist session flag after whitelist match");
        }
        metrics::record_gate_decision("whitelist");
        AuthorizationState::Authorized
    }

    async fn is_whitelisted(&self, caller: &CallerContext) -> bool {
        let address = match self.lookup.caller_address(caller).await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(error = %e, "Address lookup failed, requiring password");
                metrics::record_lookup_failure("address");
                return false;
            }
        };

        let text = match self.whitelist.fetch().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    source = %self.whitelist.describe(),
                    "Whitelist fetch failed, requiring password"
                );
                metrics::record_lookup_failure("whitelist");
                return false;
            }
        };

        let whitelist = Whitelist::parse(&text);
        let matched = whitelist.contains(&address);
        tracing::info!(
            address = %address,
            entries = whitelist.len(),
            matched,
            "Whitelist check"
        );
        matched
    }

    /// Check a password attempt. A match sets the session flag.
    pub async fn submit_password(&self, flag: &dyn SessionFlagStore, input: &str) -> PasswordOutcome {
        if !self.secret.verify(input) {
            metrics::record_gate_decision("rejected");
            return PasswordOutcome::Rejected;
        }

        if let Err(e) = flag.set().await {
            tracing::warn!(error = %e, "Failed to persist session flag after password match");
        }
        metrics::record_gate_decision("password");
        PasswordOutcome::Granted
    }

    /// Drop the session flag
    pub async fn logout(&self, flag: &dyn SessionFlagStore) -> Result<()> {
        flag.clear().await
    }
}

/// State behind the gate's render boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateView {
    pub state: AuthorizationState,
    pub error: Option<String>,
    /// Current contents of the password field
    pub input: String,
}

impl Default for GateView {
    fn default() -> Self {
        Self::new()
    }
}

impl GateView {
    pub fn new() -> Self {
        Self {
            state: AuthorizationState::Loading,
            error: None,
            input: String::new(),
        }
    }

    pub async fn initialize(
        &mut self,
        gate: &AccessGate,
        flag: &dyn SessionFlagStore,
        caller: &CallerContext,
    ) {
        self.state = gate.authorize(flag, caller).await;
    }

    /// Apply a password attempt; the field is always emptied afterwards
    pub async fn submit(&mut self, gate: &AccessGate, flag: &dyn SessionFlagStore, input: &str) {
        let outcome = gate.submit_password(flag, input).await;
        self.input.clear();
        match outcome {
            PasswordOutcome::Granted => {
                self.state = AuthorizationState::Authorized;
                self.error = None;
            }
            PasswordOutcome::Rejected => {
                self.state = AuthorizationState::Unauthorized;
                self.error = outcome.message().map(str::to_string);
            }
        }
    }
}
