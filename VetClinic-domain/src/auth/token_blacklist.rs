use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use tracing::{debug, error, info};

/// Process-wide list of revoked token ids
static TOKEN_BLACKLIST: Lazy<TokenBlacklist> = Lazy::new(TokenBlacklist::new);

type Entries = HashMap<String, SystemTime>;

/// Revoked tokens keyed by their `jti`
///
/// Each entry lives until the token's natural expiration. An entry is never
/// dropped before that, so `max_size` is an alarm threshold rather than a
/// hard cap.
pub struct TokenBlacklist {
    revoked_tokens: Mutex<Entries>,
    max_size: usize,
}

impl Default for TokenBlacklist {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBlacklist {
    /// A blacklist holding up to 10,000 tokens
    pub fn new() -> Self {
        Self::with_max_size(10_000)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            revoked_tokens: Mutex::new(HashMap::new()),
            max_size: max_size.max(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.revoked_tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a token to the blacklist until `expiration`, pruning expired entries first
    pub fn revoke_token(&self, token_id: &str, expiration: SystemTime) {
        let mut tokens = self.entries();
        cleanup_expired(&mut tokens);

        if tokens.len() >= self.max_size {
            error!(
                "Token blacklist holds {} unexpired tokens (threshold {}); keeping all of them",
                tokens.len(),
                self.max_size
            );
        }

        tokens.insert(token_id.to_string(), expiration);
        info!("Token revoked: {}", token_id);
    }

    pub fn is_revoked(&self, token_id: &str) -> bool {
        self.entries().contains_key(token_id)
    }

    pub fn size(&self) -> usize {
        self.entries().len()
    }

    /// Forget tokens past their natural expiration; returns how many were removed
    pub fn cleanup_expired_tokens(&self) -> usize {
        cleanup_expired(&mut self.entries())
    }
}

fn cleanup_expired(tokens: &mut Entries) -> usize {
    let now = SystemTime::now();
    let before = tokens.len();
    tokens.retain(|_, expiration| *expiration > now);

    let removed = before - tokens.len();
    if removed > 0 {
        debug!("Removed {} expired tokens from blacklist", removed);
    }
    removed
}

/// The global token blacklist
pub fn blacklist() -> &'static TokenBlacklist {
    &TOKEN_BLACKLIST
}
