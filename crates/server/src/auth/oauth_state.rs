use oauth2::PkceCodeVerifier;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Pending login: PKCE verifier, creation time, and the query string to hand
/// to the success page.
struct StateEntry {
    verifier: PkceCodeVerifier,
    created_at: Instant,
    success_query: Option<String>,
}

/// Default lifetime of a pending login.
const STATE_TTL: Duration = Duration::from_secs(600);

/// CSRF state store for the login flow, shared through `AppState`.
pub struct OAuthStateStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, StateEntry>>,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::with_ttl(STATE_TTL)
    }
}

impl OAuthStateStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a CSRF state token with its PKCE verifier and success-page query.
    pub async fn store(&self, state: String, verifier: PkceCodeVerifier, success_query: Option<String>) {
        let mut entries = self.entries.lock().await;

        // Prune expired entries while we hold the lock
        entries.retain(|_, entry| entry.created_at.elapsed() <= self.ttl);

        entries.insert(
            state,
            StateEntry {
                verifier,
                created_at: Instant::now(),
                success_query,
            },
        );
    }

    /// Remove and return the verifier and success query for `state`.
    /// Returns None if the state is unknown or expired.
    pub async fn take(&self, state: &str) -> Option<(PkceCodeVerifier, Option<String>)> {
        let entry = self.entries.lock().await.remove(state)?;

        if entry.created_at.elapsed() > self.ttl {
            return None;
        }

        Some((entry.verifier, entry.success_query))
    }

    /// Number of pending logins, expired ones included.
    pub async fn pending(&self) -> usize {
        self.entries.lock().await.len()
    }
}
