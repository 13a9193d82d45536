//! Watchlist Store
//!
//! Persists the user's watchlist as a JSON array of symbols in a single
//! file. Symbols are trimmed and upper-cased on the way in; the list keeps
//! insertion order. A missing or unreadable file reads as an empty list.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::domain::subscription::Symbol;

/// Watchlist failures.
#[derive(Debug, thiserror::Error)]
pub enum WatchlistError {
    /// Symbol was blank after trimming.
    #[error("symbol must not be empty")]
    EmptySymbol,

    /// Symbol is not on the watchlist.
    #[error("{0} is not on the watchlist")]
    NotFound(Symbol),

    /// File could not be written.
    #[error("failed to write watchlist: {0}")]
    Io(#[from] std::io::Error),

    /// List could not be serialized.
    #[error("failed to encode watchlist: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON-file watchlist.
#[derive(Debug)]
pub struct WatchlistStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl WatchlistStore {
    /// Store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current symbols in insertion order.
    pub async fn list(&self) -> Vec<Symbol> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring malformed watchlist"
                );
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read watchlist");
                Vec::new()
            }
        }
    }

    /// Append `symbol` if absent and return the list.
    ///
    /// # Errors
    ///
    /// Returns `EmptySymbol` for a blank symbol, or an I/O error if the file
    /// cannot be written.
    pub async fn add(&self, symbol: &str) -> Result<Vec<Symbol>, WatchlistError> {
        let symbol = canonical(symbol)?;
        let _guard = self.write_lock.lock().await;

        let mut symbols = self.list().await;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
            self.save(&symbols).await?;
        }
        Ok(symbols)
    }

    /// Remove `symbol` and return the list.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the symbol is not listed, or an I/O error if the
    /// file cannot be written.
    pub async fn remove(&self, symbol: &str) -> Result<Vec<Symbol>, WatchlistError> {
        let symbol = canonical(symbol)?;
        let _guard = self.write_lock.lock().await;

        let mut symbols = self.list().await;
        let Some(index) = symbols.iter().position(|s| *s == symbol) else {
            return Err(WatchlistError::NotFound(symbol));
        };
        symbols.remove(index);
        self.save(&symbols).await?;
        Ok(symbols)
    }

    async fn save(&self, symbols: &[Symbol]) -> Result<(), WatchlistError> {
        let json = serde_json::to_vec_pretty(symbols)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

fn canonical(symbol: &str) -> Result<Symbol, WatchlistError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(WatchlistError::EmptySymbol);
    }
    Ok(symbol)
}
