//! Domain-specific error types for swaplist-core
//!
//! # Error Categories
//!
//! - **Fatal**: abort the whole merge job and are returned to the caller
//!   (empty playlist, unreadable base archive, no usable statistics).
//! - **Recoverable**: describe one playlist entry; the engine logs them and
//!   carries on without that entry.
//!
//! ## Using in Functions
//!
//! ```rust
//! use swaplist::errors::{SwapError, SwapResult};
//!
//! fn require_entries(count: usize) -> SwapResult<usize> {
//!     if count == 0 {
//!         return Err(SwapError::EmptyPlaylist);
//!     }
//!     Ok(count)
//! }
//! ```

pub mod swap;

pub use swap::SwapError;

/// Result type alias for recombination operations
pub type SwapResult<T> = Result<T, SwapError>;
