//! Coordination of reads and writes against the remote API.
//!
//! - `cancel`: cooperative cancellation tokens
//! - `coordinator`: search de-duplication, supersession and load latches
//! - `loader`: the staged initial load
//! - `optimistic`: optimistic mutations with rollback

pub mod cancel;
pub mod coordinator;
pub mod loader;
pub mod optimistic;

pub use cancel::CancelToken;
pub use coordinator::{Admission, LatchGuard, RequestCoordinator, Ticket};
pub use loader::{LoadHandle, LoadPlan, LoadStep, Stage, StageRunner};
pub use optimistic::{MutationEngine, MutationKind, RollbackSnapshot};
