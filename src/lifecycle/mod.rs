//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Background tasks (scheduler.rs, config reload):
//!     subscribe to Shutdown → run until the broadcast fires
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - One broadcast channel stops every task
//! - The scheduler never clears at startup, only after a full period

pub mod scheduler;
pub mod shutdown;
pub mod signals;

pub use scheduler::ClearScheduler;
pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
