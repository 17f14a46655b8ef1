//! Rate limiting logic and state management.

mod backend;
mod key;
mod limiter;
mod reaper;
mod store;

pub use backend::{AdmissionControl, AlwaysAdmit};
pub use key::{ClientKey, FALLBACK_KEY};
pub use limiter::{Decision, FixedWindowLimiter, LimitConfig, MAX_WINDOW};
pub use reaper::{Reaper, ReaperHandle, ReaperSettings};
pub use store::{WindowState, WindowStore};
