//! Per-user session: the explicit object a UI holds instead of ambient
//! global state. It owns the user's account snapshot, keeps it current from
//! pushed notifications, and exposes one trigger per user action.

pub mod services;
pub mod session;

pub use services::{AppLedger, NotificationBus, bootstrap, build_ledger};
pub use session::{AccountSnapshot, Session};
