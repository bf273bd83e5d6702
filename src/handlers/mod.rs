pub mod checkout;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod plans;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
