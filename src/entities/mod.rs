pub mod order;
pub mod product;

pub use order::{DeliveryStatus, PaymentStatus};
