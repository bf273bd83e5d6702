pub mod checkout;
pub mod nowpayments;
pub mod reconciliation;

pub use checkout::CheckoutService;
pub use nowpayments::{InvoiceGateway, NowPaymentsClient};
pub use reconciliation::ReconciliationService;
