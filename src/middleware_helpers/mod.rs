pub mod catch_panic;
pub mod request_id;

pub use catch_panic::panic_response;
pub use request_id::request_id_middleware;
