pub mod logging;
pub mod request_span;

pub use logging::{init_test_tracing, init_tracing};
pub use request_span::make_request_span;
