pub mod cascade;
pub mod readiness;
pub mod session;
pub mod single_flight;
pub mod sync;
