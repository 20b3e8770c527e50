pub mod reading;
pub mod reason;
