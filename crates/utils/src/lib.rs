pub mod logging;
pub mod response;
