pub mod csv;
pub mod gateway;
pub mod http;
pub mod replay;
