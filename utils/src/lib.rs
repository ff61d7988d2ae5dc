pub mod logging;
pub mod rpc;
