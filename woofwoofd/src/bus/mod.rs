pub mod dispatch;
pub mod mqtt;
