pub mod payment_gateway;
pub mod shipping;
