pub mod checkout;
pub mod contact;
pub mod orders;
pub mod returns;
pub mod shipments;
