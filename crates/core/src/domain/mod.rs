pub mod approval;
pub mod purchase_order;
pub mod report;
pub mod request;
