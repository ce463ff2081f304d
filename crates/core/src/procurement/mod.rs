//! Procurement: purchase orders and receiving

pub mod po_generator;
pub mod ports;
pub mod receiving;

pub use po_generator::PurchaseOrderGenerator;
pub use ports::PurchaseOrderRepository;
pub use receiving::ReceivingReconciler;
