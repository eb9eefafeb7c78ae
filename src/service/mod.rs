pub mod background_jobs;
pub mod error;
pub mod escrow_service;
pub mod flow;
pub mod gateway;
pub mod ledger_service;
pub mod locks;
pub mod notification_service;
pub mod presence;
pub mod publisher;
pub mod push_service;
pub mod reconciler;
