pub mod conversations;
pub mod devices;
pub mod notifications;
pub mod payments;
pub mod wallet;
pub mod ws;
