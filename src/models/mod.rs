pub mod conversationmodels;
pub mod envelope;
pub mod messagemodels;
pub mod notificationmodels;
pub mod paymentmodels;
pub mod usermodel;
pub mod walletmodels;
