pub mod conversationdb;
pub mod db;
pub mod escrowdb;
pub mod flowlogdb;
pub mod messagedb;
pub mod notificationdb;
pub mod paymentdb;
pub mod userdb;
pub mod walletdb;
