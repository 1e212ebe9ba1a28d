pub mod filter;
pub mod gateway;
pub mod imap;
pub mod parser;
pub mod types;

pub use filter::MessageFilter;
pub use gateway::MailGateway;
pub use imap::ImapGateway;
pub use types::{CanonicalMessage, EmailMessage, SyncCheckpoint};
