pub mod auth;
pub mod labels;
pub mod provision;
pub mod taxonomy;

pub use auth::{GmailAuth, GmailAuthConfig, GmailAuthError};
pub use labels::{
    GmailLabelClient, GmailProviderFactory, LabelProvider, LabelProviderFactory, MailboxError,
    MailboxLabel,
};
pub use provision::{
    discover, provision, CategoryMapping, DiscoveredMailbox, LabelFailure, LabelNode,
    ProvisionOutcome,
};
pub use taxonomy::{Category, PARENT_LABEL};
