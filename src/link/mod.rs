//! Network link: radio association and the collector connection

pub mod association;
pub mod manager;

pub use association::{AssociationState, Associator, HostLink, LinkLayer, LinkStatus};
pub use manager::{LinkManager, LinkStats};
