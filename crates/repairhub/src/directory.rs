//! Narrow seam over the external customer/workshop directory. The platform
//! only reads contact profiles and writes the workshop bank-verification
//! flag; account management itself lives elsewhere.

use serde::{Deserialize, Serialize};

use crate::scheduling::domain::{CustomerId, WorkshopId};

/// Contact profile for a customer, as exposed by the directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
}

/// Contact and payout profile for a workshop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopProfile {
    pub id: WorkshopId,
    pub name: String,
    pub email: String,
    /// Set by counterpart-verification gateway events once the workshop's
    /// bank details have been validated for payouts.
    pub bank_verified: bool,
}

/// Read/write access to the externally managed directory.
pub trait WorkshopDirectory: Send + Sync {
    fn customer(&self, id: &CustomerId) -> Result<Option<CustomerProfile>, DirectoryError>;
    fn workshop(&self, id: &WorkshopId) -> Result<Option<WorkshopProfile>, DirectoryError>;
    fn set_bank_verified(&self, id: &WorkshopId, verified: bool) -> Result<(), DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("profile not found")]
    NotFound,
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}
