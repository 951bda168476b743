//! Itemized budget proposals and their resolution into approved/excluded
//! partitions with a fiscally rounded total.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::round_fiscal;

use super::domain::ServiceItemId;

/// One priced line item offered by the workshop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: ServiceItemId,
    pub description: String,
    pub price: Decimal,
}

/// The full proposal a workshop submits after diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub diagnostic_fee: Decimal,
    pub items: Vec<ServiceItem>,
    pub estimated_hours: f32,
    pub evidence_images: Vec<String>,
}

impl Budget {
    pub fn item(&self, id: &ServiceItemId) -> Option<&ServiceItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Sum of the given item prices plus the diagnostic fee, rounded once.
    pub fn total_for(&self, approved: &[ServiceItemId]) -> Decimal {
        let services: Decimal = self
            .items
            .iter()
            .filter(|item| approved.contains(&item.id))
            .map(|item| item.price)
            .sum();
        round_fiscal(self.diagnostic_fee + services)
    }
}

/// Inbound payload for budget submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSubmission {
    pub diagnostic_fee: Decimal,
    pub items: Vec<ServiceItem>,
    pub estimated_hours: f32,
    #[serde(default)]
    pub evidence_images: Vec<String>,
}

/// How the customer's selection resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetOutcome {
    Approved,
    PartiallyApproved,
    Disapproved,
}

/// Partitioned result of applying a selection to a budget.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetResolution {
    pub outcome: BudgetOutcome,
    pub approved: Vec<ServiceItemId>,
    pub excluded: Vec<ServiceItemId>,
    /// Set only when at least one item was approved.
    pub total_value: Option<Decimal>,
}

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("budget must contain at least one service item")]
    EmptyItemList,
    #[error("diagnostic fee and item prices must not be negative")]
    NegativeAmount,
    #[error("duplicate service item id '{0}' in budget")]
    DuplicateItem(String),
    #[error("approved service '{0}' is not part of the submitted budget")]
    UnknownItem(String),
}

/// Validate a workshop submission before it is attached to an order.
pub fn validate_submission(submission: &BudgetSubmission) -> Result<(), BudgetError> {
    if submission.items.is_empty() {
        return Err(BudgetError::EmptyItemList);
    }
    if submission.diagnostic_fee < Decimal::ZERO
        || submission.items.iter().any(|item| item.price < Decimal::ZERO)
    {
        return Err(BudgetError::NegativeAmount);
    }
    for (index, item) in submission.items.iter().enumerate() {
        if submission.items[..index].iter().any(|seen| seen.id == item.id) {
            return Err(BudgetError::DuplicateItem(item.id.0.clone()));
        }
    }
    Ok(())
}

/// Partition a budget against the customer's approved set and compute the
/// total. The excluded partition keeps every item the customer dropped.
pub fn resolve(budget: &Budget, approved_ids: &[ServiceItemId]) -> Result<BudgetResolution, BudgetError> {
    for id in approved_ids {
        if budget.item(id).is_none() {
            return Err(BudgetError::UnknownItem(id.0.clone()));
        }
    }

    let mut approved: Vec<ServiceItemId> = Vec::new();
    let mut excluded: Vec<ServiceItemId> = Vec::new();
    for item in &budget.items {
        if approved_ids.contains(&item.id) {
            approved.push(item.id.clone());
        } else {
            excluded.push(item.id.clone());
        }
    }

    let outcome = if approved.is_empty() {
        BudgetOutcome::Disapproved
    } else if excluded.is_empty() {
        BudgetOutcome::Approved
    } else {
        BudgetOutcome::PartiallyApproved
    };

    let total_value = match outcome {
        BudgetOutcome::Disapproved => None,
        _ => Some(budget.total_for(&approved)),
    };

    Ok(BudgetResolution {
        outcome,
        approved,
        excluded,
        total_value,
    })
}
