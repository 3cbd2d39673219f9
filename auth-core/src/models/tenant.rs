//! Tenant model - one hospital or clinic on the platform.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::Auditable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "inactive" => Ok(TenantStatus::Inactive),
            _ => Err(format!("Invalid tenant status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Basic,
    Professional,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Basic => "basic",
            SubscriptionPlan::Professional => "professional",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }

    /// Default quotas for the plan.
    pub fn default_limits(&self) -> TenantLimits {
        match self {
            SubscriptionPlan::Basic => TenantLimits {
                max_users: 25,
                max_patients: 5_000,
                max_storage_mb: 5_120,
            },
            SubscriptionPlan::Professional => TenantLimits {
                max_users: 200,
                max_patients: 50_000,
                max_storage_mb: 51_200,
            },
            SubscriptionPlan::Enterprise => TenantLimits {
                max_users: 2_000,
                max_patients: 1_000_000,
                max_storage_mb: 512_000,
            },
        }
    }
}

impl FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(SubscriptionPlan::Basic),
            "professional" => Ok(SubscriptionPlan::Professional),
            "enterprise" => Ok(SubscriptionPlan::Enterprise),
            _ => Err(format!("Invalid subscription plan: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantLimits {
    pub max_users: i32,
    pub max_patients: i32,
    pub max_storage_mb: i32,
}

/// Tenant entity.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub status: TenantStatus,
    pub subscription_plan: SubscriptionPlan,
    pub limits: TenantLimits,
    pub audit: Auditable,
}

impl Tenant {
    pub fn new(slug: String, name: String, plan: SubscriptionPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug,
            name,
            status: TenantStatus::Active,
            subscription_plan: plan,
            limits: plan.default_limits(),
            audit: Auditable::new(chrono::Utc::now()),
        }
    }

    /// Only active tenants may authenticate or refresh sessions.
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}
