//! Role and permission vocabulary.
//!
//! Both are closed enums: every permission a route can require is known at
//! compile time, and unknown strings coming from storage or requests are
//! rejected at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    TenantAdmin,
    Doctor,
    Nurse,
    Pharmacist,
    LabTechnician,
    Receptionist,
    Accountant,
    Patient,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::SuperAdmin,
        Role::TenantAdmin,
        Role::Doctor,
        Role::Nurse,
        Role::Pharmacist,
        Role::LabTechnician,
        Role::Receptionist,
        Role::Accountant,
        Role::Patient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::TenantAdmin => "tenant_admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Pharmacist => "pharmacist",
            Role::LabTechnician => "lab_technician",
            Role::Receptionist => "receptionist",
            Role::Accountant => "accountant",
            Role::Patient => "patient",
        }
    }

    /// Whether this role passes every permission and tenant check.
    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Roles that may not be chosen through self-registration.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::TenantAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Permissions in `<module>:<verb>` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "patients:read")]
    PatientsRead,
    #[serde(rename = "patients:write")]
    PatientsWrite,
    #[serde(rename = "patients:delete")]
    PatientsDelete,
    #[serde(rename = "appointments:read")]
    AppointmentsRead,
    #[serde(rename = "appointments:write")]
    AppointmentsWrite,
    #[serde(rename = "appointments:delete")]
    AppointmentsDelete,
    #[serde(rename = "pharmacy:read")]
    PharmacyRead,
    #[serde(rename = "pharmacy:write")]
    PharmacyWrite,
    #[serde(rename = "pharmacy:dispense")]
    PharmacyDispense,
    #[serde(rename = "lab:read")]
    LabRead,
    #[serde(rename = "lab:write")]
    LabWrite,
    #[serde(rename = "lab:approve")]
    LabApprove,
    #[serde(rename = "staff:read")]
    StaffRead,
    #[serde(rename = "staff:write")]
    StaffWrite,
    #[serde(rename = "departments:read")]
    DepartmentsRead,
    #[serde(rename = "departments:write")]
    DepartmentsWrite,
    #[serde(rename = "billing:read")]
    BillingRead,
    #[serde(rename = "billing:write")]
    BillingWrite,
    #[serde(rename = "ipd:read")]
    IpdRead,
    #[serde(rename = "ipd:write")]
    IpdWrite,
    #[serde(rename = "audit:read")]
    AuditRead,
    #[serde(rename = "audit:review")]
    AuditReview,
    #[serde(rename = "users:read")]
    UsersRead,
    #[serde(rename = "users:manage")]
    UsersManage,
    #[serde(rename = "tenants:manage")]
    TenantsManage,
}

impl Permission {
    pub const ALL: [Permission; 25] = [
        Permission::PatientsRead,
        Permission::PatientsWrite,
        Permission::PatientsDelete,
        Permission::AppointmentsRead,
        Permission::AppointmentsWrite,
        Permission::AppointmentsDelete,
        Permission::PharmacyRead,
        Permission::PharmacyWrite,
        Permission::PharmacyDispense,
        Permission::LabRead,
        Permission::LabWrite,
        Permission::LabApprove,
        Permission::StaffRead,
        Permission::StaffWrite,
        Permission::DepartmentsRead,
        Permission::DepartmentsWrite,
        Permission::BillingRead,
        Permission::BillingWrite,
        Permission::IpdRead,
        Permission::IpdWrite,
        Permission::AuditRead,
        Permission::AuditReview,
        Permission::UsersRead,
        Permission::UsersManage,
        Permission::TenantsManage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::PatientsRead => "patients:read",
            Permission::PatientsWrite => "patients:write",
            Permission::PatientsDelete => "patients:delete",
            Permission::AppointmentsRead => "appointments:read",
            Permission::AppointmentsWrite => "appointments:write",
            Permission::AppointmentsDelete => "appointments:delete",
            Permission::PharmacyRead => "pharmacy:read",
            Permission::PharmacyWrite => "pharmacy:write",
            Permission::PharmacyDispense => "pharmacy:dispense",
            Permission::LabRead => "lab:read",
            Permission::LabWrite => "lab:write",
            Permission::LabApprove => "lab:approve",
            Permission::StaffRead => "staff:read",
            Permission::StaffWrite => "staff:write",
            Permission::DepartmentsRead => "departments:read",
            Permission::DepartmentsWrite => "departments:write",
            Permission::BillingRead => "billing:read",
            Permission::BillingWrite => "billing:write",
            Permission::IpdRead => "ipd:read",
            Permission::IpdWrite => "ipd:write",
            Permission::AuditRead => "audit:read",
            Permission::AuditReview => "audit:review",
            Permission::UsersRead => "users:read",
            Permission::UsersManage => "users:manage",
            Permission::TenantsManage => "tenants:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}
