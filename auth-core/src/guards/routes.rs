//! Static route policy table.
//!
//! Every guarded `(method, path pattern)` pair is listed here with the
//! permissions it demands. Requests that match no entry are denied.

use axum::http::Method;
use std::collections::HashMap;

use crate::models::Permission;
use crate::services::PermissionRequirement;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    pub method: Method,
    /// Slash-separated; `:name` segments capture path parameters.
    pub pattern: &'static str,
    pub requirement: PermissionRequirement,
    /// Audit action to record instead of the one derived from the method.
    pub action: Option<&'static str>,
}

impl RoutePolicy {
    pub fn new(method: Method, pattern: &'static str, requirement: PermissionRequirement) -> Self {
        Self {
            method,
            pattern,
            requirement,
            action: None,
        }
    }

    pub fn with_action(mut self, action: &'static str) -> Self {
        self.action = Some(action);
        self
    }

    /// Match `path` against the pattern, returning captured parameters.
    pub fn matches(&self, method: &Method, path: &str) -> Option<HashMap<String, String>> {
        if *method != self.method {
            return None;
        }

        let mut pattern = self.pattern.split('/').filter(|s| !s.is_empty());
        let mut actual = path.split('/').filter(|s| !s.is_empty());
        let mut params = HashMap::new();

        loop {
            match (pattern.next(), actual.next()) {
                (None, None) => return Some(params),
                (Some(expected), Some(segment)) => {
                    if let Some(name) = expected.strip_prefix(':') {
                        params.insert(name.to_string(), segment.to_string());
                    } else if expected != segment {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }
}

/// A policy that matched a request, with its path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    pub policy: RoutePolicy,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    policies: Vec<RoutePolicy>,
}

impl RouteTable {
    pub fn new(policies: Vec<RoutePolicy>) -> Self {
        Self { policies }
    }

    /// First matching entry wins.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<MatchedRoute> {
        let path = path.split('?').next().unwrap_or(path);
        self.policies.iter().find_map(|policy| {
            policy.matches(method, path).map(|params| MatchedRoute {
                policy: policy.clone(),
                params,
            })
        })
    }

    /// Policies for every guarded route of the platform.
    pub fn platform() -> Self {
        use Permission as P;
        use PermissionRequirement::{AllOf, AnyOf, Authenticated};

        let any = |perms: &[Permission]| AnyOf(perms.to_vec());
        let all = |perms: &[Permission]| AllOf(perms.to_vec());

        Self::new(vec![
            // Account
            RoutePolicy::new(Method::POST, "/auth/logout", Authenticated).with_action("logout"),
            RoutePolicy::new(Method::GET, "/auth/me", Authenticated),
            RoutePolicy::new(Method::POST, "/auth/change-password", Authenticated)
                .with_action("change_password"),
            // Audit
            RoutePolicy::new(Method::GET, "/audit/logs", any(&[P::AuditRead])),
            RoutePolicy::new(Method::POST, "/audit/logs/:id/review", any(&[P::AuditReview]))
                .with_action("review"),
            // Tenant administration
            RoutePolicy::new(Method::GET, "/tenants/:tenantId/users", any(&[P::UsersRead])),
            RoutePolicy::new(Method::POST, "/tenants/:tenantId/users", any(&[P::UsersManage])),
            RoutePolicy::new(
                Method::PUT,
                "/tenants/:tenantId/users/:userId/role",
                any(&[P::UsersManage]),
            )
            .with_action("role_change"),
            RoutePolicy::new(
                Method::PUT,
                "/tenants/:tenantId/roles/:role/permissions",
                all(&[P::UsersManage, P::UsersRead]),
            )
            .with_action("role_change"),
            RoutePolicy::new(Method::PUT, "/tenants/:tenantId", any(&[P::TenantsManage])),
            // Patients
            RoutePolicy::new(Method::GET, "/patients", any(&[P::PatientsRead])),
            RoutePolicy::new(Method::GET, "/patients/:id", any(&[P::PatientsRead])),
            RoutePolicy::new(Method::POST, "/patients", any(&[P::PatientsWrite])),
            RoutePolicy::new(Method::PUT, "/patients/:id", any(&[P::PatientsWrite])),
            RoutePolicy::new(Method::DELETE, "/patients/:id", any(&[P::PatientsDelete])),
            // Appointments
            RoutePolicy::new(Method::GET, "/appointments", any(&[P::AppointmentsRead])),
            RoutePolicy::new(Method::GET, "/appointments/:id", any(&[P::AppointmentsRead])),
            RoutePolicy::new(Method::POST, "/appointments", any(&[P::AppointmentsWrite])),
            RoutePolicy::new(Method::PUT, "/appointments/:id", any(&[P::AppointmentsWrite])),
            RoutePolicy::new(Method::DELETE, "/appointments/:id", any(&[P::AppointmentsDelete])),
            // Pharmacy
            RoutePolicy::new(Method::GET, "/prescriptions", any(&[P::PharmacyRead, P::PatientsRead])),
            RoutePolicy::new(Method::POST, "/prescriptions", any(&[P::PharmacyWrite])),
            RoutePolicy::new(
                Method::POST,
                "/prescriptions/:id/dispense",
                all(&[P::PharmacyRead, P::PharmacyDispense]),
            )
            .with_action("dispense"),
            // Laboratory
            RoutePolicy::new(Method::GET, "/lab/orders", any(&[P::LabRead])),
            RoutePolicy::new(Method::POST, "/lab/orders", any(&[P::LabWrite])),
            RoutePolicy::new(Method::POST, "/lab/orders/:id/approve", any(&[P::LabApprove]))
                .with_action("approve"),
            // In-patient
            RoutePolicy::new(Method::GET, "/ipd/admissions", any(&[P::IpdRead])),
            RoutePolicy::new(Method::POST, "/ipd/admissions", any(&[P::IpdWrite])),
            // Staff and departments
            RoutePolicy::new(Method::GET, "/staff", any(&[P::StaffRead])),
            RoutePolicy::new(Method::POST, "/staff", any(&[P::StaffWrite])),
            RoutePolicy::new(Method::GET, "/departments", any(&[P::DepartmentsRead])),
            RoutePolicy::new(Method::POST, "/departments", any(&[P::DepartmentsWrite])),
            // Billing
            RoutePolicy::new(Method::GET, "/billing/invoices", any(&[P::BillingRead])),
            RoutePolicy::new(Method::POST, "/billing/invoices", any(&[P::BillingWrite])),
        ])
    }
}
