//! Account domain model: identity plus the security state the core mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an account.
///
/// Accounts are never physically deleted; `Disabled` is the terminal state
/// and the record stays behind for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Pending,
    Active,
    Disabled,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Capabilities granted through a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    ManageAccounts,
    ViewAuditLog,
    ManagePolicies,
    ViewPolicies,
    SubmitClaims,
    ViewClaims,
    ManageEnrollments,
    ViewDashboards,
}

impl Permission {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageAccounts => "accounts:manage",
            Self::ViewAuditLog => "audit:view",
            Self::ManagePolicies => "policies:manage",
            Self::ViewPolicies => "policies:view",
            Self::SubmitClaims => "claims:submit",
            Self::ViewClaims => "claims:view",
            Self::ManageEnrollments => "enrollments:manage",
            Self::ViewDashboards => "dashboards:view",
        }
    }
}

/// Closed set of platform roles, each carrying a static permission set.
///
/// Authorization checks go through [`Role::can`], a capability lookup rather
/// than string matching or runtime reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Broker,
    Provider,
    Company,
}

impl Role {
    #[must_use]
    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Admin => &[
                Permission::ManageAccounts,
                Permission::ViewAuditLog,
                Permission::ManagePolicies,
                Permission::ViewPolicies,
                Permission::SubmitClaims,
                Permission::ViewClaims,
                Permission::ManageEnrollments,
                Permission::ViewDashboards,
            ],
            Self::Broker => &[
                Permission::ViewPolicies,
                Permission::ManageEnrollments,
                Permission::ViewDashboards,
            ],
            Self::Provider => &[
                Permission::SubmitClaims,
                Permission::ViewClaims,
                Permission::ViewDashboards,
            ],
            Self::Company => &[
                Permission::ViewPolicies,
                Permission::ViewClaims,
                Permission::ViewDashboards,
            ],
        }
    }

    #[must_use]
    pub fn can(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Broker => "broker",
            Self::Provider => "provider",
            Self::Company => "company",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "broker" => Some(Self::Broker),
            "provider" => Some(Self::Provider),
            "company" => Some(Self::Company),
            _ => None,
        }
    }

    /// Permission names as they appear in the `authorities` token claim.
    #[must_use]
    pub fn authorities(self) -> Vec<String> {
        self.permissions()
            .iter()
            .map(|permission| permission.as_str().to_string())
            .collect()
    }
}

/// A persisted account record.
///
/// Emails are stored normalized to lowercase so the unique constraint and
/// all lookups are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub email_verified: bool,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub reset_token_hash: Option<Vec<u8>>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub verification_token_hash: Option<Vec<u8>>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub backup_code_hashes: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh, unverified account in `Pending` status.
    #[must_use]
    pub fn new(username: String, email: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            role,
            status: AccountStatus::Pending,
            email_verified: false,
            failed_login_attempts: 0,
            locked_until: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            verification_token_hash: None,
            verification_token_expires_at: None,
            mfa_enabled: false,
            mfa_secret: None,
            backup_code_hashes: Vec::new(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Account, AccountStatus, Permission, Role};

    #[test]
    fn new_account_starts_pending_and_unverified() {
        let account = Account::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "$argon2id$fake".to_string(),
            Role::Broker,
        );
        assert_eq!(account.status, AccountStatus::Pending);
        assert!(!account.email_verified);
        assert_eq!(account.failed_login_attempts, 0);
        assert!(account.locked_until.is_none());
        assert!(!account.mfa_enabled);
    }

    #[test]
    fn admin_holds_every_permission() {
        for permission in Role::Broker
            .permissions()
            .iter()
            .chain(Role::Provider.permissions())
            .chain(Role::Company.permissions())
        {
            assert!(Role::Admin.can(*permission));
        }
    }

    #[test]
    fn provider_cannot_manage_accounts() {
        assert!(!Role::Provider.can(Permission::ManageAccounts));
        assert!(Role::Provider.can(Permission::SubmitClaims));
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Admin, Role::Broker, Role::Provider, Role::Company] {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("superuser"), None);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            AccountStatus::Pending,
            AccountStatus::Active,
            AccountStatus::Disabled,
        ] {
            assert_eq!(AccountStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn authorities_flatten_permission_names() {
        let authorities = Role::Provider.authorities();
        assert!(authorities.contains(&"claims:submit".to_string()));
        assert!(!authorities.contains(&"accounts:manage".to_string()));
    }
}
