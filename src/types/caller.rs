use super::{ServiceAccount, User};

/// The identity a request acts as. Each variant carries only what that kind
/// of actor has; code that needs an actor-specific value matches exhaustively.
#[derive(Debug, Clone)]
pub enum Caller {
    User(UserCaller),
    ServiceAccount(ServiceAccountCaller),
    System(SystemCaller),
}

#[derive(Debug, Clone)]
pub struct UserCaller {
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct ServiceAccountCaller {
    pub service_account: ServiceAccount,
}

/// Internal jobs and administrative CLI commands.
#[derive(Debug, Clone, Default)]
pub struct SystemCaller;

impl Caller {
    /// The value recorded as `created_by` on rows and activity events.
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Caller::User(c) => c.user.username.clone(),
            Caller::ServiceAccount(c) => {
                format!("service-account:{}", c.service_account.resource_path)
            }
            Caller::System(_) => "system".to_string(),
        }
    }

    /// Id used to look up group grants. System callers have none.
    #[must_use]
    pub fn grant_subject_id(&self) -> Option<&str> {
        match self {
            Caller::User(c) => Some(&c.user.id),
            Caller::ServiceAccount(c) => Some(&c.service_account.id),
            Caller::System(_) => None,
        }
    }

    /// Admin users and the system caller bypass group grants.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        match self {
            Caller::User(c) => c.user.admin,
            Caller::ServiceAccount(_) => false,
            Caller::System(_) => true,
        }
    }
}
