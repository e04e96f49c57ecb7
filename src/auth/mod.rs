// Accounts, bearer sessions and admin privilege grants
pub mod extract;
pub mod password;
pub mod session;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, AuthError};
use crate::ledger::models::{NewUser, PrivilegeGrant, Role, User};
use crate::ledger::money::Money;
use crate::ledger::store::LedgerStore;

pub use extract::{AdminUser, AuthUser};

const DEFAULT_LANGUAGE: &str = "th";
pub const BOOTSTRAP_REASON: &str = "bootstrap";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters long"))]
    pub password: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Account view returned to clients; never carries the password hash
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub account_id: String,
    pub balance: Money,
    pub bonus_balance: Money,
    pub has_claimed_welcome_bonus: bool,
    pub language: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user: User, is_admin: bool) -> Self {
        Self {
            id: user.id,
            email: user.email,
            account_id: user.account_id,
            balance: user.balance,
            bonus_balance: user.bonus_balance,
            has_claimed_welcome_bonus: user.has_claimed_welcome_bonus,
            language: user.language,
            is_active: user.is_active,
            is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

pub struct AuthService {
    store: Arc<dyn LedgerStore>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn LedgerStore>, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthSession> {
        request
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        let email = request.email.trim().to_lowercase();
        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken.into());
        }

        let secret = request.password;
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&secret))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))??;

        let user = self
            .store
            .create_user(NewUser {
                email,
                password_hash,
                account_id: session::generate_account_id(),
                language: request.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            })
            .await?;

        info!("👤 Registered {} (account {})", user.email, user.account_id);
        self.open_session(user).await
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthSession> {
        let user = self
            .store
            .get_user_by_email(request.email.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let secret = request.password;
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || password::verify_password(&secret, &stored))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))??;

        if !matches {
            warn!("🔒 Failed login for {}", user.email);
            return Err(AuthError::InvalidCredentials.into());
        }
        if !user.is_active {
            warn!("🔒 Login refused for disabled account {}", user.id);
            return Err(AuthError::AccountDisabled.into());
        }

        info!("🔑 {} logged in", user.email);
        self.open_session(user).await
    }

    async fn open_session(&self, user: User) -> AppResult<AuthSession> {
        let token = session::generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.store
            .create_session(&session::token_hash(&token), user.id, expires_at)
            .await?;

        Ok(AuthSession {
            token,
            expires_at,
            user: self.profile(user).await?,
        })
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        self.store.delete_session(&session::token_hash(token)).await
    }

    /// Resolve a bearer token to an active user
    pub async fn authenticate(&self, token: &str) -> AppResult<User> {
        let user = self
            .store
            .session_user(&session::token_hash(token))
            .await?
            .ok_or(AuthError::SessionExpired)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }
        Ok(user)
    }

    pub async fn is_admin(&self, user_id: Uuid) -> AppResult<bool> {
        self.store.has_role(user_id, Role::Admin).await
    }

    pub async fn profile(&self, user: User) -> AppResult<UserProfile> {
        let is_admin = self.is_admin(user.id).await?;
        Ok(UserProfile::new(user, is_admin))
    }

    // ========== ADMIN ==========

    pub async fn list_profiles(&self) -> AppResult<Vec<UserProfile>> {
        let users = self.store.list_users().await?;
        let mut profiles = Vec::with_capacity(users.len());
        for user in users {
            profiles.push(self.profile(user).await?);
        }
        Ok(profiles)
    }

    /// Look a user up by id, public account number or email
    pub async fn find_user(&self, key: &str) -> AppResult<User> {
        if let Ok(id) = Uuid::parse_str(key) {
            if let Some(user) = self.store.get_user(id).await? {
                return Ok(user);
            }
        }
        if key.contains('@') {
            if let Some(user) = self.store.get_user_by_email(key).await? {
                return Ok(user);
            }
        }
        self.store
            .list_users()
            .await?
            .into_iter()
            .find(|u| u.account_id == key)
            .ok_or_else(|| AppError::NotFound(format!("User {}", key)))
    }

    pub async fn set_user_active(&self, admin_id: Uuid, user_id: Uuid, active: bool) -> AppResult<UserProfile> {
        let user = self.store.set_user_active(user_id, active).await?;
        info!("👤 Admin {} set {} active={}", admin_id, user_id, active);
        self.profile(user).await
    }

    pub async fn grant_admin(&self, admin_id: Uuid, user_id: Uuid, reason: &str) -> AppResult<PrivilegeGrant> {
        if reason.trim().is_empty() {
            return Err(AppError::InvalidInput("A reason is required for privilege grants".into()));
        }
        let grant = self
            .store
            .grant_privilege(user_id, Role::Admin, Some(admin_id), reason.trim())
            .await?;
        info!("🛡️ Admin {} granted admin to {} ({})", admin_id, user_id, grant.reason);
        Ok(grant)
    }

    pub async fn revoke_grant(&self, admin_id: Uuid, grant_id: Uuid) -> AppResult<PrivilegeGrant> {
        let grant = self.store.revoke_privilege(grant_id, admin_id).await?;
        info!("🛡️ Admin {} revoked grant {} from {}", admin_id, grant_id, grant.user_id);
        Ok(grant)
    }

    pub async fn list_grants(&self) -> AppResult<Vec<PrivilegeGrant>> {
        self.store.list_privilege_grants().await
    }

    /// One audited grant for the configured operator account, if it exists
    pub async fn bootstrap_admin(&self, email: &str) -> AppResult<Option<PrivilegeGrant>> {
        let Some(user) = self.store.get_user_by_email(email).await? else {
            warn!("⚠️ Bootstrap admin {} has no account yet", email);
            return Ok(None);
        };

        let existing = self.store.list_privilege_grants().await?;
        if existing.iter().any(|g| g.user_id == user.id) {
            return Ok(None);
        }

        let grant = self
            .store
            .grant_privilege(user.id, Role::Admin, None, BOOTSTRAP_REASON)
            .await?;
        info!("🛡️ Bootstrap admin grant created for {}", user.email);
        Ok(Some(grant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn service() -> (Arc<MemoryLedger>, AuthService) {
        let ledger = Arc::new(MemoryLedger::new());
        let service = AuthService::new(ledger.clone(), Duration::hours(24));
        (ledger, service)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "supersecret".into(),
            language: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (_, auth) = service();
        let session = auth.register(register_request("New@Example.com")).await.unwrap();

        assert_eq!(session.user.email, "new@example.com");
        assert_eq!(session.user.language, "th");
        assert_eq!(session.user.account_id.len(), 10);
        assert!(!session.user.is_admin);

        let user = auth.authenticate(&session.token).await.unwrap();
        assert_eq!(user.id, session.user.id);

        auth.logout(&session.token).await.unwrap();
        assert!(auth.authenticate(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_short_passwords() {
        let (_, auth) = service();
        auth.register(register_request("dup@example.com")).await.unwrap();
        assert!(matches!(
            auth.register(register_request("DUP@example.com")).await,
            Err(AppError::Auth(AuthError::EmailTaken))
        ));

        let short = RegisterRequest {
            email: "short@example.com".into(),
            password: "1234567".into(),
            language: None,
        };
        assert!(matches!(auth.register(short).await, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_login_checks_password_and_active_flag() {
        let (ledger, auth) = service();
        let session = auth.register(register_request("login@example.com")).await.unwrap();

        let bad = LoginRequest {
            email: "login@example.com".into(),
            password: "nope-nope".into(),
        };
        assert!(matches!(
            auth.login(bad).await,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));

        let good = LoginRequest {
            email: "login@example.com".into(),
            password: "supersecret".into(),
        };
        assert!(auth.login(good.clone()).await.is_ok());

        ledger.set_user_active(session.user.id, false).await.unwrap();
        assert!(matches!(
            auth.login(good).await,
            Err(AppError::Auth(AuthError::AccountDisabled))
        ));
        assert!(auth.authenticate(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_is_audited_once() {
        let (_, auth) = service();
        assert!(auth.bootstrap_admin("ops@example.com").await.unwrap().is_none());

        let session = auth.register(register_request("ops@example.com")).await.unwrap();
        let grant = auth.bootstrap_admin("ops@example.com").await.unwrap().unwrap();
        assert_eq!(grant.user_id, session.user.id);
        assert_eq!(grant.reason, BOOTSTRAP_REASON);
        assert_eq!(grant.granted_by, None);
        assert!(auth.is_admin(session.user.id).await.unwrap());

        assert!(auth.bootstrap_admin("ops@example.com").await.unwrap().is_none());
        assert_eq!(auth.list_grants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grant_and_revoke() {
        let (_, auth) = service();
        let admin = auth.register(register_request("admin@example.com")).await.unwrap();
        let player = auth.register(register_request("player@example.com")).await.unwrap();

        assert!(auth.grant_admin(admin.user.id, player.user.id, "  ").await.is_err());
        let grant = auth
            .grant_admin(admin.user.id, player.user.id, "support rota")
            .await
            .unwrap();
        assert!(auth.is_admin(player.user.id).await.unwrap());

        let revoked = auth.revoke_grant(admin.user.id, grant.id).await.unwrap();
        assert_eq!(revoked.revoked_by, Some(admin.user.id));
        assert!(!auth.is_admin(player.user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_user_by_any_key() {
        let (_, auth) = service();
        let session = auth.register(register_request("find@example.com")).await.unwrap();
        let id = session.user.id;

        assert_eq!(auth.find_user(&id.to_string()).await.unwrap().id, id);
        assert_eq!(auth.find_user("find@example.com").await.unwrap().id, id);
        assert_eq!(auth.find_user(&session.user.account_id).await.unwrap().id, id);
        assert!(auth.find_user("0000000000").await.is_err());
    }
}
