//! Accounts: registration, login, logout, profile and token resolution

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{NewUser, Owner, ProfileUpdate, Role, User};
use vet_clinic_data::repository::{OwnerRepository, UserRepository};

use super::logging::{
    log_auth_event, log_failed_login, log_logout, log_registration, log_successful_login,
    AuthEvent, AuthEventType,
};
use super::password::{hash_password, verify_password};
use super::token::{generate_token, revoke_token, validate_token, AuthConfig};
use super::Claims;
use crate::access::Actor;
use crate::error::{validate_payload, ServiceError};
use crate::services::contact::same_phone;

const INVALID_CREDENTIALS: &str = "Invalid username or password";
pub(crate) const MIN_PASSWORD_LEN: usize = 8;

/// Verified against when the username is unknown so that both failures cost
/// one full hash derivation
static DUMMY_PASSWORD_HASH: Lazy<String> = Lazy::new(|| hash_password("no-such-account"));

/// Owner self-registration
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 150, message = "Username must have between 3 and 150 characters"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Issued bearer token and the account it belongs to
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ProfileResponse {
    pub user: User,
    pub owner: Option<Owner>,
}

/// Profile edit; the current password is always required
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ProfileUpdateRequest {
    pub current_password: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub new_password: Option<String>,
    pub new_password_confirmation: Option<String>,
}

/// Trait for account operations
#[async_trait]
pub trait AuthServiceTrait: Send + Sync {
    async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError>;

    async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError>;

    /// Revoke the token the caller used
    async fn logout(&self, actor: &Actor, claims: &Claims);

    async fn profile(&self, actor: &Actor) -> Result<ProfileResponse, ServiceError>;

    async fn update_profile(
        &self,
        actor: &Actor,
        request: ProfileUpdateRequest,
    ) -> Result<ProfileResponse, ServiceError>;

    /// Validate a bearer token and load the caller from its current user row
    async fn authenticate(&self, token: &str) -> Result<(Actor, Claims), ServiceError>;

    /// Create the configured superuser when the database has no users yet
    async fn bootstrap_admin(&self, username: &str, password: &str) -> Result<Option<User>, ServiceError>;
}

pub struct AuthService {
    config: AuthConfig,
    users: UserRepository,
    owners: OwnerRepository,
}

impl AuthService {
    pub fn new(pool: DatabasePool, config: AuthConfig) -> Self {
        Self {
            config,
            users: UserRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool),
        }
    }

    fn issue(&self, user: User) -> Result<AuthResponse, ServiceError> {
        let (access_token, _) = generate_token(&self.config, user.id).map_err(|e| {
            error!("Failed to generate access token: {}", e);
            ServiceError::Repository("Failed to generate token".to_string())
        })?;
        Ok(AuthResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.expires_in(),
            user,
        })
    }

    /// Whether another account already uses this phone
    fn phone_in_use(&self, phone: &str, exclude_user: Option<i64>) -> Result<bool, ServiceError> {
        if phone.trim().is_empty() {
            return Ok(false);
        }
        Ok(self
            .users
            .contact_phones()?
            .iter()
            .any(|(user_id, other)| Some(*user_id) != exclude_user && same_phone(phone, other)))
    }

    fn profile_of(&self, user: User) -> Result<ProfileResponse, ServiceError> {
        let owner = if user.role == Role::Owner {
            self.owners.get_by_user(user.id)?
        } else {
            None
        };
        Ok(ProfileResponse { user, owner })
    }
}

#[async_trait]
impl AuthServiceTrait for AuthService {
    async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        validate_payload(&request)?;
        if request.password != request.password_confirmation {
            return Err(ServiceError::validation("Passwords do not match"));
        }
        if self.users.username_exists(&request.username)? {
            log_registration(&request.username, false, Some("username taken"));
            return Err(ServiceError::conflict("That username is already taken"));
        }
        if self.users.email_in_use(&request.email, None)? {
            log_registration(&request.username, false, Some("email taken"));
            return Err(ServiceError::conflict("That email is already registered"));
        }
        if self.phone_in_use(&request.phone, None)? {
            log_registration(&request.username, false, Some("phone taken"));
            return Err(ServiceError::conflict("That phone is already registered"));
        }

        let mut new_user = NewUser::basic(request.username.trim(), &hash_password(&request.password), Role::Owner);
        new_user.email = request.email.trim().to_string();
        new_user.first_name = request.first_name.trim().to_string();
        new_user.last_name = request.last_name.trim().to_string();
        new_user.phone = request.phone.trim().to_string();
        new_user.address = request.address.trim().to_string();

        let user = self.users.create(&new_user)?;
        log_registration(&user.username, true, None);
        info!("Registered owner account {}", user.id);
        self.issue(user)
    }

    async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        let start = Instant::now();
        let user = match self.users.get_by_username(&request.username)? {
            Some(user) => user,
            None => {
                let _ = verify_password(&request.password, &DUMMY_PASSWORD_HASH);
                log_failed_login(&request.username, "unknown username");
                return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
        };

        let matches = verify_password(&request.password, &user.password_hash).unwrap_or_else(|e| {
            error!("Stored password hash of user {} is unusable: {}", user.id, e);
            false
        });
        if !matches {
            log_failed_login(&request.username, "wrong password");
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        if !user.is_active {
            log_failed_login(&request.username, "inactive account");
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let user_id = user.id.to_string();
        let response = self.issue(user)?;
        log_auth_event(
            AuthEvent::new(AuthEventType::Login, Some(&user_id), true)
                .with_duration(start.elapsed().as_millis() as u64)
                .with_auth_method("password"),
        );
        log_successful_login(&request.username);
        Ok(response)
    }

    async fn logout(&self, actor: &Actor, claims: &Claims) {
        revoke_token(claims);
        log_logout(&actor.user_id.to_string());
    }

    async fn profile(&self, actor: &Actor) -> Result<ProfileResponse, ServiceError> {
        let user = self
            .users
            .get(actor.user_id)?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;
        self.profile_of(user)
    }

    async fn update_profile(
        &self,
        actor: &Actor,
        request: ProfileUpdateRequest,
    ) -> Result<ProfileResponse, ServiceError> {
        validate_payload(&request)?;
        let user = self
            .users
            .get(actor.user_id)?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;

        if !verify_password(&request.current_password, &user.password_hash).unwrap_or(false) {
            warn!("Profile update of user {} with a wrong current password", user.id);
            return Err(ServiceError::validation("The current password is not correct"));
        }
        let email = request.email.trim();
        if !email.is_empty() && !validator::validate_email(email) {
            return Err(ServiceError::validation("Enter a valid email address"));
        }
        if !email.is_empty() && self.users.email_in_use(email, Some(user.id))? {
            return Err(ServiceError::conflict("That email is already registered"));
        }
        if self.phone_in_use(&request.phone, Some(user.id))? {
            return Err(ServiceError::conflict("That phone is already registered"));
        }

        let password_hash = match (&request.new_password, &request.new_password_confirmation) {
            (None, None) => None,
            (Some(new), confirmation) if !new.is_empty() || confirmation.as_deref().map_or(false, |c| !c.is_empty()) => {
                if confirmation.as_deref() != Some(new.as_str()) {
                    return Err(ServiceError::validation("The new passwords do not match"));
                }
                if new.chars().count() < MIN_PASSWORD_LEN {
                    return Err(ServiceError::validation(format!(
                        "The new password must have at least {} characters",
                        MIN_PASSWORD_LEN
                    )));
                }
                Some(hash_password(new))
            }
            (None, Some(confirmation)) if !confirmation.is_empty() => {
                return Err(ServiceError::validation("Enter the new password"));
            }
            _ => None,
        };
        let password_changed = password_hash.is_some();

        let updated = self.users.update_profile(
            user.id,
            &ProfileUpdate {
                email: email.to_string(),
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                phone: request.phone.trim().to_string(),
                address: request.address.trim().to_string(),
                password_hash,
            },
        )?;

        log_auth_event(
            AuthEvent::new(AuthEventType::ProfileUpdate, Some(&updated.id.to_string()), true)
                .with_details(if password_changed { "profile and password" } else { "profile" }),
        );
        self.profile_of(updated)
    }

    async fn authenticate(&self, token: &str) -> Result<(Actor, Claims), ServiceError> {
        let claims = validate_token(&self.config, token)
            .map_err(|e| ServiceError::Unauthorized(e.to_string()))?;
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| ServiceError::Unauthorized("Invalid token subject".to_string()))?;

        let user = self
            .users
            .get(user_id)?
            .ok_or_else(|| ServiceError::Unauthorized("Unknown user".to_string()))?;
        if !user.is_active {
            return Err(ServiceError::Unauthorized("Account disabled".to_string()));
        }
        Ok((Actor::from_user(&user), claims))
    }

    async fn bootstrap_admin(&self, username: &str, password: &str) -> Result<Option<User>, ServiceError> {
        if username.trim().is_empty() || password.is_empty() {
            return Ok(None);
        }
        if self.users.count()? > 0 {
            return Ok(None);
        }

        let mut admin = NewUser::basic(username.trim(), &hash_password(password), Role::Admin);
        admin.is_superuser = true;
        let user = self.users.create(&admin)?;

        log_auth_event(
            AuthEvent::new(AuthEventType::Bootstrap, Some(&user.username), true)
                .with_details("Superuser created from configuration"),
        );
        Ok(Some(user))
    }
}

/// Create the account service backed by `pool`
pub fn create_default_auth_service(pool: DatabasePool, config: AuthConfig) -> Arc<dyn AuthServiceTrait> {
    Arc::new(AuthService::new(pool, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vet_clinic_data::database::initialize_in_memory_pool;

    fn service() -> AuthService {
        service_with_pool().0
    }

    fn service_with_pool() -> (AuthService, DatabasePool) {
        let pool = initialize_in_memory_pool().unwrap();
        let service = AuthService::new(pool.clone(), AuthConfig::new("test_secret", "test-issuer", 30));
        (service, pool)
    }

    fn deactivate(pool: &DatabasePool, user_id: i64) {
        pool.get()
            .unwrap()
            .execute("UPDATE users SET is_active = 0 WHERE id = ?1", [user_id])
            .unwrap();
    }

    fn registration(username: &str, email: &str, phone: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            first_name: "Ana".to_string(),
            last_name: "Gómez".to_string(),
            phone: phone.to_string(),
            address: "San Martín 12".to_string(),
            password: "secret-pass".to_string(),
            password_confirmation: "secret-pass".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service();
        let registered = service
            .register(registration("ana", "ana@example.com", "351-555-0101"))
            .await
            .unwrap();
        assert_eq!(registered.user.role, Role::Owner);
        assert_eq!(registered.expires_in, 1800);

        let (actor, _) = service.authenticate(&registered.access_token).await.unwrap();
        assert_eq!(actor.user_id, registered.user.id);

        let profile = service.profile(&actor).await.unwrap();
        assert_eq!(profile.owner.unwrap().phone, "351-555-0101");

        let login = service
            .login(LoginRequest {
                username: "ANA".to_string(),
                password: "secret-pass".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(login.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let service = service();
        service
            .register(registration("ana", "ana@example.com", "351-555-0101"))
            .await
            .unwrap();

        let same_email = service
            .register(registration("beto", "ANA@example.com", "351-555-0999"))
            .await;
        assert!(matches!(same_email, Err(ServiceError::Conflict(_))));

        let same_phone = service
            .register(registration("beto", "beto@example.com", "(351) 5550101"))
            .await;
        assert!(matches!(same_phone, Err(ServiceError::Conflict(_))));

        let mut mismatch = registration("carla", "carla@example.com", "111");
        mismatch.password_confirmation = "other-pass".to_string();
        assert!(matches!(service.register(mismatch).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_failure_does_not_say_why() {
        let service = service();
        service
            .register(registration("ana", "ana@example.com", "351"))
            .await
            .unwrap();

        let wrong_password = service
            .login(LoginRequest {
                username: "ana".to_string(),
                password: "nope".to_string(),
            })
            .await
            .unwrap_err();
        let unknown_user = service
            .login(LoginRequest {
                username: "nobody".to_string(),
                password: "nope".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(wrong_password.message(), unknown_user.message());
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let service = service();
        let registered = service
            .register(registration("ana", "ana@example.com", "351"))
            .await
            .unwrap();
        let (actor, claims) = service.authenticate(&registered.access_token).await.unwrap();

        service.logout(&actor, &claims).await;

        assert!(matches!(
            service.authenticate(&registered.access_token).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_update_rules() {
        let service = service();
        let registered = service
            .register(registration("ana", "ana@example.com", "351"))
            .await
            .unwrap();
        let actor = Actor::from_user(&registered.user);
        let request = ProfileUpdateRequest {
            current_password: "secret-pass".to_string(),
            first_name: "Ana María".to_string(),
            last_name: "Gómez".to_string(),
            email: "ana.maria@example.com".to_string(),
            phone: "351-000".to_string(),
            address: "Belgrano 9".to_string(),
            new_password: Some("short".to_string()),
            new_password_confirmation: Some("short".to_string()),
        };

        let too_short = service.update_profile(&actor, request.clone()).await;
        assert!(matches!(too_short, Err(ServiceError::Validation(_))));

        let mut wrong_current = request.clone();
        wrong_current.current_password = "bad".to_string();
        assert!(service.update_profile(&actor, wrong_current).await.is_err());

        let mut ok = request;
        ok.new_password = Some("much-longer-pass".to_string());
        ok.new_password_confirmation = Some("much-longer-pass".to_string());
        let updated = service.update_profile(&actor, ok).await.unwrap();
        assert_eq!(updated.user.first_name, "Ana María");
        assert_eq!(updated.owner.unwrap().address, "Belgrano 9");

        assert!(service
            .login(LoginRequest {
                username: "ana".to_string(),
                password: "much-longer-pass".to_string(),
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_on_empty_database() {
        let service = service();
        let admin = service.bootstrap_admin("root", "root-password").await.unwrap().unwrap();
        assert!(admin.is_superuser);
        assert_eq!(admin.role, Role::Admin);

        assert!(service.bootstrap_admin("other", "pw-123456").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_username_gets_the_generic_error() {
        let service = service();
        let error = service
            .login(LoginRequest {
                username: "nobody".to_string(),
                password: "whatever-pass".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(error, ServiceError::Unauthorized(ref message) if message == INVALID_CREDENTIALS));
        // the stand-in hash must be well formed or the unknown-user path skips the derivation
        assert!(!verify_password("whatever-pass", &DUMMY_PASSWORD_HASH).unwrap());
    }

    #[tokio::test]
    async fn test_inactive_account_cannot_login() {
        let (service, pool) = service_with_pool();
        let registered = service
            .register(registration("ana", "ana@example.com", "351"))
            .await
            .unwrap();
        deactivate(&pool, registered.user.id);

        let error = service
            .login(LoginRequest {
                username: "ana".to_string(),
                password: "secret-pass".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Unauthorized(ref message) if message == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_disabled_account_token_stops_working() {
        let (service, pool) = service_with_pool();
        let registered = service
            .register(registration("ana", "ana@example.com", "351"))
            .await
            .unwrap();
        assert!(service.authenticate(&registered.access_token).await.is_ok());

        deactivate(&pool, registered.user.id);

        assert!(matches!(
            service.authenticate(&registered.access_token).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
