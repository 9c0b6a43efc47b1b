// Authentication service - business logic layer

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    middleware::bearer_token,
    models::{
        AuthResponse, ClientInfo, LoginRequest, NewSession, NewUser, PublicUser, RegisterRequest,
        Role, TokenPair, UpdateProfileRequest, User, UserProfile,
    },
    password::PasswordService,
    repository::{SessionStore, UserStore},
    token::TokenService,
};

/// Authentication service coordinating all auth operations
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    passwords: PasswordService,
    tokens: Arc<TokenService>,
}

/// Store-level "no live session" becomes the client-facing refresh failure
fn session_gone(err: AuthError) -> AuthError {
    match err {
        AuthError::SessionNotFound => AuthError::InvalidOrExpiredToken,
        other => other,
    }
}

impl AuthService {
    /// Create a new AuthService
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        passwords: PasswordService,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users,
            sessions,
            passwords,
            tokens,
        }
    }

    pub fn tokens(&self) -> Arc<TokenService> {
        Arc::clone(&self.tokens)
    }

    /// Issue an access/refresh pair and persist the refresh session
    async fn open_session(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> Result<(String, String), AuthError> {
        let access_token = self
            .tokens
            .issue_access_token(user.id, &user.email, user.role)?;
        let (refresh_token, expires_at) = self.tokens.issue_refresh_token(user.id)?;

        self.sessions
            .create(NewSession {
                user_id: user.id,
                refresh_token: refresh_token.clone(),
                user_agent: client.user_agent.clone(),
                ip_address: client.ip_address.clone(),
                expires_at,
            })
            .await?;

        Ok((access_token, refresh_token))
    }

    /// Register a new user
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<AuthResponse, AuthError> {
        request.validate()?;
        self.passwords.check_strength(&request.password)?;

        if self.users.find_by_email(&request.email).await?.is_some() {
            warn!("Registration rejected: email already registered");
            return Err(AuthError::DuplicateAccount);
        }

        let password_hash = self.passwords.hash(&request.password)?;
        let user = self
            .users
            .create(NewUser {
                email: request.email,
                password_hash,
                full_name: request.full_name.trim().to_string(),
                role: Role::default(),
            })
            .await?;

        let (access_token, refresh_token) = self.open_session(&user, client).await?;

        info!("Registered user {}", user.id);
        Ok(AuthResponse {
            access_token,
            refresh_token,
            user: PublicUser::from(&user),
        })
    }

    /// Login a user
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<AuthResponse, AuthError> {
        request.validate()?;

        let user = match self.users.find_by_email(&request.email).await? {
            Some(user) => user,
            None => {
                warn!("Login failed: unknown account");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if self
            .passwords
            .verify(&user.password_hash, &request.password)
            .is_err()
        {
            warn!("Login failed: bad password for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        if let Err(e) = self.users.touch_last_login(user.id).await {
            warn!("Failed to record last login for user {}: {}", user.id, e);
        }

        let (access_token, refresh_token) = self.open_session(&user, client).await?;

        info!("User {} logged in", user.id);
        Ok(AuthResponse {
            access_token,
            refresh_token,
            user: PublicUser::from(&user),
        })
    }

    /// Exchange a refresh token for a new pair, retiring the old session
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::field("refresh_token", "required"));
        }

        let user_id = self
            .tokens
            .validate_refresh_token(refresh_token)
            .map_err(|_| {
                warn!("Refresh rejected: token failed validation");
                AuthError::InvalidOrExpiredToken
            })?;

        let session = self
            .sessions
            .get_by_refresh_token(refresh_token)
            .await
            .map_err(session_gone)?;
        if session.user_id != user_id {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let access_token = self
            .tokens
            .issue_access_token(user.id, &user.email, user.role)?;
        let (new_refresh_token, expires_at) = self.tokens.issue_refresh_token(user.id)?;

        self.sessions
            .rotate(
                refresh_token,
                NewSession {
                    user_id: user.id,
                    refresh_token: new_refresh_token.clone(),
                    user_agent: client.user_agent.clone(),
                    ip_address: client.ip_address.clone(),
                    expires_at,
                },
            )
            .await
            .map_err(session_gone)?;

        debug!("Rotated session for user {}", user.id);
        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
        })
    }

    /// End the session named by the body token, or else by the bearer value
    ///
    /// Always succeeds; store failures are logged.
    pub async fn logout(&self, body_token: Option<&str>, authorization: Option<&str>) {
        let token = body_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| authorization.and_then(bearer_token));

        let Some(token) = token else {
            debug!("Logout without a token");
            return;
        };

        if let Err(e) = self.sessions.delete(token).await {
            warn!("Failed to delete session on logout: {}", e);
        }
    }

    /// Revoke every session the user holds
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.sessions.delete_all_for_user(user_id).await?;
        info!("Revoked {} sessions for user {}", revoked, user_id);
        Ok(revoked)
    }

    /// Get current user information
    pub async fn get_current_user(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, AuthError> {
        request.validate()?;

        self.users
            .update_profile(user_id, request.full_name.trim())
            .await?
            .map(UserProfile::from)
            .ok_or(AuthError::UserNotFound)
    }

    /// Drop sessions past their expiry
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        self.sessions.delete_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mock::{MockSessionRepository, MockUserRepository};
    use crate::auth::password::test_password_service;
    use crate::auth::token::test_token_service;
    use chrono::Utc;

    struct Harness {
        service: AuthService,
        users: MockUserRepository,
        sessions: MockSessionRepository,
    }

    fn harness() -> Harness {
        let users = MockUserRepository::new();
        let sessions = MockSessionRepository::new();
        let service = AuthService::new(
            Arc::new(users.clone()),
            Arc::new(sessions.clone()),
            test_password_service(),
            Arc::new(test_token_service()),
        );
        Harness {
            service,
            users,
            sessions,
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            user_agent: "test-agent/1.0".to_string(),
            ip_address: "203.0.113.7".to_string(),
        }
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "correct horse".to_string(),
            full_name: "Ada Lovelace".to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_issues_tokens_and_session() {
        let h = harness();
        let response = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();

        assert_eq!(response.user.email, "ada@example.com");
        assert_eq!(response.user.full_name, "Ada Lovelace");
        assert_eq!(response.user.role, Role::Senior);

        let claims = test_token_service()
            .validate_access_token(&response.access_token)
            .unwrap();
        assert_eq!(claims.user_id().unwrap(), response.user.id);

        let sessions = h.sessions.sessions_for(response.user.id);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_agent, "test-agent/1.0");
        assert_eq!(sessions[0].ip_address, "203.0.113.7");

        let stored = h.users.get(response.user.id).unwrap();
        assert_ne!(stored.password_hash, "correct horse");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let h = harness();
        h.service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();

        let result = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await;
        assert!(matches!(result, Err(AuthError::DuplicateAccount)));
    }

    #[tokio::test]
    async fn test_register_race_surfaces_duplicate_from_store() {
        let h = harness();
        h.service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        assert_eq!(h.sessions.len(), 1);

        // Pre-check misses; the store's uniqueness check still rejects the insert
        h.users.stale_email_lookups();
        let result = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await;

        assert!(matches!(result, Err(AuthError::DuplicateAccount)));
        assert_eq!(h.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_register_weak_password_creates_nothing() {
        let h = harness();
        let mut request = register_request("ada@example.com");
        request.password = "short".to_string();

        let result = h.service.register(request, &client()).await;
        assert!(matches!(result, Err(AuthError::WeakCredential { min_length: 8 })));
        assert!(h
            .users
            .find_by_email("ada@example.com")
            .await
            .unwrap()
            .is_none());
        assert_eq!(h.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_register_validates_fields() {
        let h = harness();
        let request = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "correct horse".to_string(),
            full_name: "   ".to_string(),
        };

        match h.service.register(request, &client()).await {
            Err(AuthError::Validation(errors)) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("full_name"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        h.service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();

        let wrong_password = h
            .service
            .login(login_request("ada@example.com", "battery staple"), &client())
            .await
            .unwrap_err();
        let unknown_email = h
            .service
            .login(login_request("nobody@example.com", "correct horse"), &client())
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.error_code(), unknown_email.error_code());
        assert_eq!(wrong_password.error_message(), unknown_email.error_message());
    }

    #[tokio::test]
    async fn test_login_with_malformed_email_is_invalid_credentials() {
        let h = harness();

        let err = h
            .service
            .login(login_request("not-an-email", "correct horse"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = h
            .service
            .login(login_request("", "correct horse"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_login_records_last_login() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        assert!(h.users.get(registered.user.id).unwrap().last_login_at.is_none());

        h.service
            .login(login_request("ada@example.com", "correct horse"), &client())
            .await
            .unwrap();
        assert!(h.users.get(registered.user.id).unwrap().last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_login_survives_last_login_failure() {
        let h = harness();
        h.service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        h.users.fail_last_login();

        let result = h
            .service
            .login(login_request("ada@example.com", "correct horse"), &client())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_session() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        let r1 = registered.refresh_token;

        let pair = h.service.refresh(&r1, &client()).await.unwrap();
        assert_ne!(pair.refresh_token, r1);
        assert!(test_token_service()
            .validate_access_token(&pair.access_token)
            .is_ok());

        // Old token is dead
        let reused = h.service.refresh(&r1, &client()).await;
        assert!(matches!(reused, Err(AuthError::InvalidOrExpiredToken)));

        // New token works exactly once
        let r2 = pair.refresh_token;
        assert!(h.service.refresh(&r2, &client()).await.is_ok());
        assert!(matches!(
            h.service.refresh(&r2, &client()).await,
            Err(AuthError::InvalidOrExpiredToken)
        ));

        assert_eq!(h.sessions.sessions_for(registered.user.id).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_single_winner() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        let token = registered.refresh_token;
        let info = client();

        let (a, b) = tokio::join!(
            h.service.refresh(&token, &info),
            h.service.refresh(&token, &info)
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(h.sessions.sessions_for(registered.user.id).len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_requires_token() {
        let h = harness();
        assert!(matches!(
            h.service.refresh("", &client()).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            h.service.refresh("   ", &client()).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_with_forged_token() {
        let h = harness();
        assert!(matches!(
            h.service.refresh("garbage.token.value", &client()).await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_with_unpersisted_token() {
        let h = harness();
        let (token, _) = test_token_service()
            .issue_refresh_token(Uuid::new_v4())
            .unwrap();

        assert!(matches!(
            h.service.refresh(&token, &client()).await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_for_vanished_user() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        h.users.remove(registered.user.id);

        assert!(matches!(
            h.service.refresh(&registered.refresh_token, &client()).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_two_logins_are_independent_sessions() {
        let h = harness();
        h.service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();

        let first = h
            .service
            .login(login_request("ada@example.com", "correct horse"), &client())
            .await
            .unwrap();
        let second = h
            .service
            .login(login_request("ada@example.com", "correct horse"), &client())
            .await
            .unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        h.service.logout(Some(&first.refresh_token), None).await;

        assert!(matches!(
            h.service.refresh(&first.refresh_token, &client()).await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
        assert!(h.service.refresh(&second.refresh_token, &client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_falls_back_to_bearer_header() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        let header = format!("Bearer {}", registered.refresh_token);

        h.service.logout(Some(""), Some(&header)).await;

        assert!(matches!(
            h.service.refresh(&registered.refresh_token, &client()).await,
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_logout_without_token_is_noop() {
        let h = harness();
        h.service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();

        h.service.logout(None, None).await;
        h.service.logout(Some("unknown-token"), None).await;
        assert_eq!(h.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_logout_all_revokes_every_session() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        let login = h
            .service
            .login(login_request("ada@example.com", "correct horse"), &client())
            .await
            .unwrap();

        let revoked = h.service.logout_all(registered.user.id).await.unwrap();
        assert_eq!(revoked, 2);
        assert!(h.service.refresh(&login.refresh_token, &client()).await.is_err());
    }

    #[tokio::test]
    async fn test_profile_read_and_update() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();

        let profile = h.service.get_current_user(registered.user.id).await.unwrap();
        assert_eq!(profile.full_name, "Ada Lovelace");

        let updated = h
            .service
            .update_profile(
                registered.user.id,
                UpdateProfileRequest {
                    full_name: "  Countess Ada ".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Countess Ada");
        assert!(updated.updated_at >= profile.updated_at);

        let blank = h
            .service
            .update_profile(
                registered.user.id,
                UpdateProfileRequest {
                    full_name: " ".to_string(),
                },
            )
            .await;
        assert!(matches!(blank, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_user_profile() {
        let h = harness();
        assert!(matches!(
            h.service.get_current_user(Uuid::new_v4()).await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            h.service
                .update_profile(
                    Uuid::new_v4(),
                    UpdateProfileRequest {
                        full_name: "Someone".to_string()
                    }
                )
                .await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_sessions() {
        let h = harness();
        let registered = h
            .service
            .register(register_request("ada@example.com"), &client())
            .await
            .unwrap();
        h.sessions
            .create(NewSession {
                user_id: registered.user.id,
                refresh_token: "stale".to_string(),
                user_agent: String::new(),
                ip_address: String::new(),
                expires_at: Utc::now() - chrono::Duration::minutes(1),
            })
            .await
            .unwrap();

        assert_eq!(h.service.purge_expired_sessions().await.unwrap(), 1);
        assert_eq!(h.sessions.len(), 1);
        assert!(h.service.refresh(&registered.refresh_token, &client()).await.is_ok());
    }
}
