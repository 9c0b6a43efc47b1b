// In-memory store implementations for testing

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{NewSession, NewUser, Session, User},
    repository::{token_digest, SessionStore, UserStore},
};

#[derive(Clone, Default)]
pub struct MockUserRepository {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    fail_last_login: Arc<AtomicBool>,
    stale_email_lookups: Arc<AtomicBool>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `touch_last_login` call fail
    pub fn fail_last_login(&self) {
        self.fail_last_login.store(true, Ordering::SeqCst);
    }

    /// Make `find_by_email` miss existing accounts, as a concurrent registration would
    pub fn stale_email_lookups(&self) {
        self.stale_email_lookups.store(true, Ordering::SeqCst);
    }

    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().remove(&id);
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl UserStore for MockUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(AuthError::DuplicateAccount);
        }

        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            role: user.role,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        if self.stale_email_lookups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), AuthError> {
        if self.fail_last_login.load(Ordering::SeqCst) {
            return Err(AuthError::Database(sqlx::Error::PoolTimedOut));
        }
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, full_name: &str) -> Result<Option<User>, AuthError> {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&id).map(|user| {
            user.full_name = full_name.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

#[derive(Clone, Default)]
pub struct MockSessionRepository {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl MockSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, live or expired
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn sessions_for(&self, user_id: Uuid) -> Vec<Session> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    fn insert(sessions: &mut HashMap<String, Session>, new: NewSession) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            refresh_token_hash: token_digest(&new.refresh_token),
            user_agent: new.user_agent,
            ip_address: new.ip_address,
            expires_at: new.expires_at,
            created_at: Utc::now(),
        };
        sessions.insert(session.refresh_token_hash.clone(), session.clone());
        session
    }
}

#[async_trait]
impl SessionStore for MockSessionRepository {
    async fn create(&self, session: NewSession) -> Result<Session, AuthError> {
        Ok(Self::insert(&mut self.sessions.lock().unwrap(), session))
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(&token_digest(refresh_token))
            .filter(|s| s.expires_at > Utc::now())
            .cloned()
            .ok_or(AuthError::SessionNotFound)
    }

    async fn delete(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.lock().unwrap().remove(&token_digest(refresh_token));
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_expired(&self) -> Result<u64, AuthError> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }

    async fn rotate(
        &self,
        old_refresh_token: &str,
        replacement: NewSession,
    ) -> Result<Session, AuthError> {
        let mut sessions = self.sessions.lock().unwrap();
        let digest = token_digest(old_refresh_token);

        let live = sessions
            .get(&digest)
            .map_or(false, |s| s.expires_at > Utc::now());
        if !live {
            return Err(AuthError::SessionNotFound);
        }
        sessions.remove(&digest);

        Ok(Self::insert(&mut sessions, replacement))
    }
}
