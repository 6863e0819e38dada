use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::auth::ledger::{hash_token, TokenEntry, TokenLedger};
use crate::domain::{NewUser, Role, RoleName, User};
use crate::error::{AppError, DatabaseError};
use crate::store::{CredentialStore, EMAIL_TAKEN, USERNAME_TAKEN, USER_NOT_FOUND};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    roles: HashMap<RoleName, Role>,
    tokens: Vec<TokenEntry>,
}

impl State {
    fn role(&mut self, name: RoleName) -> Role {
        self.roles
            .entry(name)
            .or_insert_with(|| Role {
                id: Uuid::new_v4(),
                name,
            })
            .clone()
    }

    fn user_mut(&mut self, user_id: Uuid) -> Result<&mut User, AppError> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))
    }

    fn revoke_valid(&mut self, user_id: Uuid) -> u64 {
        let mut changed = 0;
        for entry in self
            .tokens
            .iter_mut()
            .filter(|t| t.user_id == user_id && !t.is_retired())
        {
            entry.retire();
            changed += 1;
        }
        changed
    }

    fn insert_token(&mut self, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError> {
        if !self.users.contains_key(&user_id) {
            return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
        }
        let token_hash = hash_token(token);
        if self.tokens.iter().any(|t| t.token_hash == token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation("tokens_token_hash_key".to_string()).into());
        }
        let entry = TokenEntry::new(user_id, token);
        self.tokens.push(entry.clone());
        Ok(entry)
    }
}

/// Process-local storage guarded by a single mutex. Every operation runs in
/// one critical section, so multi-step operations are atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
    }

    pub fn user_count(&self) -> usize {
        self.lock().map(|state| state.users.len()).unwrap_or(0)
    }

    pub fn role_count(&self) -> usize {
        self.lock().map(|state| state.roles.len()).unwrap_or(0)
    }

    /// All ledger entries for a user, retired ones included.
    pub fn tokens_for(&self, user_id: Uuid) -> Vec<TokenEntry> {
        self.lock()
            .map(|state| {
                state
                    .tokens
                    .iter()
                    .filter(|t| t.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        Ok(self.lock()?.users.values().any(|u| u.username == username))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.lock()?.users.values().any(|u| u.email == email))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut state = self.lock()?;

        if state.users.values().any(|u| u.username == user.username) {
            return Err(AppError::DuplicateIdentity(USERNAME_TAKEN.to_string()));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::DuplicateIdentity(EMAIL_TAKEN.to_string()));
        }

        let mut roles = user.roles;
        roles.sort();
        roles.dedup();
        for role in &roles {
            state.role(*role);
        }

        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            image_url: user.image_url,
            roles,
            created_at: Utc::now(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_or_create_role(&self, name: RoleName) -> Result<Role, AppError> {
        Ok(self.lock()?.role(name))
    }

    async fn set_user_role(&self, user_id: Uuid, role: RoleName, granted: bool) -> Result<User, AppError> {
        let mut state = self.lock()?;
        state.role(role);

        let user = state.user_mut(user_id)?;
        if granted {
            if !user.roles.contains(&role) {
                user.roles.push(role);
                user.roles.sort();
            }
        } else {
            user.roles.retain(|r| *r != role);
        }
        Ok(user.clone())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut state = self.lock()?;
        state.user_mut(user_id)?.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        username: &str,
        image_url: Option<&str>,
    ) -> Result<User, AppError> {
        let mut state = self.lock()?;

        if state
            .users
            .values()
            .any(|u| u.id != user_id && u.username == username)
        {
            return Err(AppError::DuplicateIdentity(USERNAME_TAKEN.to_string()));
        }

        let user = state.user_mut(user_id)?;
        user.username = username.to_string();
        user.image_url = image_url.map(str::to_string);
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        state.tokens.retain(|t| t.user_id != user_id);
        Ok(true)
    }
}

#[async_trait]
impl TokenLedger for InMemoryStore {
    async fn record_issued_token(&self, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError> {
        self.lock()?.insert_token(user_id, token)
    }

    async fn list_valid_tokens(&self, user_id: Uuid) -> Result<Vec<TokenEntry>, AppError> {
        Ok(self
            .lock()?
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && !t.is_retired())
            .cloned()
            .collect())
    }

    async fn revoke_all_valid_tokens(&self, user_id: Uuid) -> Result<u64, AppError> {
        Ok(self.lock()?.revoke_valid(user_id))
    }

    async fn find_by_token_string(&self, token: &str) -> Result<Option<TokenEntry>, AppError> {
        let token_hash = hash_token(token);
        Ok(self
            .lock()?
            .tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_all_and_record(&self, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError> {
        let mut state = self.lock()?;

        // Everything that can fail is checked before the first write.
        if !state.users.contains_key(&user_id) {
            return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
        }
        let token_hash = hash_token(token);
        if state.tokens.iter().any(|t| t.token_hash == token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation("tokens_token_hash_key".to_string()).into());
        }

        state.revoke_valid(user_id);
        state.insert_token(user_id, token)
    }
}
