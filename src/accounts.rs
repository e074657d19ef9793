use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::auth::SessionTokenIssuer;
use crate::database::unit_of_work::{TransactionDriver, TxContext, UnitOfWork};
use crate::error::{DomainError, ErrorKind};
use crate::types::Principal;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal::new(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
}

/// User persistence, joined to whatever transaction `ctx` carries
#[async_trait]
pub trait UserStore<Tx: Send + 'static>: Send + Sync {
    /// QueryDataNotFound when no user has this email
    async fn find_by_email(&self, ctx: &TxContext<Tx>, email: &str) -> Result<User, DomainError>;

    /// AlreadyExists when the email is taken
    async fn create(&self, ctx: &TxContext<Tx>, user: NewUser) -> Result<User, DomainError>;
}

/// A freshly issued session for an account
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
    pub expires_in: i64,
}

#[async_trait]
pub trait Accounts: Send + Sync {
    async fn signup(&self, email: &str, name: &str) -> Result<IssuedSession, DomainError>;
    async fn login(&self, email: &str) -> Result<IssuedSession, DomainError>;
}

pub struct AccountService<D: TransactionDriver, U> {
    uow: UnitOfWork<D>,
    users: U,
    sessions: SessionTokenIssuer,
    request_timeout: Option<Duration>,
}

impl<D, U> AccountService<D, U>
where
    D: TransactionDriver,
    U: UserStore<D::Tx>,
{
    pub fn new(driver: D, users: U, sessions: SessionTokenIssuer) -> Self {
        Self {
            uow: UnitOfWork::new(driver),
            users,
            sessions,
            request_timeout: None,
        }
    }

    /// Bound the persistence work of each call
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn context(&self) -> TxContext<D::Tx> {
        let ctx = TxContext::new();
        match self.request_timeout {
            Some(timeout) => ctx.with_deadline(Instant::now() + timeout),
            None => ctx,
        }
    }

    fn session_for(&self, user: &User) -> Result<IssuedSession, DomainError> {
        Ok(IssuedSession {
            user_id: user.id,
            email: user.email.clone(),
            token: self.sessions.issue(user.principal())?,
            expires_in: self.sessions.ttl().num_seconds(),
        })
    }
}

#[async_trait]
impl<D, U> Accounts for AccountService<D, U>
where
    D: TransactionDriver,
    U: UserStore<D::Tx>,
{
    async fn signup(&self, email: &str, name: &str) -> Result<IssuedSession, DomainError> {
        let email = normalize_email(email)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::with_message(ErrorKind::InvalidParameter, "name is required"));
        }

        let users = &self.users;
        let new_user = NewUser {
            email,
            name: name.to_string(),
        };

        let result = self
            .uow
            .run(&self.context(), |ctx| async move {
                match users.find_by_email(&ctx, &new_user.email).await {
                    Ok(_) => {
                        return Err(DomainError::with_message(
                            ErrorKind::AlreadyExists,
                            "email address is already registered",
                        ))
                    }
                    Err(e) if e.kind() == ErrorKind::QueryDataNotFound => {}
                    Err(e) => return Err(DomainError::wrap("AccountService.signup", e)),
                }
                users.create(&ctx, new_user).await
            })
            .await;

        // Surface a conflict from anywhere in the cause chain
        let user = result.map_err(|e| {
            if e.matches_kind(ErrorKind::AlreadyExists) {
                DomainError::with_message(ErrorKind::AlreadyExists, "email address is already registered")
            } else {
                e
            }
        })?;

        tracing::info!(user_id = %user.id, "Account created");
        self.session_for(&user)
    }

    async fn login(&self, email: &str) -> Result<IssuedSession, DomainError> {
        let email = normalize_email(email)?;
        let ctx = self.context();
        let lookup = self.users.find_by_email(&ctx, &email);
        let found = match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, lookup).await.unwrap_or_else(|_| {
                Err(DomainError::with_message(ErrorKind::RepositoryError, "user lookup timed out"))
            }),
            None => lookup.await,
        };
        let user = found.map_err(|e| DomainError::wrap("AccountService.login", e))?;

        self.session_for(&user)
    }
}

fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::with_message(
            ErrorKind::InvalidParameter,
            "a valid email address is required",
        )),
    }
}
