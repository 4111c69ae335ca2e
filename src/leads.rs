use crate::dialog::Role;
use crate::error::AppError;
use crate::session::CallSession;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};
use std::fmt;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeadId(pub i64);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A captured lead. Built once from a completed session and never changed.
#[derive(Clone, Debug, PartialEq)]
pub enum LeadRecord {
    Seller {
        call_id: String,
        phone_number: String,
        location: String,
        asking_price: Decimal,
        created_at: OffsetDateTime,
    },
    Buyer {
        call_id: String,
        phone_number: String,
        location: String,
        budget: Decimal,
        created_at: OffsetDateTime,
    },
}

impl LeadRecord {
    pub fn from_session(session: &CallSession, now: OffsetDateTime) -> Result<Self, AppError> {
        let incomplete = |what: &str| AppError::PersistenceFailure(format!("session missing {what}"));
        if session.caller_id.is_empty() {
            return Err(incomplete("caller id"));
        }
        let role = session.role.ok_or_else(|| incomplete("role"))?;
        let location = session.location.clone().ok_or_else(|| incomplete("location"))?;
        let amount = session.amount.ok_or_else(|| incomplete("amount"))?;
        if amount.is_sign_negative() {
            return Err(incomplete("non-negative amount"));
        }

        let call_id = session.call_id.clone();
        let phone_number = session.caller_id.clone();
        Ok(match role {
            Role::Seller => LeadRecord::Seller {
                call_id,
                phone_number,
                location,
                asking_price: amount,
                created_at: now,
            },
            Role::Buyer => LeadRecord::Buyer {
                call_id,
                phone_number,
                location,
                budget: amount,
                created_at: now,
            },
        })
    }

    pub fn phone_number(&self) -> &str {
        match self {
            LeadRecord::Seller { phone_number, .. } | LeadRecord::Buyer { phone_number, .. } => {
                phone_number
            }
        }
    }

    pub fn location(&self) -> &str {
        match self {
            LeadRecord::Seller { location, .. } | LeadRecord::Buyer { location, .. } => location,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            LeadRecord::Seller { asking_price, .. } => *asking_price,
            LeadRecord::Buyer { budget, .. } => *budget,
        }
    }
}

/// Where finished leads go.
#[async_trait]
pub trait LeadGateway: Send + Sync {
    async fn save(&self, lead: &LeadRecord) -> Result<LeadId, AppError>;
}

pub struct PgLeadStore {
    pool: Pool<Postgres>,
}

impl PgLeadStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LeadGateway for PgLeadStore {
    async fn save(&self, lead: &LeadRecord) -> Result<LeadId, AppError> {
        let (id,): (i64,) = match lead {
            LeadRecord::Seller {
                call_id,
                phone_number,
                location,
                asking_price,
                created_at,
            } => {
                sqlx::query_as::<_, (i64,)>(
                    "
                    insert into sellers (
                      call_sid,
                      phone_number,
                      location,
                      asking_price,
                      created_at
                    ) values (
                      $1,
                      $2,
                      $3,
                      $4,
                      $5
                    )
                    returning id
                    ",
                )
                .bind(call_id)
                .bind(phone_number)
                .bind(location)
                .bind(asking_price)
                .bind(created_at)
                .fetch_one(&self.pool)
                .await
            }
            LeadRecord::Buyer {
                call_id,
                phone_number,
                location,
                budget,
                created_at,
            } => {
                sqlx::query_as::<_, (i64,)>(
                    "
                    insert into buyers (
                      call_sid,
                      phone_number,
                      preferred_location,
                      budget,
                      created_at
                    ) values (
                      $1,
                      $2,
                      $3,
                      $4,
                      $5
                    )
                    returning id
                    ",
                )
                .bind(call_id)
                .bind(phone_number)
                .bind(location)
                .bind(budget)
                .bind(created_at)
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::PersistenceFailure(e.to_string()))?;

        Ok(LeadId(id))
    }
}

/// Keeps leads in process memory. For local runs without a database, and tests.
#[derive(Default)]
pub struct MemoryLeadStore {
    leads: Mutex<Vec<LeadRecord>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leads(&self) -> Vec<LeadRecord> {
        self.leads.lock().clone()
    }
}

#[async_trait]
impl LeadGateway for MemoryLeadStore {
    async fn save(&self, lead: &LeadRecord) -> Result<LeadId, AppError> {
        let mut leads = self.leads.lock();
        leads.push(lead.clone());
        let id = LeadId(leads.len() as i64);
        debug!(lead_id=%id, "stored lead in memory");
        Ok(id)
    }
}
