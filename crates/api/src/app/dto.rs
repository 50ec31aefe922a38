//! Request bodies, query strings and path parsing.

use std::str::FromStr;

use serde::Deserialize;

use ledgergate_core::DomainError;
use ledgergate_inventory::{Confidence, HilDecision, LocationCode, MovementDraft, PartCode, ReservationStatus, TaskStatus};
use ledgergate_infra::{EngineError, ReserveRequest};

use crate::app::errors::ApiError;

/// Reservations last a day unless the caller says otherwise.
pub const DEFAULT_RESERVATION_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct SubmitMovementRequest {
    #[serde(flatten)]
    pub movement: MovementDraft,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub assignee: Option<String>,
}

impl SubmitMovementRequest {
    pub fn confidence(&self) -> Result<Option<Confidence>, ApiError> {
        self.confidence.map(Confidence::new).transpose().map_err(domain)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementsQuery {
    pub part_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReserveBody {
    pub part_number: String,
    pub location: String,
    pub quantity: i64,
    pub project: String,
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

impl ReserveBody {
    pub fn into_request(self) -> Result<ReserveRequest, ApiError> {
        Ok(ReserveRequest {
            part_number: parse_part(&self.part_number)?,
            location: parse_location(&self.location)?,
            quantity: self.quantity,
            project: self.project,
            ttl_secs: self.ttl_secs.unwrap_or(DEFAULT_RESERVATION_TTL_SECS),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReservationsQuery {
    pub status: Option<ReservationStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub decision: HilDecision,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteBody {
    #[serde(default)]
    pub assignee: Option<String>,
}

pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(domain)
}

pub fn parse_part(raw: &str) -> Result<PartCode, ApiError> {
    PartCode::parse(raw).map_err(domain)
}

pub fn parse_location(raw: &str) -> Result<LocationCode, ApiError> {
    LocationCode::parse(raw).map_err(domain)
}

fn domain(err: DomainError) -> ApiError {
    ApiError::Engine(EngineError::from(err))
}
