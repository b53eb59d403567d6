//! OpenAPI stand-ins for foreign types used in `#[schema(value_type = ...)]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// RFC 3339 timestamp, e.g. `applied_at`, `created_at`
#[derive(Serialize, Deserialize, ToSchema)]
#[schema(value_type = String, format = "date-time", example = "2024-03-01T09:30:00Z")]
pub struct DateTimeWrapper(pub DateTime<Utc>);

/// Identifier of a job, application, notification or user
#[derive(Serialize, Deserialize, ToSchema)]
#[schema(value_type = String, format = "uuid", example = "3f1c2a9e-6b7d-4e0a-9c55-2d8f1b7e4a10")]
pub struct UuidWrapper(pub Uuid);
