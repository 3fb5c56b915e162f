use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyLevel {
    Unknown,
    Empty,
    Low,
    Medium,
    High,
    Full,
}

impl OccupancyLevel {
    pub fn classify(occupancy: u32, capacity: Option<u32>) -> Self {
        let Some(capacity) = capacity.filter(|c| *c > 0) else {
            return OccupancyLevel::Unknown;
        };
        if occupancy == 0 {
            return OccupancyLevel::Empty;
        }

        let ratio = f64::from(occupancy) / f64::from(capacity);
        if ratio < 0.5 {
            OccupancyLevel::Low
        } else if ratio < 0.85 {
            OccupancyLevel::Medium
        } else if ratio < 1.0 {
            OccupancyLevel::High
        } else {
            OccupancyLevel::Full
        }
    }
}
