//! Per-user settings model and payloads.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSettings {
    pub id: String,
    pub user_id: String,
    pub show_amount: bool,
    pub show_stats_before_laps: bool,
    pub breaks_impact_amount: bool,
    pub breaks_impact_time: bool,
    pub minimalist_mode: bool,
    pub notification_enabled: bool,
    pub notification_interval_hours: f64,
    pub hourly_amount: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub show_amount: Option<bool>,
    #[serde(default)]
    pub show_stats_before_laps: Option<bool>,
    #[serde(default)]
    pub breaks_impact_amount: Option<bool>,
    #[serde(default)]
    pub breaks_impact_time: Option<bool>,
    #[serde(default)]
    pub minimalist_mode: Option<bool>,
    #[serde(default)]
    pub notification_enabled: Option<bool>,
    #[serde(default)]
    pub notification_interval_hours: Option<f64>,
    #[serde(default)]
    pub hourly_amount: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub show_amount: bool,
    pub show_stats_before_laps: bool,
    pub breaks_impact_amount: bool,
    pub breaks_impact_time: bool,
    pub minimalist_mode: bool,
    pub notification_enabled: bool,
    pub notification_interval_hours: f64,
    pub hourly_amount: f64,
}

impl From<UserSettings> for SettingsResponse {
    fn from(s: UserSettings) -> Self {
        Self {
            show_amount: s.show_amount,
            show_stats_before_laps: s.show_stats_before_laps,
            breaks_impact_amount: s.breaks_impact_amount,
            breaks_impact_time: s.breaks_impact_time,
            minimalist_mode: s.minimalist_mode,
            notification_enabled: s.notification_enabled,
            notification_interval_hours: s.notification_interval_hours,
            hourly_amount: s.hourly_amount,
        }
    }
}
