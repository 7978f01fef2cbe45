use serde::Deserialize;
use serde_json::Value;
use sse::EventOptions;
use utoipa::ToSchema;

/// Body of `POST /api/sse/notifications`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationParams {
    pub event_type: String,
    #[schema(value_type = Object)]
    pub data: Value,
    pub target: Option<TargetParams>,
    pub options: Option<OptionsParams>,
}

/// Routing target; absent means broadcast.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetParams {
    pub user_id: Option<String>,
}

/// Optional wire-level fields passed through to the frame.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OptionsParams {
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl From<OptionsParams> for EventOptions {
    fn from(params: OptionsParams) -> Self {
        EventOptions {
            id: params.id,
            retry: params.retry,
        }
    }
}
