pub(crate) mod health_check_controller;
pub(crate) mod notification_controller;
pub(crate) mod stats_controller;
pub(crate) mod stream_controller;
