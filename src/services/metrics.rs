use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

use crate::services::permissions::Policy;

lazy_static! {
    pub static ref PERMISSION_CHECKS_COUNTER: CounterVec = register_counter_vec!(
        "api_permission_checks_total",
        "Permission checks by policy and outcome",
        &["policy", "outcome"]
    )
    .expect("permission counter registers once");

    pub static ref NOTIFICATIONS_COUNTER: CounterVec = register_counter_vec!(
        "api_notifications_total",
        "Notification jobs by status",
        &["status"]
    )
    .expect("notification counter registers once");

    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by status",
        &["status"]
    )
    .expect("login counter registers once");
}

pub fn record_permission_check(policy: Policy, outcome: &str) {
    PERMISSION_CHECKS_COUNTER
        .with_label_values(&[policy.label(), outcome])
        .inc();
}

pub fn record_notification(status: &str) {
    NOTIFICATIONS_COUNTER.with_label_values(&[status]).inc();
}

pub fn record_login(status: &str) {
    LOGINS_COUNTER.with_label_values(&[status]).inc();
}
