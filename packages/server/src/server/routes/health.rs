/// Liveness endpoint.
pub async fn index_handler() -> &'static str {
    "Torque installed and reporting for duty."
}
