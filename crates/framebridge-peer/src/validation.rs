use serde_json::Value;

/// Shared schema registry attached to an endpoint.
#[cfg(feature = "schema")]
pub type SchemaRegistryHandle = std::sync::Arc<framebridge_schema::SchemaRegistry>;

/// Placeholder when schema validation is compiled out. Never constructed.
#[cfg(not(feature = "schema"))]
pub type SchemaRegistryHandle = std::convert::Infallible;

/// Check an inbound payload against the endpoint's registry, if any.
///
/// Rejections are logged here; callers only drop the message.
#[cfg(feature = "schema")]
pub(crate) fn payload_accepted(
    registry: Option<&SchemaRegistryHandle>,
    placement: &str,
    command: &str,
    payload: &Value,
) -> bool {
    let Some(registry) = registry else {
        return true;
    };
    match registry.validate(command, payload) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(placement, command, error = %err, "dropping message: payload rejected by schema");
            false
        }
    }
}

#[cfg(not(feature = "schema"))]
pub(crate) fn payload_accepted(
    _registry: Option<&SchemaRegistryHandle>,
    _placement: &str,
    _command: &str,
    _payload: &Value,
) -> bool {
    true
}
