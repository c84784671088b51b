//! Reserved names shared by both endpoints.

/// Handshake command. Never valid as an application method or event name.
pub const READY_COMMAND: &str = "ready";

/// Address parameter carrying the expected parent origin.
pub const ORIGIN_PARAM: &str = "_origin";

/// Address parameter carrying the placement namespace.
pub const PLACEMENT_PARAM: &str = "_placement";

/// Returns true if `command` is reserved for the handshake.
pub fn is_reserved(command: &str) -> bool {
    command == READY_COMMAND
}
