/// Router Module Index
///
/// Routes are split by who may call them. Access control is applied per module
/// with `route_layer` in `create_router`, so a handler cannot end up on a less
/// protected router by accident.

/// Anonymous routes: health, registration, login and the public listing.
pub mod public;

/// Routes behind the bearer-token guard.
pub mod authenticated;

/// Routes behind the bearer-token guard plus the admin role check.
pub mod admin;
