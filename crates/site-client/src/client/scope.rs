//! Admin-call detection.

/// `true` if `target` addresses an admin-scoped endpoint.
///
/// Only the path portion is inspected; query strings and fragments are
/// ignored so `/api/news/?next=/api/admin/` stays public.
#[must_use]
pub fn is_admin_call(target: &str, admin_prefix: &str) -> bool {
    if admin_prefix.is_empty() {
        return false;
    }
    let path = target
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    path.contains(admin_prefix)
}
