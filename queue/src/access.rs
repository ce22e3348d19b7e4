//! Tenant isolation.
//!
//! Every entity carries its tenant. A command may only touch entities of
//! the tenant it acts for; any mismatch is rejected before state is read
//! further, and logged on the `chairline::security` target.

use crate::error::{QueueError, Result};
use crate::types::{ActorContext, TenantId};
use std::fmt::Display;

/// Reject unless `owner` is the actor's tenant.
///
/// # Errors
///
/// Returns [`QueueError::CrossTenantAccess`] on mismatch.
pub fn ensure_tenant(
    actor: &ActorContext,
    owner: TenantId,
    entity: &'static str,
    id: impl Display,
) -> Result<()> {
    if actor.tenant_id == owner {
        return Ok(());
    }

    tracing::warn!(
        target: "chairline::security",
        actor_role = %actor.role,
        actor_tenant = %actor.tenant_id,
        owner_tenant = %owner,
        entity,
        entity_id = %id,
        "Cross-tenant access rejected"
    );
    Err(QueueError::cross_tenant(entity, id))
}
