//! Core business logic - framework-agnostic ledger operations.
//!
//! Every public operation takes a [`TenantContext`] and checks the target
//! row's owning organization exactly once at its boundary; nothing in here
//! relies on implicit query filtering for tenant isolation.

/// Commission tier tables and the commission calculation engine
pub mod commission;
/// Integrity alert recording and the package audit
pub mod integrity;
/// Package lifecycle, capacity snapshots, and the payment ledger
pub mod package;
/// Session lifecycle state machine and token operations
pub mod session;
/// Pure payment-to-capacity unlock calculator
pub mod unlock;

use crate::errors::{Error, Result};

/// Tenant scope for a core operation, supplied by the auth collaborator.
///
/// The core trusts the context (it performs no authentication itself) and
/// uses it for exactly one thing: rejecting operations whose target rows
/// belong to a different organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    /// Organization the caller is acting for
    pub organization_id: i64,
}

impl TenantContext {
    /// Creates a context for the given organization.
    #[must_use]
    pub const fn new(organization_id: i64) -> Self {
        Self { organization_id }
    }
}

/// Rejects the operation when the record belongs to a different organization.
pub(crate) fn ensure_tenant(ctx: &TenantContext, record_organization_id: i64) -> Result<()> {
    if ctx.organization_id == record_organization_id {
        Ok(())
    } else {
        Err(Error::CrossTenantMismatch {
            expected: ctx.organization_id,
            found: record_organization_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_tenant_match() {
        let ctx = TenantContext::new(7);
        assert!(ensure_tenant(&ctx, 7).is_ok());
    }

    #[test]
    fn test_ensure_tenant_mismatch() {
        let ctx = TenantContext::new(7);
        let result = ensure_tenant(&ctx, 8);
        assert!(matches!(
            result.unwrap_err(),
            Error::CrossTenantMismatch {
                expected: 7,
                found: 8
            }
        ));
    }
}
