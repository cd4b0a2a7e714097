//! Row-level security hook
//!
//! Query results pass through a `SecurityFilter` before ordering and
//! paging, so counts and pages only ever reflect visible rows.

use crate::value::{EntityReference, Record};

/// Access right checked against a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessRight {
    Read,
    Write,
    Create,
    Delete,
    Append,
    AppendTo,
    Assign,
    Share,
}

/// Decides whether a caller holds a right on a row
pub trait SecurityFilter: Send + Sync {
    fn has_permission(&self, record: &Record, right: AccessRight, caller: &EntityReference) -> bool;
}

/// Grants every right on every row
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl SecurityFilter for AllowAll {
    fn has_permission(&self, _record: &Record, _right: AccessRight, _caller: &EntityReference) -> bool {
        true
    }
}

impl<F> SecurityFilter for F
where
    F: Fn(&Record, AccessRight, &EntityReference) -> bool + Send + Sync,
{
    fn has_permission(&self, record: &Record, right: AccessRight, caller: &EntityReference) -> bool {
        self(record, right, caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_closure_filter() {
        let caller = EntityReference::new("systemuser", Uuid::new_v4());
        let only_mine = |record: &Record, _: AccessRight, caller: &EntityReference| {
            record.get("ownerid").and_then(|v| v.as_guid()) == Some(caller.id)
        };

        let mine = Record::new("account").with("ownerid", caller.id);
        let theirs = Record::new("account").with("ownerid", Uuid::new_v4());

        assert!(only_mine.has_permission(&mine, AccessRight::Read, &caller));
        assert!(!only_mine.has_permission(&theirs, AccessRight::Read, &caller));
        assert!(AllowAll.has_permission(&theirs, AccessRight::Delete, &caller));
    }
}
