//! # Primary Records
//!
//! Addresses belong to a user and household members belong to an address.
//! Within each owning scope exactly one live record is primary once any live
//! record exists. The helpers here maintain that rule over any collection of
//! [`PrimaryScoped`] records.
//!
//! The helpers mutate in place and report which records changed. Callers
//! hold one write lock for the whole collection while calling them, and
//! mirror the returned changes to storage inside one transaction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PrimaryError;

/// A record that may be the primary one within its owning scope.
pub trait PrimaryScoped {
    /// Record identifier.
    fn id(&self) -> Uuid;
    /// Identifier of the owning scope.
    fn scope_id(&self) -> Uuid;
    /// Whether this record is currently primary.
    fn is_primary(&self) -> bool;
    /// Set or clear the primary flag.
    fn set_primary_flag(&mut self, primary: bool);
    /// Creation time; the oldest sibling is promoted first.
    fn created_at(&self) -> DateTime<Utc>;
    /// `false` once soft-deleted.
    fn is_live(&self) -> bool;
}

/// Whether a new record joining `scope` must become primary.
pub fn claims_primary<'a, T, I>(records: I, scope: Uuid) -> bool
where
    T: PrimaryScoped + 'a,
    I: IntoIterator<Item = &'a T>,
{
    !records
        .into_iter()
        .any(|r| r.is_live() && r.scope_id() == scope && r.is_primary())
}

/// Make `id` the only primary record in its scope.
///
/// Returns the ids whose flag changed. Fails with [`PrimaryError::NotFound`]
/// when `id` is missing or soft-deleted.
pub fn set_primary<'a, T, I>(records: I, id: Uuid) -> Result<Vec<Uuid>, PrimaryError>
where
    T: PrimaryScoped + 'a,
    I: IntoIterator<Item = &'a mut T>,
{
    let mut live: Vec<&mut T> = records.into_iter().filter(|r| r.is_live()).collect();
    let scope = live
        .iter()
        .find(|r| r.id() == id)
        .map(|r| r.scope_id())
        .ok_or(PrimaryError::NotFound(id))?;

    let mut changed = Vec::new();
    for record in live.iter_mut().filter(|r| r.scope_id() == scope) {
        let want = record.id() == id;
        if record.is_primary() != want {
            record.set_primary_flag(want);
            changed.push(record.id());
        }
    }
    Ok(changed)
}

/// If `scope` has live records but none is primary, promote the oldest.
///
/// Returns the promoted id, if any.
pub fn promote_successor<'a, T, I>(records: I, scope: Uuid) -> Option<Uuid>
where
    T: PrimaryScoped + 'a,
    I: IntoIterator<Item = &'a mut T>,
{
    let mut siblings: Vec<&mut T> = records
        .into_iter()
        .filter(|r| r.is_live() && r.scope_id() == scope)
        .collect();
    if siblings.iter().any(|r| r.is_primary()) {
        return None;
    }
    let successor = siblings
        .iter_mut()
        .min_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(&b.id())))?;
    successor.set_primary_flag(true);
    Some(successor.id())
}

/// Reject removing a primary record that still has live dependents.
pub fn ensure_removable<T: PrimaryScoped>(record: &T, dependents: usize) -> Result<(), PrimaryError> {
    if record.is_primary() && dependents > 0 {
        return Err(PrimaryError::HasDependents {
            id: record.id(),
            dependents,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Debug, Clone)]
    struct Rec {
        id: Uuid,
        scope: Uuid,
        primary: bool,
        created_at: DateTime<Utc>,
        live: bool,
    }

    impl PrimaryScoped for Rec {
        fn id(&self) -> Uuid {
            self.id
        }
        fn scope_id(&self) -> Uuid {
            self.scope
        }
        fn is_primary(&self) -> bool {
            self.primary
        }
        fn set_primary_flag(&mut self, primary: bool) {
            self.primary = primary;
        }
        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }
        fn is_live(&self) -> bool {
            self.live
        }
    }

    fn rec(scope: Uuid, primary: bool, age_minutes: i64) -> Rec {
        Rec {
            id: Uuid::new_v4(),
            scope,
            primary,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            live: true,
        }
    }

    fn primaries(records: &[Rec], scope: Uuid) -> Vec<Uuid> {
        records
            .iter()
            .filter(|r| r.live && r.scope == scope && r.primary)
            .map(|r| r.id)
            .collect()
    }

    #[test]
    fn set_primary_leaves_exactly_one() {
        let user = Uuid::new_v4();
        let mut records = vec![rec(user, true, 10), rec(user, false, 5)];
        let a2 = records[1].id;
        let changed = set_primary(records.iter_mut(), a2).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(primaries(&records, user), vec![a2]);
    }

    #[test]
    fn set_primary_does_not_touch_other_scopes() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let mut records = vec![rec(alice, true, 10), rec(alice, false, 5), rec(bob, true, 1)];
        let target = records[1].id;
        set_primary(records.iter_mut(), target).unwrap();
        assert_eq!(primaries(&records, bob), vec![records[2].id]);
    }

    #[test]
    fn set_primary_on_current_primary_is_noop() {
        let user = Uuid::new_v4();
        let mut records = vec![rec(user, true, 10), rec(user, false, 5)];
        let a1 = records[0].id;
        assert!(set_primary(records.iter_mut(), a1).unwrap().is_empty());
    }

    #[test]
    fn set_primary_missing_or_deleted() {
        let user = Uuid::new_v4();
        let mut records = vec![rec(user, true, 10), rec(user, false, 5)];
        records[1].live = false;
        let deleted = records[1].id;
        assert_eq!(
            set_primary(records.iter_mut(), deleted),
            Err(PrimaryError::NotFound(deleted))
        );
        let ghost = Uuid::new_v4();
        assert!(set_primary(records.iter_mut(), ghost).is_err());
    }

    #[test]
    fn first_record_claims_primary() {
        let user = Uuid::new_v4();
        let records: Vec<Rec> = Vec::new();
        assert!(claims_primary(records.iter(), user));
        let records = vec![rec(user, true, 1)];
        assert!(!claims_primary(records.iter(), user));
        assert!(claims_primary(records.iter(), Uuid::new_v4()));
    }

    #[test]
    fn promotes_oldest_live_sibling() {
        let user = Uuid::new_v4();
        let mut records = vec![rec(user, true, 30), rec(user, false, 5), rec(user, false, 20)];
        records[0].live = false;
        records[0].primary = false;
        let oldest = records[2].id;
        assert_eq!(promote_successor(records.iter_mut(), user), Some(oldest));
        assert_eq!(primaries(&records, user), vec![oldest]);
    }

    #[test]
    fn no_promotion_when_primary_exists_or_scope_empty() {
        let user = Uuid::new_v4();
        let mut records = vec![rec(user, true, 30), rec(user, false, 5)];
        assert_eq!(promote_successor(records.iter_mut(), user), None);
        let mut empty: Vec<Rec> = Vec::new();
        assert_eq!(promote_successor(empty.iter_mut(), user), None);
    }

    #[test]
    fn primary_with_dependents_not_removable() {
        let user = Uuid::new_v4();
        let primary = rec(user, true, 1);
        let other = rec(user, false, 1);
        assert!(matches!(
            ensure_removable(&primary, 1),
            Err(PrimaryError::HasDependents { dependents: 1, .. })
        ));
        assert!(ensure_removable(&primary, 0).is_ok());
        assert!(ensure_removable(&other, 3).is_ok());
    }
}
