use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::{
    errors::Error,
    store::{SlotStore, StoreError},
};

use super::{RetryPolicy, Slot, SlotIdAssignment};

/// Every slot after maintenance, in `docId` order, and how many got a new id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnsuredSlots {
    pub slots: Vec<Slot>,
    pub assigned: usize,
}

/// Gives every slot without a `slotId` the identifier `SLOT_<n>`, where `n` is
/// its 1-based position in `docId` order. Existing identifiers are never
/// touched.
pub async fn ensure_slot_ids(
    slots: &dyn SlotStore,
    retry: &RetryPolicy,
) -> Result<EnsuredSlots, Error> {
    for attempt in retry.attempts() {
        let mut current = slots.list_slots().await?;
        current.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        let plan = plan_slot_ids(&current);
        if plan.is_empty() {
            return Ok(EnsuredSlots {
                slots: current,
                assigned: 0,
            });
        }

        match slots.assign_slot_ids(&plan).await {
            Ok(()) => {
                info!("Assigned {} slot ids", plan.len());
                let assigned = plan.len();
                apply(&mut current, plan);
                return Ok(EnsuredSlots {
                    slots: current,
                    assigned,
                });
            }
            Err(StoreError::Conflict) => {
                warn!("Slot id assignment raced another writer (attempt {})", attempt);
                if attempt < retry.max_attempts {
                    tokio::time::sleep(retry.delay_after(attempt)).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(Error::Contention {
        attempts: retry.max_attempts.max(1),
    })
}

/// Assignments for the slots in `ordered` that lack an id. An ordinal already
/// in use moves on to the next free one.
pub fn plan_slot_ids(ordered: &[Slot]) -> Vec<SlotIdAssignment> {
    let mut taken: HashSet<String> = ordered.iter().filter_map(|s| s.slot_id.clone()).collect();
    let mut plan = Vec::new();

    for (idx, slot) in ordered.iter().enumerate() {
        if slot.slot_id.is_some() {
            continue;
        }

        let mut ordinal = idx + 1;
        while taken.contains(&slot_label_id(ordinal)) {
            ordinal += 1;
        }

        let slot_id = slot_label_id(ordinal);
        taken.insert(slot_id.clone());
        plan.push(SlotIdAssignment::new(slot.doc_id.clone(), slot_id));
    }

    plan
}

fn apply(slots: &mut [Slot], plan: Vec<SlotIdAssignment>) {
    let mut by_doc: HashMap<String, String> = plan
        .into_iter()
        .map(|assignment| (assignment.doc_id, assignment.slot_id))
        .collect();
    for slot in slots.iter_mut() {
        if let Some(slot_id) = by_doc.remove(&slot.doc_id) {
            slot.slot_id = Some(slot_id);
        }
    }
}

fn slot_label_id(ordinal: usize) -> String {
    format!("SLOT_{ordinal}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn slot(doc_id: &str, slot_id: Option<&str>) -> Slot {
        Slot {
            doc_id: doc_id.to_string(),
            slot_id: slot_id.map(str::to_string),
            specialty: "Cardio".to_string(),
            date: "2025-10-06".to_string(),
            time_range: "09:00-10:00".to_string(),
            capacity: 2,
            booked: 0,
        }
    }

    fn ids(store: &MemoryStore) -> Vec<(String, Option<String>)> {
        store
            .all_slots()
            .into_iter()
            .map(|s| (s.doc_id, s.slot_id))
            .collect()
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn assigns_ordinals_then_is_idempotent() {
        let store = MemoryStore::with_slots(vec![slot("b", None), slot("a", None)]);

        let first = ensure_slot_ids(&store, &retry()).await.unwrap();
        let after_first = ids(&store);
        let second = ensure_slot_ids(&store, &retry()).await.unwrap();

        assert_eq!(first.assigned, 2);
        assert_eq!(second.assigned, 0);
        assert_eq!(first.slots, store.all_slots());
        assert_eq!(second.slots, first.slots);
        assert_eq!(
            after_first,
            vec![
                ("a".to_string(), Some("SLOT_1".to_string())),
                ("b".to_string(), Some("SLOT_2".to_string())),
            ]
        );
        assert_eq!(ids(&store), after_first);
    }

    #[tokio::test]
    async fn existing_ids_are_kept() {
        let store = MemoryStore::with_slots(vec![slot("a", Some("CUSTOM")), slot("b", None)]);

        ensure_slot_ids(&store, &retry()).await.unwrap();

        assert_eq!(store.slot("a").unwrap().slot_id.as_deref(), Some("CUSTOM"));
        assert_eq!(store.slot("b").unwrap().slot_id.as_deref(), Some("SLOT_2"));
    }

    #[tokio::test]
    async fn conflicting_batch_is_retried() {
        let store = MemoryStore::with_slots(vec![slot("a", None)]);
        store.inject_conflicts(1);

        assert_eq!(ensure_slot_ids(&store, &retry()).await.unwrap().assigned, 1);
        assert_eq!(store.slot("a").unwrap().slot_id.as_deref(), Some("SLOT_1"));
    }

    #[test]
    fn ordinal_collisions_move_to_the_next_free_id() {
        let ordered = vec![slot("a", None), slot("b", Some("SLOT_1")), slot("c", None)];

        let plan = plan_slot_ids(&ordered);

        assert_eq!(
            plan,
            vec![
                SlotIdAssignment::new("a".to_string(), "SLOT_2".to_string()),
                SlotIdAssignment::new("c".to_string(), "SLOT_3".to_string()),
            ]
        );
    }
}
