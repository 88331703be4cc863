//! Manual item order from predecessor pointers.
//!
//! Each item names the item it follows. The resolver walks that chain from the
//! item marked first, then re-attaches everything it could not reach (unknown
//! position, dangling or contested predecessor, cycles) at the tail. Items are
//! looked up by id; nothing holds references between items.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{ListItem, PrevItem};

/// A predecessor rewrite needed to make the stored chain match the resolved order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repair {
    pub item_id: Uuid,
    pub prev_item: PrevItem,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Item ids in display order.
    pub order: Vec<Uuid>,
    /// Items whose `prev_item` must change.
    pub repairs: Vec<Repair>,
}

impl Resolution {
    pub fn index_of(&self, id: Uuid) -> Option<usize> {
        self.order.iter().position(|o| *o == id)
    }

    pub fn indices(&self) -> HashMap<Uuid, usize> {
        self.order
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect()
    }

    pub fn last(&self) -> Option<Uuid> {
        self.order.last().copied()
    }
}

/// Resolve the order of the (non-removed) items of one list.
pub fn resolve(items: &[ListItem]) -> Resolution {
    // Earliest modification wins contested slots; id breaks ties.
    let mut sorted: Vec<&ListItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.modified.cmp(&b.modified).then(a.id.cmp(&b.id)));

    // predecessor (None = head) -> the item that holds the slot after it
    let mut successor: HashMap<Option<Uuid>, Uuid> = HashMap::new();
    for item in &sorted {
        let slot = match item.prev_item {
            PrevItem::First => None,
            PrevItem::After(prev) if prev != item.id => Some(prev),
            _ => continue,
        };
        successor.entry(slot).or_insert(item.id);
    }

    let mut resolution = Resolution::default();
    let mut placed: HashSet<Uuid> = HashSet::new();

    let mut cursor = successor.get(&None).copied();
    while let Some(id) = cursor {
        if !placed.insert(id) {
            break;
        }
        resolution.order.push(id);
        cursor = successor.get(&Some(id)).copied();
    }

    let unplaced: Vec<&ListItem> = sorted
        .into_iter()
        .filter(|item| !placed.contains(&item.id))
        .collect();
    let unplaced_ids: HashSet<Uuid> = unplaced.iter().map(|item| item.id).collect();

    // An unplaced item that holds the slot after another unplaced item rides
    // along with that item's chain.
    let follows_unplaced = |item: &ListItem| match item.prev_item {
        PrevItem::After(prev) => {
            unplaced_ids.contains(&prev) && successor.get(&Some(prev)) == Some(&item.id)
        }
        _ => false,
    };

    // Chain roots first, then whatever is left (cycles).
    for roots_only in [true, false] {
        for item in &unplaced {
            if placed.contains(&item.id) || (roots_only && follows_unplaced(item)) {
                continue;
            }
            attach_chain(item, &successor, &mut placed, &mut resolution);
        }
    }

    resolution
}

fn attach_chain(
    root: &ListItem,
    successor: &HashMap<Option<Uuid>, Uuid>,
    placed: &mut HashSet<Uuid>,
    resolution: &mut Resolution,
) {
    let prev_item = PrevItem::after(resolution.last());
    if root.prev_item != prev_item {
        resolution.repairs.push(Repair {
            item_id: root.id,
            prev_item,
        });
    }
    placed.insert(root.id);
    resolution.order.push(root.id);

    let mut cursor = successor.get(&Some(root.id)).copied();
    while let Some(id) = cursor {
        if !placed.insert(id) {
            break;
        }
        resolution.order.push(id);
        cursor = successor.get(&Some(id)).copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn item(name: &str, prev: PrevItem, age_secs: i64) -> ListItem {
        let mut item = ListItem::new(Uuid::nil(), name).with_prev(prev);
        item.modified = Utc::now() - Duration::seconds(age_secs);
        item
    }

    fn names(items: &[ListItem], resolution: &Resolution) -> Vec<String> {
        resolution
            .order
            .iter()
            .map(|id| items.iter().find(|i| i.id == *id).unwrap().name.clone())
            .collect()
    }

    fn assert_permutation(items: &[ListItem], resolution: &Resolution) {
        let mut sorted = resolution.order.clone();
        sorted.sort();
        let mut expected: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_empty_list() {
        let resolution = resolve(&[]);
        assert!(resolution.order.is_empty());
        assert!(resolution.repairs.is_empty());
    }

    #[test]
    fn test_single_item_must_be_first() {
        let lone = item("a", PrevItem::After(Uuid::new_v4()), 0);
        let resolution = resolve(std::slice::from_ref(&lone));
        assert_eq!(resolution.order, vec![lone.id]);
        assert_eq!(
            resolution.repairs,
            vec![Repair {
                item_id: lone.id,
                prev_item: PrevItem::First
            }]
        );
    }

    #[test]
    fn test_intact_chain() {
        let a = item("a", PrevItem::First, 30);
        let b = item("b", PrevItem::After(a.id), 20);
        let c = item("c", PrevItem::After(b.id), 10);
        // Stored order differs from chain order
        let items = vec![c.clone(), a.clone(), b.clone()];

        let resolution = resolve(&items);
        assert_eq!(resolution.order, vec![a.id, b.id, c.id]);
        assert!(resolution.repairs.is_empty());
        assert_eq!(resolution.index_of(c.id), Some(2));
    }

    #[test]
    fn test_dangling_predecessor_goes_to_tail() {
        let i1 = item("i1", PrevItem::First, 30);
        let i2 = item("i2", PrevItem::After(i1.id), 20);
        let i3 = item("i3", PrevItem::After(Uuid::new_v4()), 40);
        let items = vec![i1.clone(), i2.clone(), i3.clone()];

        let resolution = resolve(&items);
        assert_eq!(resolution.order, vec![i1.id, i2.id, i3.id]);
        assert_eq!(
            resolution.repairs,
            vec![Repair {
                item_id: i3.id,
                prev_item: PrevItem::After(i2.id)
            }]
        );
    }

    #[test]
    fn test_contested_slot_earliest_wins() {
        let a = item("a", PrevItem::First, 50);
        let early = item("early", PrevItem::After(a.id), 40);
        let late = item("late", PrevItem::After(a.id), 10);
        let items = vec![late.clone(), early.clone(), a.clone()];

        let resolution = resolve(&items);
        assert_eq!(names(&items, &resolution), vec!["a", "early", "late"]);
        assert_eq!(
            resolution.repairs,
            vec![Repair {
                item_id: late.id,
                prev_item: PrevItem::After(early.id)
            }]
        );
    }

    #[test]
    fn test_orphan_chain_keeps_internal_order() {
        let a = item("a", PrevItem::First, 50);
        let x = item("x", PrevItem::After(Uuid::new_v4()), 10);
        let y = item("y", PrevItem::After(x.id), 40);
        let items = vec![a.clone(), y.clone(), x.clone()];

        let resolution = resolve(&items);
        assert_eq!(names(&items, &resolution), vec!["a", "x", "y"]);
        // Only the chain root moves
        assert_eq!(resolution.repairs.len(), 1);
        assert_eq!(resolution.repairs[0].item_id, x.id);
    }

    #[test]
    fn test_cycle_and_unknown_positions() {
        let mut p = item("p", PrevItem::Unknown, 30);
        let q = item("q", PrevItem::After(p.id), 20);
        p.prev_item = PrevItem::After(q.id);
        let u = item("u", PrevItem::Unknown, 40);
        let items = vec![p.clone(), q.clone(), u.clone()];

        let resolution = resolve(&items);
        assert_permutation(&items, &resolution);
        assert_eq!(names(&items, &resolution), vec!["u", "p", "q"]);
        assert_eq!(resolution.repairs.len(), 2);
        assert_eq!(resolution.repairs[0].prev_item, PrevItem::First);
        assert_eq!(resolution.repairs[1].prev_item, PrevItem::After(u.id));
    }

    #[test]
    fn test_two_heads() {
        let first = item("first", PrevItem::First, 20);
        let second = item("second", PrevItem::First, 10);
        let items = vec![second.clone(), first.clone()];

        let resolution = resolve(&items);
        assert_eq!(resolution.order, vec![first.id, second.id]);
        assert_eq!(resolution.repairs[0].prev_item, PrevItem::After(first.id));
    }

    #[test]
    fn test_self_reference_is_orphaned() {
        let mut me = item("me", PrevItem::Unknown, 10);
        me.prev_item = PrevItem::After(me.id);
        let resolution = resolve(std::slice::from_ref(&me));
        assert_eq!(resolution.order, vec![me.id]);
        assert_eq!(resolution.repairs[0].prev_item, PrevItem::First);
    }

    #[test]
    fn test_indices_are_a_permutation() {
        let a = item("a", PrevItem::First, 60);
        let b = item("b", PrevItem::After(a.id), 50);
        let c = item("c", PrevItem::After(a.id), 40);
        let d = item("d", PrevItem::Unknown, 30);
        let e = item("e", PrevItem::After(Uuid::new_v4()), 20);
        let items = vec![e, d, c, b, a];

        let resolution = resolve(&items);
        assert_permutation(&items, &resolution);
        let mut indices: Vec<usize> = resolution.indices().into_values().collect();
        indices.sort();
        assert_eq!(indices, (0..items.len()).collect::<Vec<_>>());
    }
}
