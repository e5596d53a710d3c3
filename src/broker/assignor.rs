//! Cooperative-sticky partition assignment.
//!
//! Each pass keeps as much current ownership as the balance quota allows.
//! Partitions that have to move are revoked first and only become assignable
//! once their owner has released them, so a partition is never owned by two
//! members at the same time.

use std::collections::BTreeSet;

/// Incremental changes for one member.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct MemberPlan {
    pub revoke: Vec<i32>,
    pub assign: Vec<i32>,
}

impl MemberPlan {
    pub fn is_empty(&self) -> bool {
        self.revoke.is_empty() && self.assign.is_empty()
    }
}

/// Compute one rebalance step.
///
/// `owned[i]` is what member `i` holds and is not already giving back;
/// `releasing` holds partitions whose revocation is still in flight.
/// The returned plans are index-aligned with `owned`.
pub(crate) fn plan(
    owned: &[BTreeSet<i32>],
    releasing: &BTreeSet<i32>,
    partitions: i32,
) -> Vec<MemberPlan> {
    let members = owned.len();
    let mut plans = vec![MemberPlan::default(); members];
    if members == 0 || partitions <= 0 {
        return plans;
    }

    let total = partitions as usize;
    let base = total / members;
    let extra = total % members;

    // Extra slots go to the members already holding the most, so fewer
    // partitions move.
    let mut order: Vec<usize> = (0..members).collect();
    order.sort_by(|&a, &b| owned[b].len().cmp(&owned[a].len()).then(a.cmp(&b)));
    let mut caps = vec![base; members];
    for &i in order.iter().take(extra) {
        caps[i] += 1;
    }

    let mut taken: BTreeSet<i32> = releasing.clone();
    let mut kept = vec![0usize; members];
    for (i, held) in owned.iter().enumerate() {
        for &p in held {
            if p >= partitions {
                continue;
            }
            if kept[i] < caps[i] {
                kept[i] += 1;
            } else {
                plans[i].revoke.push(p);
            }
            taken.insert(p);
        }
    }

    let mut free = (0..partitions).filter(|p| !taken.contains(p));
    for &i in &order {
        while kept[i] < caps[i] {
            match free.next() {
                Some(p) => {
                    plans[i].assign.push(p);
                    kept[i] += 1;
                }
                None => break,
            }
        }
    }

    plans
}
