use crate::model::Student;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollUpdate {
    pub student_id: String,
    pub new_roll_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub roll_number: i64,
    pub roster_updates: Vec<RollUpdate>,
}

/// Alphabetical order used for roll numbers: case-insensitive, and on a
/// case-only difference lowercase sorts first.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

// Stable sort by first name over the roster in its current roll order, so
// students with identical first names keep their existing relative order.
fn alphabetical(roster: &[Student]) -> Vec<&Student> {
    let mut sorted: Vec<&Student> = roster.iter().collect();
    sorted.sort_by_key(|s| s.roll_number);
    sorted.sort_by(|a, b| compare_names(&a.first_name, &b.first_name));
    sorted
}

/// Roll number for a student joining `roster` (one class-division), plus
/// the +1 shift for everyone sorting after them.
pub fn assign_on_create(roster: &[Student], first_name: &str) -> Assignment {
    let sorted = alphabetical(roster);
    let at = sorted
        .iter()
        .position(|s| compare_names(first_name, &s.first_name) == Ordering::Less)
        .unwrap_or(sorted.len());

    let roster_updates = sorted[at..]
        .iter()
        .map(|s| RollUpdate {
            student_id: s.id.clone(),
            new_roll_number: s.roll_number + 1,
        })
        .collect();

    Assignment {
        roll_number: at as i64 + 1,
        roster_updates,
    }
}

/// Renumbers the whole roster 1..n alphabetically. Re-running it on its
/// own output yields the same numbers, so a half-applied run can simply be
/// repeated.
pub fn reorder(roster: &[Student]) -> Vec<RollUpdate> {
    alphabetical(roster)
        .into_iter()
        .enumerate()
        .map(|(i, s)| RollUpdate {
            student_id: s.id.clone(),
            new_roll_number: i as i64 + 1,
        })
        .collect()
}

#[cfg(test)]
fn apply(roster: &mut [Student], updates: &[RollUpdate]) {
    for u in updates {
        if let Some(s) = roster.iter_mut().find(|s| s.id == u.student_id) {
            s.roll_number = u.new_roll_number;
        }
    }
}

/// Updates that would actually change a stored roll number.
pub fn changed<'a>(roster: &[Student], updates: &'a [RollUpdate]) -> Vec<&'a RollUpdate> {
    updates
        .iter()
        .filter(|u| {
            roster
                .iter()
                .find(|s| s.id == u.student_id)
                .map(|s| s.roll_number != u.new_roll_number)
                .unwrap_or(true)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, first_name: &str, roll_number: i64) -> Student {
        Student {
            id: id.into(),
            first_name: first_name.into(),
            middle_name: None,
            last_name: None,
            class: "X".into(),
            division: "A".into(),
            roll_number,
            selected_elective_groups: vec![],
        }
    }

    fn numbers(roster: &[Student]) -> Vec<(String, i64)> {
        let mut v: Vec<(String, i64)> = roster
            .iter()
            .map(|s| (s.first_name.clone(), s.roll_number))
            .collect();
        v.sort_by_key(|(_, r)| *r);
        v
    }

    fn pairs(expected: &[(&str, i64)]) -> Vec<(String, i64)> {
        expected.iter().map(|(n, r)| (n.to_string(), *r)).collect()
    }

    #[test]
    fn reorder_sorts_by_first_name() {
        let mut roster = vec![
            student("b", "Bob", 1),
            student("a", "Amy", 2),
            student("c", "Carl", 3),
        ];
        let updates = reorder(&roster);
        apply(&mut roster, &updates);
        assert_eq!(numbers(&roster), pairs(&[("Amy", 1), ("Bob", 2), ("Carl", 3)]));
    }

    #[test]
    fn insert_at_front_shifts_everyone() {
        let roster = vec![
            student("a", "Amy", 1),
            student("b", "Bob", 2),
            student("c", "Carl", 3),
        ];
        let a = assign_on_create(&roster, "Aaron");
        assert_eq!(a.roll_number, 1);
        assert_eq!(
            a.roster_updates,
            vec![
                RollUpdate { student_id: "a".into(), new_roll_number: 2 },
                RollUpdate { student_id: "b".into(), new_roll_number: 3 },
                RollUpdate { student_id: "c".into(), new_roll_number: 4 },
            ]
        );
    }

    #[test]
    fn insert_in_middle_and_at_end() {
        let roster = vec![student("a", "Amy", 1), student("c", "Carl", 2)];

        let mid = assign_on_create(&roster, "Bob");
        assert_eq!(mid.roll_number, 2);
        assert_eq!(mid.roster_updates.len(), 1);
        assert_eq!(mid.roster_updates[0].student_id, "c");

        let end = assign_on_create(&roster, "Zed");
        assert_eq!(end.roll_number, 3);
        assert!(end.roster_updates.is_empty());

        assert_eq!(assign_on_create(&[], "Solo").roll_number, 1);
    }

    #[test]
    fn empty_first_name_sorts_first() {
        let roster = vec![student("a", "Amy", 1)];
        assert_eq!(assign_on_create(&roster, "").roll_number, 1);
    }

    #[test]
    fn case_does_not_split_alphabetical_order() {
        let roster = vec![student("z", "zoe", 1), student("b", "Bob", 2)];
        let order: Vec<String> = reorder(&roster)
            .into_iter()
            .map(|u| u.student_id)
            .collect();
        assert_eq!(order, vec!["b", "z"]);
    }

    #[test]
    fn reorder_is_idempotent() {
        let mut roster = vec![
            student("1", "Priya", 4),
            student("2", "arjun", 1),
            student("3", "Priya", 2),
            student("4", "Meera", 9),
        ];
        let first = reorder(&roster);
        apply(&mut roster, &first);
        let second = reorder(&roster);
        assert_eq!(first, second);
        assert!(changed(&roster, &second).is_empty());
    }

    #[test]
    fn insertion_agrees_with_full_reorder() {
        for name in ["Aaron", "Amy", "Bob", "Bz", "Carl", "Zed", ""] {
            let mut roster = vec![
                student("a", "Amy", 1),
                student("b", "Bob", 2),
                student("c", "Carl", 3),
            ];
            let a = assign_on_create(&roster, name);
            apply(&mut roster, &a.roster_updates);
            roster.push(student("new", name, a.roll_number));

            let before = numbers(&roster);
            let updates = reorder(&roster);
            assert!(changed(&roster, &updates).is_empty(), "inserting {name:?}");
            apply(&mut roster, &updates);
            assert_eq!(numbers(&roster), before);
        }
    }

    #[test]
    fn duplicate_name_goes_after_existing_one() {
        let roster = vec![student("a", "Amy", 1), student("b", "Bob", 2)];
        let a = assign_on_create(&roster, "Amy");
        assert_eq!(a.roll_number, 2);
        assert_eq!(a.roster_updates.len(), 1);
        assert_eq!(a.roster_updates[0].student_id, "b");
    }
}
