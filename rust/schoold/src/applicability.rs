use crate::model::{ElectiveGroup, Student};
use std::collections::{BTreeSet, HashMap};

/// Per student id, the subjects that student is not examined in.
pub type NotApplicable = HashMap<String, BTreeSet<String>>;

/// Marks every elective subject a student did not pick as not applicable.
/// A group the student never opted into is not applicable as a whole.
/// Subjects outside `groups` are never marked.
///
/// Groups are applied in order, so a subject listed in two groups ends up
/// with whatever the later group decides.
pub fn build_matrix(students: &[Student], groups: &[ElectiveGroup]) -> NotApplicable {
    let mut out = NotApplicable::with_capacity(students.len());
    for student in students {
        out.insert(student.id.clone(), not_applicable_for(student, groups));
    }
    out
}

pub fn not_applicable_for(student: &Student, groups: &[ElectiveGroup]) -> BTreeSet<String> {
    let mut na = BTreeSet::new();
    for group in groups {
        let selected = student.selection_for(&group.group_name);
        for subject in &group.subjects {
            if selected == Some(subject.as_str()) {
                na.remove(subject);
            } else {
                na.insert(subject.clone());
            }
        }
    }
    na
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElectiveSelection;

    fn student(id: &str, selections: Vec<ElectiveSelection>) -> Student {
        Student {
            id: id.into(),
            first_name: id.into(),
            middle_name: None,
            last_name: None,
            class: "X".into(),
            division: "A".into(),
            roll_number: 0,
            selected_elective_groups: selections,
        }
    }

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn selection_leaves_only_the_chosen_subject() {
        let groups = vec![ElectiveGroup::new("Elective A", &["Physics", "Biology"])];
        let students = vec![
            student("S1", vec![ElectiveSelection::new("Elective A", "Physics")]),
            student("S2", vec![]),
        ];

        let m = build_matrix(&students, &groups);
        assert_eq!(names(&m["S1"]), vec!["Biology"]);
        assert_eq!(names(&m["S2"]), vec!["Biology", "Physics"]);
        for na in m.values() {
            assert!(!na.contains("Math"));
            assert!(!na.contains("English"));
        }
    }

    #[test]
    fn each_group_has_at_most_one_applicable_subject() {
        let groups = vec![
            ElectiveGroup::new("Elective A", &["Physics", "Biology", "Computer"]),
            ElectiveGroup::new("Language", &["French", "German"]),
        ];
        let students = vec![
            student(
                "S1",
                vec![
                    ElectiveSelection::new("Elective A", "Computer"),
                    ElectiveSelection::new("Language", "German"),
                ],
            ),
            student("S2", vec![ElectiveSelection::new("Language", "French")]),
        ];
        let m = build_matrix(&students, &groups);

        for s in &students {
            let na = &m[&s.id];
            for g in &groups {
                let applicable = g.subjects.iter().filter(|sub| !na.contains(*sub)).count();
                let expected = if s.selection_for(&g.group_name).is_some() { 1 } else { 0 };
                assert_eq!(applicable, expected, "{} / {}", s.id, g.group_name);
            }
        }
    }

    #[test]
    fn later_group_wins_for_shared_subject() {
        let groups = vec![
            ElectiveGroup::new("Elective A", &["Physics", "Biology"]),
            ElectiveGroup::new("Elective B", &["Biology", "Geography"]),
        ];
        let picked_in_a = student("S1", vec![ElectiveSelection::new("Elective A", "Biology")]);
        let picked_in_b = student("S2", vec![ElectiveSelection::new("Elective B", "Biology")]);

        assert!(not_applicable_for(&picked_in_a, &groups).contains("Biology"));
        assert!(!not_applicable_for(&picked_in_b, &groups).contains("Biology"));
    }

    #[test]
    fn no_groups_means_nothing_is_marked() {
        let students = vec![student("S1", vec![])];
        let m = build_matrix(&students, &[]);
        assert!(m["S1"].is_empty());
    }
}
