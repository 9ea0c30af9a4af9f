use crate::applicability;
use crate::electives::ResolvedSubjects;
use crate::model::Student;
use crate::roll::compare_names;
use anyhow::Context;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;

pub const DEFAULT_NA_LABEL: &str = "N/A";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetHeader {
    pub test_name: String,
    pub year: String,
    pub class: String,
    pub division: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetColumn {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub student_id: String,
    pub roll_number: i64,
    pub name: String,
    /// One per column: empty when the student sits the subject, else the
    /// not-applicable label.
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSheet {
    #[serde(flatten)]
    pub header: SheetHeader,
    pub columns: Vec<SheetColumn>,
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Clone)]
pub struct SheetOptions {
    pub na_label: String,
    pub show_middle_name: bool,
}

impl Default for SheetOptions {
    fn default() -> Self {
        Self {
            na_label: DEFAULT_NA_LABEL.to_string(),
            show_middle_name: false,
        }
    }
}

pub fn build_result_sheet(
    header: SheetHeader,
    resolved: &ResolvedSubjects,
    students: &[Student],
    options: &SheetOptions,
) -> ResultSheet {
    // A core subject that also sits in a group is governed by the last such
    // group, the same one the matrix applies last.
    let owning_group = |subject: &str| {
        resolved
            .elective_groups
            .iter()
            .rev()
            .find(|g| g.contains(subject))
            .map(|g| g.group_name.clone())
    };
    let mut columns: Vec<SheetColumn> = resolved
        .core_subjects
        .iter()
        .map(|s| SheetColumn {
            subject: s.clone(),
            group_name: owning_group(s.as_str()),
        })
        .collect();
    let mut listed: HashSet<&str> = resolved.core_subjects.iter().map(|s| s.as_str()).collect();
    for group in &resolved.elective_groups {
        for subject in &group.subjects {
            if listed.insert(subject.as_str()) {
                columns.push(SheetColumn {
                    subject: subject.clone(),
                    group_name: Some(group.group_name.clone()),
                });
            }
        }
    }

    let na = applicability::build_matrix(students, &resolved.elective_groups);

    let mut ordered: Vec<&Student> = students.iter().collect();
    ordered.sort_by(|a, b| {
        a.roll_number
            .cmp(&b.roll_number)
            .then_with(|| compare_names(&a.first_name, &b.first_name))
    });

    let rows = ordered
        .into_iter()
        .map(|s| {
            let marked = na.get(&s.id);
            let cells = columns
                .iter()
                .map(|c| match marked {
                    Some(set) if set.contains(&c.subject) => options.na_label.clone(),
                    _ => String::new(),
                })
                .collect();
            SheetRow {
                student_id: s.id.clone(),
                roll_number: s.roll_number,
                name: s.display_name(options.show_middle_name),
                cells,
            }
        })
        .collect();

    ResultSheet {
        header,
        columns,
        rows,
    }
}

pub fn write_csv<W: Write>(sheet: &ResultSheet, out: W) -> anyhow::Result<()> {
    let mut w = csv::Writer::from_writer(out);

    let mut head = vec!["Roll No".to_string(), "Student Name".to_string()];
    head.extend(sheet.columns.iter().map(|c| match &c.group_name {
        Some(g) => format!("{} ({})", c.subject, g),
        None => c.subject.clone(),
    }));
    w.write_record(&head).context("failed to write csv header")?;

    for row in &sheet.rows {
        let mut record = vec![row.roll_number.to_string(), row.name.clone()];
        record.extend(row.cells.iter().cloned());
        w.write_record(&record)
            .with_context(|| format!("failed to write csv row for {}", row.student_id))?;
    }
    w.flush().context("failed to flush csv output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElectiveGroup, ElectiveSelection};

    fn student(id: &str, first: &str, roll: i64, sel: Vec<ElectiveSelection>) -> Student {
        Student {
            id: id.into(),
            first_name: first.into(),
            middle_name: None,
            last_name: Some("K".into()),
            class: "X".into(),
            division: "A".into(),
            roll_number: roll,
            selected_elective_groups: sel,
        }
    }

    fn sample() -> ResultSheet {
        let resolved = ResolvedSubjects {
            core_subjects: vec!["Math".into(), "English".into()],
            elective_groups: vec![ElectiveGroup::new("Elective A", &["Physics", "Biology"])],
        };
        let students = vec![
            student("s2", "Sara", 2, vec![]),
            student(
                "s1",
                "Amit",
                1,
                vec![ElectiveSelection::new("Elective A", "Physics")],
            ),
        ];
        build_result_sheet(
            SheetHeader {
                test_name: "PT1".into(),
                year: "2024-25".into(),
                class: "X".into(),
                division: "A".into(),
            },
            &resolved,
            &students,
            &SheetOptions::default(),
        )
    }

    #[test]
    fn rows_follow_roll_numbers_and_mark_unchosen_electives() {
        let sheet = sample();
        let subjects: Vec<&str> = sheet.columns.iter().map(|c| c.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Math", "English", "Physics", "Biology"]);

        assert_eq!(sheet.rows[0].name, "Amit K");
        assert_eq!(sheet.rows[0].cells, vec!["", "", "", "N/A"]);
        assert_eq!(sheet.rows[1].cells, vec!["", "", "N/A", "N/A"]);
    }

    #[test]
    fn core_subject_inside_a_group_is_labelled_with_that_group() {
        let resolved = ResolvedSubjects {
            core_subjects: vec!["Math".into(), "Biology".into()],
            elective_groups: vec![ElectiveGroup::new("Elective A", &["Physics", "Biology"])],
        };
        let students = vec![student(
            "s1",
            "Amit",
            1,
            vec![ElectiveSelection::new("Elective A", "Physics")],
        )];
        let sheet = build_result_sheet(
            SheetHeader {
                test_name: "PT1".into(),
                year: "2024-25".into(),
                class: "X".into(),
                division: "A".into(),
            },
            &resolved,
            &students,
            &SheetOptions::default(),
        );

        let columns: Vec<(&str, Option<&str>)> = sheet
            .columns
            .iter()
            .map(|c| (c.subject.as_str(), c.group_name.as_deref()))
            .collect();
        assert_eq!(
            columns,
            vec![
                ("Math", None),
                ("Biology", Some("Elective A")),
                ("Physics", Some("Elective A")),
            ]
        );
        assert_eq!(sheet.rows[0].cells, vec!["", "N/A", ""]);
    }

    #[test]
    fn csv_has_header_and_one_line_per_student() {
        let mut buf = Vec::new();
        write_csv(&sample(), &mut buf).expect("write csv");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Roll No,Student Name,Math,English,Physics (Elective A),Biology (Elective A)"
        );
        assert_eq!(lines[2], "2,Sara K,,,N/A,N/A");
    }
}
